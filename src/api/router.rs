use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::state::AppState;
use super::{chat, documents, graph, system};

/// Create the full router with application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // System
        .route("/health", get(system::health_check))
        .route("/info", get(system::info))
        // Ingest + document management
        .route("/upload_store", post(documents::upload_store))
        .route(
            "/documents",
            get(documents::list_documents).delete(documents::clear_documents),
        )
        .route("/documents/stats", get(documents::document_stats))
        .route(
            "/documents/:id",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/documents/:id/chunks", get(documents::get_document_chunks))
        // Query surface
        .route("/search_with_intent", post(chat::search_with_intent))
        .route("/ask", post(chat::ask))
        .route("/v1/chat/completions", post(chat::chat_completions))
        // Knowledge graph
        .route("/graph/rebuild", post(graph::rebuild))
        .route("/graph/stats", get(graph::stats))
        .route("/graph/nodes", get(graph::list_nodes))
        .route("/graph/edges", get(graph::list_edges))
        .route("/graph/subgraph", get(graph::subgraph))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
