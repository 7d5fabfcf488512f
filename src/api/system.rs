//! Health and server info endpoints

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::api::state::AppState;
use crate::api::types::ApiError;

/// GET /health — liveness probe
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// GET /info — store counts and provider facts
pub async fn info(State(state): State<AppState>) -> Result<Response, ApiError> {
    let registry_stats = state.stores.registry.read().await.stats();
    let vector_count = state.stores.vectors.read().await.len();
    let graph_stats = state.stores.graph.read().await.stats();
    let sessions = state.ask.sessions().session_count().await;

    Ok(Json(json!({
        "name": "audit-rag-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "documents": registry_stats,
        "vector_count": vector_count,
        "graph": graph_stats,
        "active_sessions": sessions,
        "providers": state.providers,
    }))
    .into_response())
}
