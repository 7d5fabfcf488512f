//! Document management endpoints

use axum::{
    extract::{Multipart, Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::info;

use crate::api::state::AppState;
use crate::api::types::documents::{ChunkListQuery, DocumentChunksResponse};
use crate::api::types::{ApiError, DocumentListQuery, UploadResponse};
use crate::domain::document::DocType;
use crate::domain::ingestion::{ChunkerMode, IngestOptions};
use crate::infrastructure::registry::DocumentQuery;
use crate::infrastructure::services::IngestFile;

/// POST /upload_store (multipart)
pub async fn upload_store(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut files: Vec<IngestFile> = Vec::new();
    let mut chunker: ChunkerMode = ChunkerMode::Smart;
    let mut doc_type: DocType = DocType::InternalRegulation;
    let mut title: Option<String> = None;
    let mut save_after = true;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" | "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::bad_request("file field missing filename"))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("reading {filename}: {e}")))?;
                files.push(IngestFile {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            "chunker_type" => {
                let value = field.text().await.unwrap_or_default();
                chunker = value.parse().map_err(ApiError::from)?;
            }
            "doc_type" => {
                let value = field.text().await.unwrap_or_default();
                doc_type = value.parse().map_err(ApiError::from)?;
            }
            "title" => {
                let value = field.text().await.unwrap_or_default();
                if !value.trim().is_empty() {
                    title = Some(value);
                }
            }
            "save_after_processing" => {
                let value = field.text().await.unwrap_or_default();
                save_after = !matches!(value.as_str(), "false" | "0" | "no");
            }
            other => {
                info!(field = other, "ignoring unknown multipart field");
            }
        }
    }

    if files.is_empty() {
        return Err(ApiError::bad_request("no files uploaded"));
    }

    let mut options = IngestOptions::new(chunker, doc_type).with_save_after(save_after);
    if let Some(title) = title {
        options = options.with_title(title);
    }

    let report = state.ingestion.ingest(files, options).await;
    Ok(Json(UploadResponse::from(report)).into_response())
}

/// GET /documents
pub async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<DocumentListQuery>,
) -> Result<Response, ApiError> {
    let doc_type = params
        .doc_type
        .as_deref()
        .map(str::parse::<DocType>)
        .transpose()
        .map_err(ApiError::from)?;

    let records = state
        .ingestion
        .list_documents(&DocumentQuery {
            doc_type,
            keyword: params.keyword,
            include_deleted: params.include_deleted,
        })
        .await;
    Ok(Json(json!({ "total": records.len(), "documents": records })).into_response())
}

/// GET /documents/{id}
pub async fn get_document(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<Response, ApiError> {
    let record = state
        .ingestion
        .get_document(&doc_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("document {doc_id} not found")))?;
    Ok(Json(record).into_response())
}

/// GET /documents/{id}/chunks
pub async fn get_document_chunks(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    Query(params): Query<ChunkListQuery>,
) -> Result<Response, ApiError> {
    let record = state
        .ingestion
        .get_document(&doc_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("document {doc_id} not found")))?;
    let chunks = state.ingestion.get_document_chunks(&doc_id).await?;
    Ok(Json(DocumentChunksResponse::build(&record, &chunks, params.include_text)).into_response())
}

/// DELETE /documents/{id}
pub async fn delete_document(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<Response, ApiError> {
    let removed_chunks = state.ingestion.delete_document(&doc_id).await?;
    Ok(Json(json!({
        "success": true,
        "doc_id": doc_id,
        "removed_chunks": removed_chunks,
    }))
    .into_response())
}

/// DELETE /documents — clear everything
pub async fn clear_documents(State(state): State<AppState>) -> Result<Response, ApiError> {
    let removed = state.ingestion.clear_all().await?;
    Ok(Json(json!({
        "success": true,
        "removed_documents": removed,
    }))
    .into_response())
}

/// GET /documents/stats
pub async fn document_stats(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(Json(state.ingestion.stats().await).into_response())
}
