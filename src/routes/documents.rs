use axum::{
    extract::{Multipart, Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::api::{TextDocumentResponse, UploadResponse};
use crate::app::AppState;
use crate::domain::{DealStatus, Document, NewDocument, UploadTextRequest};
use crate::error::{ApiError, ApiResult};

/// Multipart field carrying uploaded files
const FILES_FIELD: &str = "files";

async fn ensure_deal_exists(state: &AppState, deal_id: i32) -> ApiResult<()> {
    state
        .store
        .get_deal(deal_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found("Deal not found"))
}

/// List a deal's documents, newest first
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Path(deal_id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    ensure_deal_exists(&state, deal_id).await?;
    let documents = state.store.list_documents(deal_id).await?;
    Ok(Json(documents))
}

/// Store one or more uploaded files for a deal
pub async fn upload_documents(
    State(state): State<Arc<AppState>>,
    Path(deal_id): Path<i32>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    ensure_deal_exists(&state, deal_id).await?;

    let mut documents = Vec::new();
    let stored = store_uploads(&state, deal_id, &mut multipart, &mut documents).await;

    // Files that made it in stay, so the deal reflects them even if a later part failed
    if !documents.is_empty() {
        state.store.set_deal_status(deal_id, DealStatus::Uploaded).await?;
    }
    stored?;

    if documents.is_empty() {
        return Err(ApiError::bad_request("No files uploaded"));
    }

    Ok(UploadResponse::new(documents))
}

async fn store_uploads(
    state: &AppState,
    deal_id: i32,
    multipart: &mut Multipart,
    documents: &mut Vec<Document>,
) -> ApiResult<()> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }

        let original_filename = field.file_name().unwrap_or_default().to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;

        // Browsers send an empty, nameless part when no file was picked
        if original_filename.is_empty() && bytes.is_empty() {
            continue;
        }

        let stored = state
            .storage
            .save_upload(deal_id, &original_filename, &bytes)
            .await?;

        let inserted = state
            .store
            .insert_document(&NewDocument {
                deal_id,
                filename: stored.filename,
                original_filename,
                file_path: stored.path.to_string_lossy().into_owned(),
                file_size: bytes.len() as i64,
                mime_type,
            })
            .await;

        let document = match inserted {
            Ok(document) => document,
            Err(e) => {
                if let Err(cleanup) = state.storage.remove_file(&stored.path).await {
                    tracing::warn!(deal_id, error = ?cleanup, "Failed to remove orphaned upload");
                }
                return Err(e.into());
            }
        };

        tracing::info!(
            deal_id,
            document_id = document.id,
            filename = %document.original_filename,
            size = document.file_size,
            "Document uploaded"
        );

        documents.push(document);
    }

    Ok(())
}

/// Store pasted text as a document of the deal
pub async fn upload_text(
    State(state): State<Arc<AppState>>,
    Path(deal_id): Path<i32>,
    Json(req): Json<UploadTextRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.text.trim().is_empty() {
        return Err(ApiError::bad_request("No text provided"));
    }

    ensure_deal_exists(&state, deal_id).await?;

    let stored = state
        .storage
        .save_text(deal_id, &req.document_type, &req.text)
        .await?;

    let document = state
        .store
        .insert_document(&NewDocument {
            deal_id,
            filename: stored.filename.clone(),
            original_filename: stored.filename,
            file_path: stored.path.to_string_lossy().into_owned(),
            file_size: req.text.len() as i64,
            mime_type: "text/plain".to_string(),
        })
        .await?;

    state.store.set_deal_status(deal_id, DealStatus::Uploaded).await?;

    tracing::info!(
        deal_id,
        document_id = document.id,
        document_type = %req.document_type,
        "Text document created"
    );

    Ok(TextDocumentResponse::new(document))
}
