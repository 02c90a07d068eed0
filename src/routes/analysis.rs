use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::api::{AnalyzeResponse, AnalyzeTextResponse};
use crate::app::AppState;
use crate::domain::AnalyzeTextRequest;
use crate::error::{ApiError, ApiResult};

/// Analyse every eligible document of a deal
pub async fn analyze_deal(
    State(state): State<Arc<AppState>>,
    Path(deal_id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let run = state.analysis.run(deal_id).await?;
    Ok(AnalyzeResponse::new(run))
}

/// Analyse pasted text without storing anything
pub async fn analyze_text(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeTextRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.text.trim().is_empty() {
        return Err(ApiError::bad_request("No text provided"));
    }

    let outcome = state
        .ai_client
        .analyze_document(&req.text, &req.document_type, Some(&req.document_type))
        .await;

    let degraded = outcome.is_degraded();
    if degraded {
        tracing::warn!(document_type = %req.document_type, "Ad-hoc analysis degraded to fallback");
    }

    Ok(AnalyzeTextResponse {
        success: true,
        analysis: outcome.into_result(),
        degraded,
    })
}
