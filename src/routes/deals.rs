use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::api::DeleteDealResponse;
use crate::app::AppState;
use crate::domain::{CreateDealRequest, UpdateDealRequest};
use crate::error::{ApiError, ApiResult};

/// List all deals, newest first
pub async fn list_deals(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let deals = state.store.list_deals().await?;
    Ok(Json(deals))
}

/// Create a deal in `draft` status
pub async fn create_deal(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDealRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Deal name is required"));
    }

    let deal = state.store.create_deal(&req).await?;

    tracing::info!(deal_id = deal.id, name = %deal.name, "Deal created");

    Ok(Json(deal))
}

pub async fn get_deal(
    State(state): State<Arc<AppState>>,
    Path(deal_id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let deal = state
        .store
        .get_deal(deal_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Deal not found"))?;

    Ok(Json(deal))
}

/// Replace a deal's name, property type and address; `status` is kept when absent
pub async fn update_deal(
    State(state): State<Arc<AppState>>,
    Path(deal_id): Path<i32>,
    Json(req): Json<UpdateDealRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Deal name is required"));
    }

    let deal = state
        .store
        .update_deal(deal_id, &req)
        .await?
        .ok_or_else(|| ApiError::not_found("Deal not found"))?;

    Ok(Json(deal))
}

/// Delete a deal, its documents and their stored files
pub async fn delete_deal(
    State(state): State<Arc<AppState>>,
    Path(deal_id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let deal = state
        .store
        .delete_deal(deal_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Deal not found"))?;

    if let Err(e) = state.storage.remove_deal(deal_id).await {
        tracing::warn!(deal_id, error = ?e, "Failed to remove stored files for deleted deal");
    }

    tracing::info!(deal_id, "Deal deleted");

    Ok(DeleteDealResponse::new(deal))
}
