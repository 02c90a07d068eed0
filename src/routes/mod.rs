pub mod analysis;
pub mod chat;
pub mod deals;
pub mod documents;
pub mod health;

use axum::{routing::get, routing::post, Router};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        // Deals
        .route("/deals", get(deals::list_deals).post(deals::create_deal))
        .route(
            "/deals/:id",
            get(deals::get_deal)
                .put(deals::update_deal)
                .delete(deals::delete_deal),
        )
        // Documents (nested under deals)
        .route("/deals/:id/documents", get(documents::list_documents))
        .route("/deals/:id/upload", post(documents::upload_documents))
        .route("/deals/:id/upload-text", post(documents::upload_text))
        // Analysis
        .route("/deals/:id/analyze", post(analysis::analyze_deal))
        .route("/analyze-text", post(analysis::analyze_text))
        // Chat
        .route("/chat", post(chat::chat))
}
