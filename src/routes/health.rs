use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub database: String,
    pub ai_provider: String,
}

/// Health check endpoint
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let db_ok = state.store.ping().await;
    // Credentials only; probing the provider would spend tokens
    let ai_ok = state.ai_client.is_configured();

    let db_status = if db_ok { "ok" } else { "error" };
    let ai_status = if ai_ok { "configured" } else { "missing_credentials" };

    // Determine overall status
    let status = if db_ok && ai_ok {
        "healthy"
    } else if db_ok {
        // DB is critical, the model is degraded
        "degraded"
    } else {
        "unhealthy"
    };

    // Return 503 if unhealthy (critical service down)
    let status_code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: ServiceHealth {
                database: db_status.to_string(),
                ai_provider: ai_status.to_string(),
            },
        }),
    )
}
