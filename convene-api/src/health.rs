use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub database: &'static str,
    pub redis: &'static str,
}

/// GET /api/health
/// Only an unreachable database degrades the service; the rate limiter
/// fails open without Redis.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match &state.db {
        Some(db) => match db.ping().await {
            Ok(()) => "connected",
            Err(e) => {
                tracing::error!("Health check could not reach the database: {}", e);
                "disconnected"
            }
        },
        None => "not_configured",
    };

    let redis = match &state.redis {
        Some(redis) => match redis.ping().await {
            Ok(()) => "connected",
            Err(e) => {
                tracing::warn!("Health check could not reach Redis: {}", e);
                "disconnected"
            }
        },
        None => "not_configured",
    };

    let (code, status) = if database == "disconnected" {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    } else {
        (StatusCode::OK, "ok")
    };

    (
        code,
        Json(HealthResponse {
            status,
            timestamp: Utc::now(),
            database,
            redis,
        }),
    )
}
