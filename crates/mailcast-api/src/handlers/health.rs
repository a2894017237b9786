//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;
use utoipa::ToSchema;

use crate::auth::AppState;

/// Basic health response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health of every dependency
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub version: String,
    pub database: ComponentHealth,
}

/// Health of one dependency
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ComponentHealth {
    /// `healthy` or `unhealthy`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

async fn check_database(state: &AppState) -> ComponentHealth {
    let start = Instant::now();
    match state.db_pool.health_check().await {
        Ok(()) => ComponentHealth {
            status: "healthy".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => {
            warn!("Database health check failed: {}", e);
            ComponentHealth {
                status: "unhealthy".to_string(),
                latency_ms: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Basic health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: version(),
    })
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses((status = 200, description = "Process is alive"))
)]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness check: the database must answer
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Ready to serve"),
        (status = 503, description = "Database unavailable")
    )
)]
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    if check_database(&state).await.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Detailed health check
#[utoipa::path(
    get,
    path = "/health/detailed",
    tag = "health",
    responses(
        (status = 200, description = "All dependencies healthy", body = DetailedHealthResponse),
        (status = 503, description = "A dependency is unhealthy", body = DetailedHealthResponse)
    )
)]
pub async fn health_detailed(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<DetailedHealthResponse>) {
    let database = check_database(&state).await;

    let (code, status) = if database.is_healthy() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        code,
        Json(DetailedHealthResponse {
            status: status.to_string(),
            version: version(),
            database,
        }),
    )
}
