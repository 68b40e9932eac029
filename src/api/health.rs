//! Health, stats and metrics endpoints.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::dispatcher::WorkerPoolStatsSnapshot;
use crate::error::{AppError, Result};
use crate::metrics::encode_metrics;
use crate::queue::{JobStoreBackend, JobStoreStats};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub jobs: JobStoreStats,
    pub workers: WorkerStats,
}

#[derive(Debug, Serialize)]
pub struct WorkerStats {
    pub email: WorkerPoolStatsSnapshot,
    pub whatsapp: WorkerPoolStatsSnapshot,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let jobs = state.store.stats().await?;

    Ok(Json(StatsResponse {
        jobs,
        workers: WorkerStats {
            email: state.email_pool.stats(),
            whatsapp: state.whatsapp_pool.stats(),
        },
    }))
}

pub async fn metrics() -> Result<Response> {
    let body = encode_metrics().map_err(|e| AppError::Internal(e.to_string()))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
