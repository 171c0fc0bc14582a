//! Health handler

use crate::api::rest::state::AppState;
use axum::{extract::State, Json};
use ctf_engine::ChallengeCatalog;
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub challenges: usize,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version,
        uptime_secs: state.uptime_secs(),
        challenges: state.engine.catalog().list().await.len(),
    })
}
