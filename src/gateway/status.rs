use super::AppState;
use crate::error::ApiResult;
use crate::instructions::{InstructionStore, LayeredStore};
use crate::providers::Dependencies;
use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyStatus {
    pub configured: bool,
    /// Provider name for storage, model name for inference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub backend: &'static str,
    pub mirrors: Vec<String>,
}

/// Which optional dependencies this process was started with.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub storage: DependencyStatus,
    pub inference: DependencyStatus,
    pub instructions: StoreStatus,
    pub temp_dir: String,
}

impl ServiceStatus {
    pub fn describe(deps: &Dependencies, store: &LayeredStore, temp_dir: &Path) -> Self {
        Self {
            storage: DependencyStatus {
                configured: deps.storage.is_some(),
                provider: deps.storage.as_ref().map(|s| s.name().to_string()),
            },
            inference: DependencyStatus {
                configured: deps.inference.is_some(),
                provider: deps.inference.as_ref().map(|m| m.model().to_string()),
            },
            instructions: StoreStatus {
                backend: store.backend(),
                mirrors: store.mirror_names(),
            },
            temp_dir: temp_dir.display().to_string(),
        }
    }
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.started_at);
    Json(HealthResponse {
        status: "ok",
        service: "filecritic",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
    })
}

/// GET /api/status
pub async fn service_status(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let count = state.instructions.list()?.len();
    let mut body = serde_json::to_value(state.status.as_ref()).map_err(anyhow::Error::from)?;
    body["instructions"]["count"] = count.into();
    body["success"] = true.into();
    Ok(Json(body))
}
