//! HTTP surface: shared state, router assembly and handlers.

mod instructions;
mod status;
mod upload;

pub use status::{DependencyStatus, HealthResponse, ServiceStatus, StoreStatus};

use crate::config::Config;
use crate::error::ApiError;
use crate::files::TempStorage;
use crate::instructions::{InstructionService, LayeredStore};
use crate::pipeline::UploadPipeline;
use crate::providers::Dependencies;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: UploadPipeline,
    pub instructions: InstructionService,
    /// Configuration snapshot reported by `/api/status`.
    pub status: Arc<ServiceStatus>,
    pub started_at: DateTime<Utc>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(config: &Config, deps: Dependencies, store: Arc<LayeredStore>) -> Self {
        let temp = TempStorage::new(config.temp_dir());
        let status = ServiceStatus::describe(&deps, &store, temp.base_dir());
        Self {
            pipeline: UploadPipeline::new(temp, store.clone(), deps.clone()),
            instructions: InstructionService::new(store, deps),
            status: Arc::new(status),
            started_at: Utc::now(),
            max_upload_bytes: config.server.max_upload_bytes,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let limit = state.max_upload_bytes;

    Router::new()
        .route("/health", get(status::health))
        .route("/api/status", get(status::service_status))
        .route("/api/upload", post(upload::upload_file))
        .route(
            "/api/instructions",
            get(instructions::list).post(instructions::create),
        )
        .route(
            "/api/instructions/{id}",
            get(instructions::get)
                .put(instructions::update)
                .delete(instructions::delete),
        )
        .route(
            "/api/instructions/{id}/feedback",
            post(instructions::generate_feedback),
        )
        .route(
            "/api/instructions/{id}/checklist",
            post(instructions::generate_checklist),
        )
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(limit))
                .layer(RequestBodyLimitLayer::new(limit)),
        )
        .layer(middleware::map_response(oversized_as_json))
        .with_state(state)
}

/// The body-limit layer rejects a declared oversized `Content-Length` with a
/// plain-text 413 before any handler runs; give it the API error shape.
async fn oversized_as_json(response: Response) -> Response {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_json {
        return ApiError::PayloadTooLarge("request body exceeds the upload limit".into())
            .into_response();
    }
    response
}
