//! Shared fixtures for the HTTP integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use filecritic::instructions::{LayeredStore, MemoryStore};
use filecritic::providers::{
    Dependencies, GenerateRequest, InferenceProvider, ObjectStorage, ProviderError, StoredObject,
};
use filecritic::{build_router, AppState, Config};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const BOUNDARY: &str = "filecritic-test-boundary";

/// Storage fake: succeeds with fixed links, or fails with a scripted error.
pub struct FakeStorage {
    pub fail_with: Option<fn() -> ProviderError>,
    pub uploads: Mutex<Vec<String>>,
}

impl FakeStorage {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            fail_with: None,
            uploads: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(err: fn() -> ProviderError) -> Arc<Self> {
        Arc::new(Self {
            fail_with: Some(err),
            uploads: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    fn name(&self) -> &str {
        "fake-drive"
    }

    async fn upload(
        &self,
        filename: &str,
        _mime_type: &str,
        _data: Vec<u8>,
    ) -> Result<StoredObject, ProviderError> {
        self.uploads.lock().push(filename.to_string());
        if let Some(err) = self.fail_with {
            return Err(err());
        }
        Ok(StoredObject {
            id: "drive-1".into(),
            web_view_link: "https://drive.test/view/drive-1".into(),
            web_content_link: "https://drive.test/dl/drive-1".into(),
        })
    }
}

/// Model fake: pops scripted replies in order and records the prompts it saw.
pub struct FakeModel {
    replies: Mutex<Vec<Result<String, ProviderError>>>,
    pub prompts: Mutex<Vec<GenerateRequest>>,
}

impl FakeModel {
    pub fn replying(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl InferenceProvider for FakeModel {
    fn model(&self) -> &str {
        "fake-model"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String, ProviderError> {
        self.prompts.lock().push(request.clone());
        let mut replies = self.replies.lock();
        if replies.is_empty() {
            return Err(ProviderError::InvalidResponse("no scripted reply".into()));
        }
        replies.remove(0)
    }
}

pub struct TestApp {
    pub router: Router,
    pub temp_dir: PathBuf,
    _dirs: TempDir,
}

impl TestApp {
    pub fn new(deps: Dependencies) -> Self {
        Self::configured(deps, |_| {})
    }

    pub fn with_upload_limit(deps: Dependencies, max_upload_bytes: usize) -> Self {
        Self::configured(deps, |config| config.server.max_upload_bytes = max_upload_bytes)
    }

    fn configured(deps: Dependencies, adjust: impl FnOnce(&mut Config)) -> Self {
        let dirs = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = Config::default();
        config.paths.temp_dir = dirs.path().join("tmp").display().to_string();
        config.paths.data_dir = dirs.path().join("data").display().to_string();
        config.instructions.mirror = false;
        adjust(&mut config);

        let store = Arc::new(LayeredStore::new(Arc::new(MemoryStore::new())));
        let state = AppState::new(&config, deps, store);
        Self {
            router: build_router(state),
            temp_dir: config.temp_dir(),
            _dirs: dirs,
        }
    }

    pub fn bare() -> Self {
        Self::new(Dependencies::default())
    }

    pub async fn send(&self, request: Request<Body>) -> (u16, serde_json::Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed");
        let status = response.status().as_u16();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).expect("Response is not JSON")
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (u16, serde_json::Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_empty(&self, uri: &str) -> (u16, serde_json::Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Number of entries left in the upload temp directory.
    pub fn temp_entries(&self) -> usize {
        std::fs::read_dir(&self.temp_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Build a multipart request with one file part plus text parts. No
/// `Content-Length` is declared, as with a chunked upload.
pub fn multipart_request(
    method: &str,
    uri: &str,
    file: Option<(&str, &[u8])>,
    fields: &[(&str, &str)],
) -> Request<Body> {
    multipart_builder(method, uri)
        .body(Body::from(multipart_body(file, fields)))
        .unwrap()
}

/// Same as [`multipart_request`] but declaring the body length up front.
pub fn multipart_request_with_length(
    method: &str,
    uri: &str,
    file: Option<(&str, &[u8])>,
    fields: &[(&str, &str)],
) -> Request<Body> {
    let body = multipart_body(file, fields);
    multipart_builder(method, uri)
        .header("content-length", body.len())
        .body(Body::from(body))
        .unwrap()
}

fn multipart_builder(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
}

fn multipart_body(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, data)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
