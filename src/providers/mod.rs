//! Clients for the external services the upload pipeline depends on.
//!
//! Each dependency is optional: a missing credential yields no client, and
//! callers treat that as "not configured" rather than an error.

pub mod error;
pub mod inference;
pub mod storage;

pub use error::ProviderError;
pub use inference::{GeminiClient, GenerateRequest, InferenceProvider, OutputFormat};
pub use storage::{DriveStorage, ObjectStorage, StoredObject};

use crate::config::Config;
use anyhow::Result;
use std::sync::Arc;

/// The optional external services, shared by every request.
#[derive(Clone, Default)]
pub struct Dependencies {
    pub storage: Option<Arc<dyn ObjectStorage>>,
    pub inference: Option<Arc<dyn InferenceProvider>>,
}

impl Dependencies {
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.request_timeout();
        let storage = DriveStorage::from_config(&config.storage, timeout)?
            .map(|s| Arc::new(s) as Arc<dyn ObjectStorage>);
        let inference = GeminiClient::from_config(&config.inference, timeout)?
            .map(|c| Arc::new(c) as Arc<dyn InferenceProvider>);
        Ok(Self { storage, inference })
    }
}
