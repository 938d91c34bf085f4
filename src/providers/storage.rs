//! Remote object storage.
//!
//! [`DriveStorage`] speaks the Google Drive v3 REST API: a media upload, a
//! metadata patch that names (and optionally files) the object, and an
//! `anyone/reader` permission so the view and download links resolve without
//! credentials.

use super::error::ProviderError;
use crate::config::StorageConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// What the store hands back for an uploaded object.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub id: String,
    /// Browser view URL.
    pub web_view_link: String,
    /// Direct download URL.
    pub web_content_link: String,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    fn name(&self) -> &str;

    async fn upload(
        &self,
        filename: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<StoredObject, ProviderError>;
}

pub struct DriveStorage {
    http: Client,
    api_base: String,
    access_token: String,
    folder_id: Option<String>,
    make_public: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    web_view_link: Option<String>,
    web_content_link: Option<String>,
}

impl DriveStorage {
    /// Build a client when an access token is configured, `None` otherwise.
    pub fn from_config(config: &StorageConfig, timeout: Duration) -> Result<Option<Self>> {
        let Some(token) = config.access_token.clone() else {
            return Ok(None);
        };
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build storage HTTP client")?;
        Ok(Some(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            access_token: token,
            folder_id: config.folder_id.clone(),
            make_public: config.make_public,
        }))
    }

    async fn create_media(&self, mime_type: &str, data: Vec<u8>) -> Result<DriveFile, ProviderError> {
        let url = format!("{}/upload/drive/v3/files?uploadType=media", self.api_base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(data)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn set_metadata(&self, id: &str, filename: &str) -> Result<DriveFile, ProviderError> {
        let mut url = format!(
            "{}/drive/v3/files/{}?fields=id,webViewLink,webContentLink",
            self.api_base,
            urlencoding::encode(id)
        );
        if let Some(folder) = &self.folder_id {
            url.push_str("&addParents=");
            url.push_str(&urlencoding::encode(folder));
        }
        let resp = self
            .http
            .patch(&url)
            .bearer_auth(&self.access_token)
            .json(&json!({ "name": filename }))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn share_publicly(&self, id: &str) -> Result<(), ProviderError> {
        let url = format!(
            "{}/drive/v3/files/{}/permissions",
            self.api_base,
            urlencoding::encode(id)
        );
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&json!({ "role": "reader", "type": "anyone" }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for DriveStorage {
    fn name(&self) -> &str {
        "google-drive"
    }

    async fn upload(
        &self,
        filename: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<StoredObject, ProviderError> {
        let size = data.len();
        let created = self.create_media(mime_type, data).await?;
        debug!(id = %created.id, "Drive media upload complete");

        let file = self.set_metadata(&created.id, filename).await?;
        if self.make_public {
            self.share_publicly(&file.id).await?;
        }

        info!(id = %file.id, filename, size, "Stored file in Drive");
        Ok(stored_object(file))
    }
}

fn stored_object(file: DriveFile) -> StoredObject {
    let web_view_link = file
        .web_view_link
        .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", file.id));
    let web_content_link = file
        .web_content_link
        .unwrap_or_else(|| format!("https://drive.google.com/uc?id={}&export=download", file.id));
    StoredObject {
        id: file.id,
        web_view_link,
        web_content_link,
    }
}

/// Turn a non-2xx response into a classified [`ProviderError`].
pub(crate) async fn check(resp: Response) -> Result<Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status.as_u16(), &body))
}
