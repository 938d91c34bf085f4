use crate::instructions::ChecklistItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file received in one upload request, plus whatever the object store gave back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub name: String,
    pub size: u64,
    pub id: Option<String>,
    pub web_view_link: Option<String>,
    pub web_content_link: Option<String>,
}

impl UploadedFile {
    pub fn local(name: &str, size: u64) -> Self {
        Self {
            name: name.to_string(),
            size,
            id: None,
            web_view_link: None,
            web_content_link: None,
        }
    }
}

/// Metadata echo attached to an analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub extension: String,
}

/// Which strategy produced the feedback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    Ai,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub success: bool,
    /// Markdown feedback; always present.
    pub feedback: String,
    pub timestamp: DateTime<Utc>,
    pub source: AnalysisSource,
    pub file_info: Option<FileInfo>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checklist: Option<Vec<ChecklistItem>>,
}

impl AnalysisResult {
    pub fn new(source: AnalysisSource, feedback: String, file_info: Option<FileInfo>) -> Self {
        Self {
            success: true,
            feedback,
            timestamp: Utc::now(),
            source,
            file_info,
            error: None,
            checklist: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
