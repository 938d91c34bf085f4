use super::checklist::{self, ChecklistItem};
use crate::files::extract::decode_text;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;

/// A stored instruction file that steers later analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionRecord {
    /// Millisecond timestamp at creation.
    pub id: String,
    pub filename: String,
    /// Verbatim text, or the binary placeholder.
    pub content: String,
    #[serde(default)]
    pub is_binary: bool,
    pub custom_prompt: Option<String>,
    #[serde(default)]
    pub is_checklist: bool,
    pub feedback: Option<String>,
    pub checklist: Option<Vec<ChecklistItem>>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    pub backup_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update accepted by `PUT /api/instructions/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InstructionPatch {
    pub content: Option<String>,
    /// Empty string clears the prompt.
    pub custom_prompt: Option<String>,
    pub is_checklist: Option<bool>,
    pub feedback: Option<String>,
    pub checklist: Option<Vec<ChecklistItem>>,
    /// Replaces the whole map.
    pub fields: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Error, PartialEq)]
pub enum PatchError {
    #[error("content of binary instruction {0} cannot be edited")]
    BinaryContent(String),
}

static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Millisecond timestamp id, bumped forward when two records land in the same millisecond.
pub fn new_id() -> String {
    let now = Utc::now().timestamp_millis();
    let prev = LAST_ID
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        .unwrap_or(now);
    now.max(prev + 1).to_string()
}

pub fn binary_placeholder(filename: &str) -> String {
    format!("[Binary file: {}] Content is not available as text.", filename)
}

impl InstructionRecord {
    /// Classify an uploaded instruction file and build its record.
    pub fn from_upload(
        id: String,
        filename: &str,
        data: &[u8],
        custom_prompt: Option<String>,
        is_checklist: bool,
    ) -> Self {
        let (content, is_binary) = match decode_text(data, filename) {
            Some(text) => (text, false),
            None => (binary_placeholder(filename), true),
        };
        let now = Utc::now();
        Self {
            id,
            filename: filename.to_string(),
            content,
            is_binary,
            custom_prompt: custom_prompt.filter(|p| !p.trim().is_empty()),
            is_checklist,
            feedback: None,
            checklist: None,
            fields: BTreeMap::new(),
            backup_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a manual edit. Nothing is changed when the patch is rejected.
    pub fn apply(&mut self, patch: InstructionPatch) -> Result<(), PatchError> {
        if patch.content.is_some() && self.is_binary {
            return Err(PatchError::BinaryContent(self.id.clone()));
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(prompt) = patch.custom_prompt {
            self.custom_prompt = Some(prompt).filter(|p| !p.trim().is_empty());
        }
        if let Some(flag) = patch.is_checklist {
            self.is_checklist = flag;
        }
        if let Some(feedback) = patch.feedback {
            self.feedback = Some(feedback);
        }
        if let Some(items) = patch.checklist {
            self.checklist = Some(checklist::normalize(items));
        }
        if let Some(fields) = patch.fields {
            self.fields = fields;
        }
        self.touch();
        Ok(())
    }

    /// Store a freshly generated checklist, discarding any previous one.
    pub fn replace_checklist(&mut self, items: Vec<ChecklistItem>) {
        self.checklist = Some(checklist::normalize(items));
        self.is_checklist = true;
        self.touch();
    }

    pub fn replace_feedback(&mut self, feedback: String) {
        self.feedback = Some(feedback);
        self.touch();
    }

    /// Guidance text for prompts: content (unless binary) plus custom prompt.
    pub fn guidance_text(&self) -> String {
        let mut parts = Vec::new();
        if !self.is_binary {
            parts.push(format!("Instruction file \"{}\":\n{}", self.filename, self.content));
        } else if let Some(url) = &self.backup_url {
            parts.push(format!("Instruction file \"{}\" is available at {}", self.filename, url));
        }
        if let Some(prompt) = &self.custom_prompt {
            parts.push(format!("Custom instructions: {}", prompt));
        }
        parts.join("\n\n")
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::checklist::Compliance;

    fn text_record() -> InstructionRecord {
        InstructionRecord::from_upload("1".into(), "rubric.txt", b"Be concise.\n", None, false)
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let ids: Vec<i64> = (0..50).map(|_| new_id().parse().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn text_upload_keeps_exact_bytes() {
        let record = text_record();
        assert_eq!(record.content, "Be concise.\n");
        assert!(!record.is_binary);
    }

    #[test]
    fn binary_upload_stores_placeholder_with_filename() {
        let record =
            InstructionRecord::from_upload("2".into(), "model.bin", b"Be concise.", None, false);
        assert!(record.is_binary);
        assert_eq!(record.content, binary_placeholder("model.bin"));
        assert!(record.content.contains("model.bin"));
    }

    #[test]
    fn binary_content_cannot_be_patched() {
        let mut record =
            InstructionRecord::from_upload("3".into(), "scan.pdf", b"%PDF", None, false);
        let before = record.clone();
        let err = record
            .apply(InstructionPatch {
                content: Some("new".into()),
                feedback: Some("ignored".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err, PatchError::BinaryContent("3".into()));
        assert_eq!(record, before);
    }

    #[test]
    fn patch_updates_selected_fields() {
        let mut record = text_record();
        record
            .apply(InstructionPatch {
                content: Some("Be thorough.".into()),
                custom_prompt: Some("Focus on structure".into()),
                fields: Some(BTreeMap::from([("course".to_string(), "CS101".to_string())])),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(record.content, "Be thorough.");
        assert_eq!(record.custom_prompt.as_deref(), Some("Focus on structure"));
        assert_eq!(record.fields.get("course").map(String::as_str), Some("CS101"));

        record
            .apply(InstructionPatch {
                custom_prompt: Some(String::new()),
                ..Default::default()
            })
            .unwrap();
        assert!(record.custom_prompt.is_none());
    }

    #[test]
    fn replacing_a_checklist_discards_the_old_one() {
        let mut record = text_record();
        let mut first = checklist::blank();
        first[0].compliance = Compliance::Compliant;
        first[0].remark = "old".into();
        record.replace_checklist(first);

        let mut second = checklist::blank();
        second[1].compliance = Compliance::NonCompliant;
        record.replace_checklist(second);

        let stored = record.checklist.as_ref().unwrap();
        assert_eq!(stored.len(), 8);
        assert_eq!(stored[0].compliance, Compliance::NotAssessed);
        assert_eq!(stored[0].remark, "");
        assert_eq!(stored[1].compliance, Compliance::NonCompliant);
        assert!(record.is_checklist);
    }

    #[test]
    fn guidance_uses_backup_url_for_binary_records() {
        let mut record =
            InstructionRecord::from_upload("4".into(), "style-guide.docx", b"PK", Some("Check tone".into()), false);
        record.backup_url = Some("https://drive.test/style-guide".into());
        let text = record.guidance_text();
        assert!(text.contains("https://drive.test/style-guide"));
        assert!(text.contains("Check tone"));
        assert!(!text.contains("[Binary file"));
    }
}
