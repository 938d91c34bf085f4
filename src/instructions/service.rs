//! Instruction operations behind the HTTP handlers.

use super::checklist;
use super::record::{new_id, InstructionPatch, InstructionRecord, PatchError};
use super::store::InstructionStore;
use crate::error::{ApiError, ApiResult};
use crate::files::extract::guess_mime_type;
use crate::files::heuristic::{self, Guidance};
use crate::files::{AnalysisResult, AnalysisSource};
use crate::prompts;
use crate::providers::{Dependencies, GenerateRequest, ProviderError};
use std::sync::Arc;
use tracing::{info, warn};

/// An uploaded instruction file before it becomes a record.
#[derive(Debug, Clone)]
pub struct NewInstruction {
    pub filename: String,
    pub data: Vec<u8>,
    pub custom_prompt: Option<String>,
    pub is_checklist: bool,
}

#[derive(Clone)]
pub struct InstructionService {
    store: Arc<dyn InstructionStore>,
    deps: Dependencies,
}

impl InstructionService {
    pub fn new(store: Arc<dyn InstructionStore>, deps: Dependencies) -> Self {
        Self { store, deps }
    }

    pub fn store(&self) -> &Arc<dyn InstructionStore> {
        &self.store
    }

    pub async fn create(&self, upload: NewInstruction) -> ApiResult<InstructionRecord> {
        if upload.filename.trim().is_empty() {
            return Err(ApiError::BadRequest("instruction file name is empty".into()));
        }
        let mut record = InstructionRecord::from_upload(
            new_id(),
            &upload.filename,
            &upload.data,
            upload.custom_prompt,
            upload.is_checklist,
        );

        if let Some(storage) = &self.deps.storage {
            let mime = guess_mime_type(&upload.filename);
            match storage.upload(&upload.filename, &mime, upload.data).await {
                Ok(object) => record.backup_url = Some(object.web_content_link),
                Err(e) => warn!(
                    filename = %upload.filename,
                    error = %e,
                    "Instruction backup upload failed"
                ),
            }
        }

        self.store.put(&record)?;
        info!(
            id = %record.id,
            filename = %record.filename,
            binary = record.is_binary,
            "Instruction created"
        );
        Ok(record)
    }

    pub fn list(&self) -> ApiResult<Vec<InstructionRecord>> {
        Ok(self.store.list()?)
    }

    pub fn get(&self, id: &str) -> ApiResult<InstructionRecord> {
        self.store
            .get(id)?
            .ok_or_else(|| ApiError::NotFound(format!("Instruction not found: {}", id)))
    }

    pub fn update(&self, id: &str, patch: InstructionPatch) -> ApiResult<InstructionRecord> {
        let mut record = self.get(id)?;
        record.apply(patch).map_err(|e| match e {
            PatchError::BinaryContent(_) => ApiError::BadRequest(e.to_string()),
        })?;
        self.store.put(&record)?;
        info!(id, "Instruction updated");
        Ok(record)
    }

    pub fn delete(&self, id: &str) -> ApiResult<()> {
        if !self.store.delete(id)? {
            return Err(ApiError::NotFound(format!("Instruction not found: {}", id)));
        }
        info!(id, "Instruction deleted");
        Ok(())
    }

    /// Regenerate feedback on the instruction itself, replacing any previous
    /// feedback. Falls back to local analysis when AI is unavailable.
    pub async fn generate_feedback(
        &self,
        id: &str,
    ) -> ApiResult<(InstructionRecord, AnalysisResult)> {
        let mut record = self.get(id)?;

        let analysis = match self.ai_feedback(&record).await {
            Ok(text) => AnalysisResult::new(AnalysisSource::Ai, text, None),
            Err(reason) => {
                warn!(id, reason = %reason, "Using local feedback for instruction");
                local_feedback(&record).with_error(reason)
            }
        };

        record.replace_feedback(analysis.feedback.clone());
        self.write_back(&record)?;
        Ok((record, analysis))
    }

    /// Store a regenerated record unless it was deleted while the model ran.
    fn write_back(&self, record: &InstructionRecord) -> ApiResult<()> {
        if self.store.get(&record.id)?.is_none() {
            return Err(ApiError::NotFound(format!(
                "Instruction not found: {}",
                record.id
            )));
        }
        self.store.put(record)?;
        Ok(())
    }

    async fn ai_feedback(&self, record: &InstructionRecord) -> Result<String, String> {
        let inference = self
            .deps
            .inference
            .as_ref()
            .ok_or_else(|| ProviderError::NotConfigured.to_string())?;
        let prompt = prompts::instruction_review(record)
            .ok_or_else(|| "no text content or backup URL to analyze".to_string())?;
        inference
            .generate(&GenerateRequest::text(prompt))
            .await
            .map_err(|e| e.to_string())
    }

    /// Score the instruction against the fixed checklist, replacing any
    /// previous checklist. Requires inference; nothing is stored on failure.
    pub async fn generate_checklist(&self, id: &str) -> ApiResult<InstructionRecord> {
        let mut record = self.get(id)?;
        let inference = self
            .deps
            .inference
            .as_ref()
            .ok_or_else(|| ApiError::Unavailable("AI analysis is not configured".into()))?;

        let subject = if !record.is_binary {
            record.content.clone()
        } else if let Some(url) = &record.backup_url {
            format!("The document \"{}\" is available at {}", record.filename, url)
        } else {
            return Err(ApiError::BadRequest(
                "binary instruction has no backup URL to analyze".into(),
            ));
        };

        let prompt = checklist::prompt(&subject, record.custom_prompt.as_deref());
        let reply = inference.generate(&GenerateRequest::json(prompt)).await?;
        let items = checklist::parse_reply(&reply).map_err(|e| {
            ApiError::Upstream(ProviderError::InvalidResponse(e.to_string()))
        })?;

        record.replace_checklist(items);
        self.write_back(&record)?;
        info!(id, "Checklist regenerated");
        Ok(record)
    }
}

fn local_feedback(record: &InstructionRecord) -> AnalysisResult {
    let guidance = Guidance {
        instruction_name: None,
        custom_prompt: record.custom_prompt.as_deref(),
    };
    if record.is_binary {
        let feedback = format!(
            "## File Analysis: {}\n\nThis instruction is a binary file; its content can only be \
             reviewed with AI analysis.\n\n_Generated locally without AI analysis._",
            record.filename
        );
        return AnalysisResult::new(AnalysisSource::Local, feedback, None);
    }
    heuristic::analyze(&record.filename, record.content.as_bytes(), &guidance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::checklist::Compliance;
    use crate::instructions::MemoryStore;
    use crate::providers::{InferenceProvider, ObjectStorage, StoredObject};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct ScriptedModel {
        replies: Mutex<Vec<Result<String, ProviderError>>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
            })
        }
    }

    #[async_trait]
    impl InferenceProvider for ScriptedModel {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _request: &GenerateRequest) -> Result<String, ProviderError> {
            self.replies.lock().remove(0)
        }
    }

    struct FixedStorage;

    #[async_trait]
    impl ObjectStorage for FixedStorage {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn upload(
            &self,
            _filename: &str,
            _mime_type: &str,
            _data: Vec<u8>,
        ) -> Result<StoredObject, ProviderError> {
            Ok(StoredObject {
                id: "obj".into(),
                web_view_link: "https://view.test/obj".into(),
                web_content_link: "https://dl.test/obj".into(),
            })
        }
    }

    fn service(deps: Dependencies) -> InstructionService {
        InstructionService::new(Arc::new(MemoryStore::new()), deps)
    }

    fn upload(name: &str, data: &[u8]) -> NewInstruction {
        NewInstruction {
            filename: name.into(),
            data: data.to_vec(),
            custom_prompt: None,
            is_checklist: false,
        }
    }

    #[tokio::test]
    async fn create_sets_backup_url_when_storage_is_available() {
        let svc = service(Dependencies {
            storage: Some(Arc::new(FixedStorage)),
            inference: None,
        });
        let record = svc.create(upload("guide.txt", b"rules")).await.unwrap();
        assert_eq!(record.backup_url.as_deref(), Some("https://dl.test/obj"));
        assert_eq!(svc.get(&record.id).unwrap(), record);
    }

    #[tokio::test]
    async fn feedback_falls_back_to_local_without_inference() {
        let svc = service(Dependencies::default());
        let record = svc.create(upload("guide.txt", b"one two")).await.unwrap();

        let (updated, analysis) = svc.generate_feedback(&record.id).await.unwrap();
        assert_eq!(analysis.source, AnalysisSource::Local);
        assert_eq!(analysis.error.as_deref(), Some("not configured"));
        assert_eq!(updated.feedback.as_deref(), Some(analysis.feedback.as_str()));
    }

    #[tokio::test]
    async fn feedback_uses_model_reply_when_available() {
        let svc = service(Dependencies {
            storage: None,
            inference: Some(ScriptedModel::new(vec![Ok("Looks good.".into())])),
        });
        let record = svc.create(upload("guide.txt", b"text")).await.unwrap();
        let (updated, analysis) = svc.generate_feedback(&record.id).await.unwrap();
        assert_eq!(analysis.source, AnalysisSource::Ai);
        assert_eq!(updated.feedback.as_deref(), Some("Looks good."));
    }

    #[tokio::test]
    async fn checklist_regeneration_replaces_previous_result() {
        let first = r#"[{"sno":1,"compliance":"compliant","remark":"ok"}]"#;
        let second = r#"[{"sno":2,"compliance":"non_compliant","remark":"missing"}]"#;
        let svc = service(Dependencies {
            storage: None,
            inference: Some(ScriptedModel::new(vec![
                Ok(first.into()),
                Ok(second.into()),
            ])),
        });
        let record = svc.create(upload("plan.md", b"# Plan")).await.unwrap();

        let after_first = svc.generate_checklist(&record.id).await.unwrap();
        assert_eq!(
            after_first.checklist.as_ref().unwrap()[0].compliance,
            Compliance::Compliant
        );

        let after_second = svc.generate_checklist(&record.id).await.unwrap();
        let items = after_second.checklist.unwrap();
        assert_eq!(items.len(), 8);
        assert_eq!(items[0].compliance, Compliance::NotAssessed);
        assert_eq!(items[1].compliance, Compliance::NonCompliant);
        assert!(after_second.is_checklist);
    }

    #[tokio::test]
    async fn checklist_requires_inference() {
        let svc = service(Dependencies::default());
        let record = svc.create(upload("plan.md", b"# Plan")).await.unwrap();
        let err = svc.generate_checklist(&record.id).await.unwrap_err();
        assert!(matches!(err, ApiError::Unavailable(_)));
        assert!(svc.get(&record.id).unwrap().checklist.is_none());
    }

    #[tokio::test]
    async fn rate_limited_checklist_leaves_record_untouched() {
        let svc = service(Dependencies {
            storage: None,
            inference: Some(ScriptedModel::new(vec![Err(ProviderError::RateLimited(
                "quota".into(),
            ))])),
        });
        let record = svc.create(upload("plan.md", b"# Plan")).await.unwrap();
        let err = svc.generate_checklist(&record.id).await.unwrap_err();
        match err {
            ApiError::Upstream(e) => assert!(e.is_rate_limited()),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(svc.get(&record.id).unwrap().checklist.is_none());
    }

    /// Deletes every stored record when asked to generate, then replies.
    struct DeletingModel {
        store: Arc<MemoryStore>,
        reply: String,
    }

    #[async_trait]
    impl InferenceProvider for DeletingModel {
        fn model(&self) -> &str {
            "deleting"
        }

        async fn generate(&self, _request: &GenerateRequest) -> Result<String, ProviderError> {
            for record in self.store.list().unwrap() {
                self.store.delete(&record.id).unwrap();
            }
            Ok(self.reply.clone())
        }
    }

    fn deleting_service(reply: &str) -> (Arc<MemoryStore>, InstructionService) {
        let store = Arc::new(MemoryStore::new());
        let model = DeletingModel {
            store: store.clone(),
            reply: reply.into(),
        };
        let svc = InstructionService::new(
            store.clone(),
            Dependencies {
                storage: None,
                inference: Some(Arc::new(model)),
            },
        );
        (store, svc)
    }

    #[tokio::test]
    async fn feedback_does_not_resurrect_instruction_deleted_mid_generation() {
        let (store, svc) = deleting_service("Looks good.");
        let record = svc.create(upload("guide.txt", b"text")).await.unwrap();

        let err = svc.generate_feedback(&record.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(store.get(&record.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn checklist_does_not_resurrect_instruction_deleted_mid_generation() {
        let reply = r#"[{"sno":1,"compliance":"compliant","remark":"ok"}]"#;
        let (store, svc) = deleting_service(reply);
        let record = svc.create(upload("plan.md", b"# Plan")).await.unwrap();

        let err = svc.generate_checklist(&record.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(store.get(&record.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn binary_checklist_points_model_at_download_link() {
        struct Recording(Mutex<Vec<String>>);

        #[async_trait]
        impl InferenceProvider for Recording {
            fn model(&self) -> &str {
                "recording"
            }

            async fn generate(&self, request: &GenerateRequest) -> Result<String, ProviderError> {
                self.0.lock().push(request.prompt.clone());
                Ok(r#"[{"sno":1,"compliance":"compliant","remark":"ok"}]"#.into())
            }
        }

        let model = Arc::new(Recording(Mutex::new(Vec::new())));
        let svc = service(Dependencies {
            storage: Some(Arc::new(FixedStorage)),
            inference: Some(model.clone()),
        });
        let record = svc.create(upload("scan.pdf", b"%PDF-1.7")).await.unwrap();
        assert!(record.is_binary);

        svc.generate_checklist(&record.id).await.unwrap();
        let prompts = model.0.lock();
        assert!(prompts[0].contains("https://dl.test/obj"));
        assert!(!prompts[0].contains("https://view.test/obj"));
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let svc = service(Dependencies::default());
        svc.create(upload("keep.txt", b"x")).await.unwrap();
        assert!(matches!(svc.delete("missing"), Err(ApiError::NotFound(_))));
        assert_eq!(svc.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn editing_binary_content_is_a_bad_request() {
        let svc = service(Dependencies::default());
        let record = svc.create(upload("scan.bin", b"\x00\x01")).await.unwrap();
        let err = svc
            .update(
                &record.id,
                InstructionPatch {
                    content: Some("text".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
