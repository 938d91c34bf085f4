//! The upload degrade chain.
//!
//! Every request runs the same ordered steps: resolve the optional
//! instruction, analyze locally, store remotely, analyze with AI. Each step
//! yields a [`StepReport`]. Analysis strategies are ranked
//! (`ai_analysis` over `local_analysis`) and the first one that succeeded
//! wins. Local analysis cannot fail, so a feedback payload is always present.

use crate::error::ApiResult;
use crate::files::extract::{decode_text, guess_mime_type};
use crate::files::heuristic::{self, Guidance};
use crate::files::{AnalysisResult, AnalysisSource, TempStorage, UploadedFile};
use crate::instructions::{checklist, InstructionRecord, InstructionStore};
use crate::prompts::{self, FileRef};
use crate::providers::{Dependencies, GenerateRequest, ProviderError, StoredObject};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const STEP_INSTRUCTION: &str = "instruction";
pub const STEP_LOCAL: &str = "local_analysis";
pub const STEP_STORAGE: &str = "storage";
pub const STEP_AI: &str = "ai_analysis";
pub const STEP_CLEANUP: &str = "cleanup";

/// Strategy ranking, best first.
const ANALYSIS_PRIORITY: [&str; 2] = [STEP_AI, STEP_LOCAL];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Ok,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub step: &'static str,
    pub status: StepState,
    pub detail: Option<String>,
}

impl StepReport {
    fn ok(step: &'static str, detail: impl Into<String>) -> Self {
        Self {
            step,
            status: StepState::Ok,
            detail: Some(detail.into()),
        }
    }

    fn skipped(step: &'static str, reason: impl Into<String>) -> Self {
        Self {
            step,
            status: StepState::Skipped,
            detail: Some(reason.into()),
        }
    }

    fn failed(step: &'static str, error: impl Into<String>) -> Self {
        Self {
            step,
            status: StepState::Failed,
            detail: Some(error.into()),
        }
    }

    /// One-line status as shown in the `services` map.
    pub fn summary(&self) -> String {
        let detail = self.detail.as_deref().unwrap_or_default();
        match self.status {
            StepState::Ok if detail.is_empty() => "ok".to_string(),
            StepState::Ok | StepState::Skipped => detail.to_string(),
            StepState::Failed => format!("failed: {}", detail),
        }
    }
}

/// Everything the upload endpoint returns.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub success: bool,
    pub file: UploadedFile,
    pub analysis: AnalysisResult,
    pub services: BTreeMap<&'static str, String>,
    pub steps: Vec<StepReport>,
}

/// A strategy's contribution to the final analysis.
struct Attempt {
    step: &'static str,
    result: Result<AnalysisResult, String>,
}

/// Pick the highest-ranked successful attempt; attach the errors of the
/// better-ranked strategies that failed.
fn select(mut attempts: Vec<Attempt>) -> Option<AnalysisResult> {
    attempts.sort_by_key(|a| {
        ANALYSIS_PRIORITY
            .iter()
            .position(|s| *s == a.step)
            .unwrap_or(usize::MAX)
    });
    let mut errors = Vec::new();
    for attempt in attempts {
        match attempt.result {
            Ok(mut analysis) => {
                if !errors.is_empty() && analysis.error.is_none() {
                    analysis.error = Some(errors.join("; "));
                }
                return Some(analysis);
            }
            Err(e) => errors.push(format!("{}: {}", attempt.step, e)),
        }
    }
    None
}

#[derive(Clone)]
pub struct UploadPipeline {
    temp: TempStorage,
    store: Arc<dyn InstructionStore>,
    deps: Dependencies,
}

impl UploadPipeline {
    pub fn new(temp: TempStorage, store: Arc<dyn InstructionStore>, deps: Dependencies) -> Self {
        Self { temp, store, deps }
    }

    pub async fn run(
        &self,
        filename: &str,
        data: &[u8],
        instruction_id: Option<&str>,
    ) -> ApiResult<UploadOutcome> {
        let temp = self.temp.store(filename, data).await?;
        debug!(path = %temp.path().display(), "Upload staged");

        let mut steps = Vec::new();
        let instruction = match instruction_id {
            Some(id) => self.resolve_instruction(id, &mut steps),
            None => None,
        };

        // Read back from disk; a failure here aborts the request and the
        // guard still removes the file.
        let bytes = temp.read().await?;
        let guidance = Guidance {
            instruction_name: instruction.as_ref().map(|r| r.filename.as_str()),
            custom_prompt: instruction.as_ref().and_then(|r| r.custom_prompt.as_deref()),
        };
        let local = heuristic::analyze(filename, &bytes, &guidance);
        steps.push(StepReport::ok(STEP_LOCAL, "ok"));

        let mut file = UploadedFile::local(filename, bytes.len() as u64);
        let stored = self.store_remote(filename, &bytes, &mut steps).await;
        if let Some(object) = &stored {
            file.id = Some(object.id.clone());
            file.web_view_link = Some(object.web_view_link.clone());
            file.web_content_link = Some(object.web_content_link.clone());
        }

        let ai = self
            .analyze_remote(filename, &bytes, stored.as_ref(), instruction.as_ref(), &local)
            .await;
        steps.push(match &ai {
            Ok(_) => StepReport::ok(STEP_AI, "ok"),
            Err(Skip(reason)) => StepReport::skipped(STEP_AI, reason.clone()),
            Err(Fail(error)) => StepReport::failed(STEP_AI, error.clone()),
        });

        let attempts = vec![
            Attempt {
                step: STEP_LOCAL,
                result: Ok(local),
            },
            Attempt {
                step: STEP_AI,
                result: ai.map_err(|e| match e {
                    Skip(reason) => reason,
                    Fail(error) => error,
                }),
            },
        ];
        let Some(analysis) = select(attempts) else {
            return Err(anyhow::anyhow!("no analysis strategy produced feedback").into());
        };

        match temp.remove().await {
            Ok(()) => steps.push(StepReport::ok(STEP_CLEANUP, "ok")),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Temp file cleanup failed");
                steps.push(StepReport::failed(STEP_CLEANUP, e.to_string()));
            }
        }

        info!(
            filename,
            size = file.size,
            source = ?analysis.source,
            stored = file.id.is_some(),
            "Upload processed"
        );

        let services = steps.iter().map(|s| (s.step, s.summary())).collect();
        Ok(UploadOutcome {
            success: true,
            file,
            analysis,
            services,
            steps,
        })
    }

    fn resolve_instruction(
        &self,
        id: &str,
        steps: &mut Vec<StepReport>,
    ) -> Option<InstructionRecord> {
        match self.store.get(id) {
            Ok(Some(record)) => {
                steps.push(StepReport::ok(STEP_INSTRUCTION, record.filename.clone()));
                Some(record)
            }
            Ok(None) => {
                steps.push(StepReport::failed(STEP_INSTRUCTION, format!("{} not found", id)));
                None
            }
            Err(e) => {
                warn!(id, error = %e, "Instruction lookup failed");
                steps.push(StepReport::failed(STEP_INSTRUCTION, e.to_string()));
                None
            }
        }
    }

    async fn store_remote(
        &self,
        filename: &str,
        bytes: &[u8],
        steps: &mut Vec<StepReport>,
    ) -> Option<StoredObject> {
        let Some(storage) = &self.deps.storage else {
            steps.push(StepReport::skipped(STEP_STORAGE, ProviderError::NotConfigured.to_string()));
            return None;
        };
        match storage
            .upload(filename, &guess_mime_type(filename), bytes.to_vec())
            .await
        {
            Ok(object) => {
                steps.push(StepReport::ok(STEP_STORAGE, format!("uploaded to {}", storage.name())));
                Some(object)
            }
            Err(e) => {
                warn!(filename, error = %e, "Remote storage upload failed");
                steps.push(StepReport::failed(STEP_STORAGE, e.to_string()));
                None
            }
        }
    }

    async fn analyze_remote(
        &self,
        filename: &str,
        bytes: &[u8],
        stored: Option<&StoredObject>,
        instruction: Option<&InstructionRecord>,
        local: &AnalysisResult,
    ) -> Result<AnalysisResult, AiOutcome> {
        let Some(inference) = &self.deps.inference else {
            return Err(Skip(ProviderError::NotConfigured.to_string()));
        };
        let Some(object) = stored else {
            return Err(Skip("skipped: remote storage unavailable".to_string()));
        };

        let file_ref = FileRef {
            name: filename,
            size: bytes.len() as u64,
            view_url: &object.web_view_link,
            download_url: &object.web_content_link,
        };
        let text = decode_text(bytes, filename);

        let checklist_mode = instruction.is_some_and(|r| r.is_checklist);
        let request = if checklist_mode {
            let guidance = instruction.map(InstructionRecord::guidance_text);
            GenerateRequest::json(checklist::prompt(
                &prompts::checklist_subject(file_ref, text.as_deref()),
                guidance.as_deref(),
            ))
        } else {
            GenerateRequest::text(prompts::upload_review(file_ref, text.as_deref(), instruction))
        };

        let reply = inference.generate(&request).await.map_err(|e| {
            warn!(filename, error = %e, rate_limited = e.is_rate_limited(), "AI analysis failed");
            Fail(e.to_string())
        })?;

        let mut analysis = if checklist_mode {
            let items = checklist::parse_reply(&reply).map_err(|e| {
                Fail(ProviderError::InvalidResponse(e.to_string()).to_string())
            })?;
            let mut analysis =
                AnalysisResult::new(AnalysisSource::Ai, checklist::to_markdown(&items), None);
            analysis.checklist = Some(items);
            analysis
        } else {
            AnalysisResult::new(AnalysisSource::Ai, reply, None)
        };
        analysis.file_info = local.file_info.clone();
        Ok(analysis)
    }
}

/// Why the AI strategy produced nothing.
enum AiOutcome {
    Skip(String),
    Fail(String),
}
use AiOutcome::{Fail, Skip};
