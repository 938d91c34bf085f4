//! Generative-text inference.

use super::error::ProviderError;
use super::storage::check;
use crate::config::InferenceConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Shape the model should answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub format: OutputFormat,
}

impl GenerateRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            format: OutputFormat::Text,
        }
    }

    pub fn json(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            format: OutputFormat::Json,
        }
    }
}

#[async_trait]
pub trait InferenceProvider: Send + Sync {
    fn model(&self) -> &str;

    /// Single attempt; the reply text is returned as-is.
    async fn generate(&self, request: &GenerateRequest) -> Result<String, ProviderError>;
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    http: Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiClient {
    /// Build a client when an API key is configured, `None` otherwise.
    pub fn from_config(config: &InferenceConfig, timeout: Duration) -> Result<Option<Self>> {
        let Some(key) = config.api_key.clone() else {
            return Ok(None);
        };
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build inference HTTP client")?;
        Ok(Some(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: key,
            model: config.model.clone(),
        }))
    }
}

#[async_trait]
impl InferenceProvider for GeminiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        );
        let body = GeminiRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: &request.prompt,
                }],
            }],
            generation_config: match request.format {
                OutputFormat::Json => Some(GenerationConfig {
                    response_mime_type: "application/json",
                }),
                OutputFormat::Text => None,
            },
        };

        debug!(model = %self.model, prompt_len = request.prompt.len(), "Sending inference request");
        let started = Instant::now();
        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let reply: GeminiResponse = check(resp).await?.json().await?;

        let text = reply_text(reply)?;
        info!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            reply_len = text.len(),
            "Inference complete"
        );
        Ok(text)
    }
}

fn reply_text(reply: GeminiResponse) -> Result<String, ProviderError> {
    let text: String = reply
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = reply
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .map(|r| format!("prompt blocked: {}", r))
            .unwrap_or_else(|| "empty reply".to_string());
        return Err(ProviderError::InvalidResponse(reason));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_parts_are_concatenated() {
        let reply: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"world"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(reply_text(reply).unwrap(), "Hello world");
    }

    #[test]
    fn blocked_prompt_is_an_invalid_response() {
        let reply: GeminiResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        let err = reply_text(reply).unwrap_err();
        assert_eq!(err.to_string(), "invalid response: prompt blocked: SAFETY");
    }

    #[test]
    fn json_format_sets_response_mime_type() {
        let body = GeminiRequest {
            contents: vec![],
            generation_config: Some(GenerationConfig {
                response_mime_type: "application/json",
            }),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }
}
