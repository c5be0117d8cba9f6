use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::vision::{RemoteCallFailure, VisionModel};
use crate::models::AnalysisRequest;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

/// Google Gemini `generateContent` client
pub struct GeminiService {
    api_key: String,
    model: String,
    api_base: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl GeminiService {
    pub fn new(
        api_key: String,
        model: String,
        api_base: String,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            api_key,
            model,
            api_base: api_base.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        )
    }

    fn build_body<'a>(&self, request: &'a AnalysisRequest) -> GenerateContentRequest<'a> {
        let encoded = general_purpose::STANDARD.encode(&request.image_bytes);

        GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text {
                        text: request.instruction_text,
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: request.mime_type(),
                            data: encoded,
                        },
                    },
                ],
            }],
        }
    }

    fn classify(&self, err: reqwest::Error) -> RemoteCallFailure {
        if err.is_timeout() {
            RemoteCallFailure::Timeout(self.timeout)
        } else if err.is_decode() {
            RemoteCallFailure::Decode(err.to_string())
        } else {
            RemoteCallFailure::Network(err.to_string())
        }
    }
}

/// Joins the text parts of the first candidate. Blocked or empty replies yield `None`.
fn extract_text(response: GenerateContentResponse) -> Option<String> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        log::warn!("⚠️ Gemini blocked the prompt: {}", reason);
    }

    let candidate = response.candidates.into_iter().next()?;
    if let Some(reason) = candidate.finish_reason.as_deref() {
        log::debug!("🏁 Gemini finish reason: {}", reason);
    }

    let text: String = candidate
        .content?
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait::async_trait]
impl VisionModel for GeminiService {
    async fn generate(&self, request: &AnalysisRequest) -> Result<Option<String>, RemoteCallFailure> {
        let body = self.build_body(request);

        log::info!("🤖 Sending request to Gemini with model: {}", self.model);
        log::debug!(
            "📤 Inline image: {} bytes ({})",
            request.image_bytes.len(),
            request.mime_type()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        log::debug!("📥 Gemini response status: {}", status);

        let response_text = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            log::error!("❌ Gemini API error response: {}", response_text);
            return Err(RemoteCallFailure::Api {
                status: status.as_u16(),
                body: response_text,
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&response_text)
            .map_err(|e| RemoteCallFailure::Decode(e.to_string()))?;

        Ok(extract_text(parsed))
    }

    fn name(&self) -> &str {
        &self.model
    }
}
