use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::GeminiConfig;

const API_KEY_HEADER: &str = "x-goog-api-key";

pub const RESUME_PROMPT: &str = "Extract JSON with name, skills, work experience from this resume.";

#[derive(Debug, Error)]
pub enum ResumeParseError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("model returned no candidates")]
    EmptyContent,

    #[error("model output is not JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("model output is not a JSON object")]
    NotAnObject,
}

// without the request URL
impl From<reqwest::Error> for ResumeParseError {
    fn from(err: reqwest::Error) -> Self {
        ResumeParseError::Http(err.without_url())
    }
}

/// Turns a PDF resume into structured JSON.
#[async_trait]
pub trait ResumeParser: Send + Sync {
    async fn parse_pdf(&self, pdf: &[u8]) -> Result<Value, ResumeParseError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
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

impl GenerateContentResponse {
    fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ResumeParseError> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self { client, config })
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl ResumeParser for GeminiClient {
    async fn parse_pdf(&self, pdf: &[u8]) -> Result<Value, ResumeParseError> {
        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::Inline {
                        inline_data: InlineData {
                            mime_type: "application/pdf",
                            data: STANDARD.encode(pdf),
                        },
                    },
                    RequestPart::Text {
                        text: RESUME_PROMPT,
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(self.generate_url())
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "resume parsing request rejected");
            return Err(ResumeParseError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let text = parsed.first_text().ok_or(ResumeParseError::EmptyContent)?;
        tracing::debug!(chars = text.len(), "resume parsing response received");
        parse_model_json(text)
    }
}

/// Parses model output as a JSON object, tolerating Markdown fences.
pub fn parse_model_json(text: &str) -> Result<Value, ResumeParseError> {
    let value: Value = serde_json::from_str(strip_json_fences(text))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(ResumeParseError::NotAnObject)
    }
}

fn strip_json_fences(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(stripped) = text.strip_prefix("```") {
        text = stripped.strip_suffix("```").unwrap_or(stripped).trim();
    }
    match text.strip_prefix("json") {
        Some(rest) if !rest.starts_with('"') => rest.trim_start(),
        _ => text,
    }
}
