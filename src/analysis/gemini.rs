//! Direct Gemini `generateContent` client.
//!
//! Used when no proxy is configured. The API key travels as a query parameter
//! and is never logged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::sanitize::sanitize_response;
use super::types::{AnalysisClient, AnalysisRequestPayload, ParsedAiResponse};
use super::{build_http_client, ensure_success, map_send_error, AnalysisError};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const PROMPT_PREAMBLE: &str = "You are a cardiology assistant. Given patient profile and recent vitals, \
return JSON with keys overview (string), risks (array of short bullet strings), \
recommendations (array of short bullet strings). Keep responses concise. Data:\n";

pub struct GeminiClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Result<Self, AnalysisError> {
        Self::with_base_url(GEMINI_BASE_URL, api_key, model)
    }

    pub fn with_base_url(base_url: &str, api_key: &str, model: &str) -> Result<Self, AnalysisError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: build_http_client()?,
        })
    }

    /// Endpoint without the key.
    pub fn endpoint(&self) -> String {
        format!("{}/v1/models/{}:generateContent", self.base_url, self.model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub(crate) struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub(crate) struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub(crate) struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

/// Build the single-turn prompt carrying the pretty-printed payload.
pub(crate) fn build_request(
    payload: &AnalysisRequestPayload,
) -> Result<GenerateContentRequest, AnalysisError> {
    let data = serde_json::to_string_pretty(payload)
        .map_err(|e| AnalysisError::Encoding(e.to_string()))?;
    Ok(GenerateContentRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: Some(format!("{PROMPT_PREAMBLE}{data}")),
            }],
        }],
    })
}

/// Text of the first part of the first candidate, or empty.
pub(crate) fn first_candidate_text(response: &GenerateContentResponse) -> &str {
    response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .and_then(|c| c.parts.first())
        .and_then(|p| p.text.as_deref())
        .unwrap_or("")
}

/// Model text that is not JSON still has value as an overview.
pub(crate) fn parse_model_text(text: &str) -> ParsedAiResponse {
    sanitize_response(text).unwrap_or_else(|| ParsedAiResponse::from_overview(text))
}

#[async_trait]
impl AnalysisClient for GeminiClient {
    async fn analyze(
        &self,
        payload: AnalysisRequestPayload,
    ) -> Result<ParsedAiResponse, AnalysisError> {
        let request = build_request(&payload)?;
        let endpoint = self.endpoint();

        let response = self
            .client
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error(e.without_url(), &endpoint))?;

        let response = ensure_success(response).await?;
        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::InvalidResponse(e.without_url().to_string()))?;

        let text = first_candidate_text(&body);
        tracing::debug!(model = %self.model, chars = text.len(), "Gemini analysis response received");
        Ok(parse_model_text(text))
    }

    fn backend_name(&self) -> &'static str {
        "gemini"
    }
}
