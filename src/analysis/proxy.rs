use async_trait::async_trait;

use super::sanitize::sanitize_response;
use super::types::{AnalysisClient, AnalysisRequestPayload, ParsedAiResponse};
use super::{build_http_client, ensure_success, map_send_error, AnalysisError};

/// Posts the raw payload to an operator-hosted analysis endpoint.
///
/// The endpoint answers with free text that should contain the result JSON;
/// no content-type is enforced, so the body always goes through the sanitizer.
pub struct ProxyClient {
    url: String,
    client: reqwest::Client,
}

impl ProxyClient {
    pub fn new(url: &str) -> Result<Self, AnalysisError> {
        Ok(Self {
            url: url.trim().to_string(),
            client: build_http_client()?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Interpret a successful proxy body.
pub(crate) fn parse_proxy_body(body: &str) -> Result<ParsedAiResponse, AnalysisError> {
    sanitize_response(body).ok_or_else(|| {
        AnalysisError::InvalidResponse(format!("{} bytes of unparseable text", body.len()))
    })
}

#[async_trait]
impl AnalysisClient for ProxyClient {
    async fn analyze(
        &self,
        payload: AnalysisRequestPayload,
    ) -> Result<ParsedAiResponse, AnalysisError> {
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| map_send_error(e, &self.url))?;

        let response = ensure_success(response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::HttpClient(e.to_string()))?;

        tracing::debug!(bytes = body.len(), "Proxy analysis response received");
        parse_proxy_body(&body)
    }

    fn backend_name(&self) -> &'static str {
        "proxy"
    }
}
