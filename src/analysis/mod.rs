pub mod types;
pub mod sanitize;
pub mod proxy;
pub mod gemini;
pub mod client;

pub use types::*;
pub use sanitize::*;
pub use proxy::*;
pub use gemini::*;
pub use client::*;

use std::time::Duration;

use thiserror::Error;

/// Connect timeout for analysis backends. Requests themselves run unbounded.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Gemini not configured")]
    NotConfigured,

    #[error("Select a patient with data first")]
    NoData,

    #[error("An analysis is already running")]
    Busy,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Analysis service returned error (status {status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Analysis service unreachable at {0}")]
    Connection(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Invalid JSON returned from AI: {0}")]
    InvalidResponse(String),

    #[error("Could not encode analysis request: {0}")]
    Encoding(String),

    #[error("Analysis task failed: {0}")]
    Task(String),
}

impl AnalysisError {
    /// Copy shown to the doctor for a failed manual analysis.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotConfigured => "Gemini not configured.".to_string(),
            Self::NoData => "Select a patient with data first.".to_string(),
            Self::Busy => "An analysis is already running.".to_string(),
            Self::RateLimited => "Rate limit exceeded. Please wait and try again.".to_string(),
            Self::InvalidResponse(_) => {
                "Failed to load recommendations. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Map a `reqwest` send failure, separating connect from other transport errors.
pub(crate) fn map_send_error(err: reqwest::Error, target: &str) -> AnalysisError {
    if err.is_connect() {
        AnalysisError::Connection(target.to_string())
    } else {
        AnalysisError::HttpClient(err.to_string())
    }
}

/// Turn a non-success response into the matching error. 429 gets its own variant.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, AnalysisError> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(AnalysisError::RateLimited);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AnalysisError::Upstream {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

pub(crate) fn build_http_client() -> Result<reqwest::Client, AnalysisError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| AnalysisError::HttpClient(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_has_distinct_copy() {
        assert_eq!(
            AnalysisError::RateLimited.user_message(),
            "Rate limit exceeded. Please wait and try again."
        );
    }

    #[test]
    fn unparseable_response_uses_fallback_copy() {
        let msg = AnalysisError::InvalidResponse("x".into()).user_message();
        assert_eq!(msg, "Failed to load recommendations. Please try again.");
    }

    #[test]
    fn upstream_error_mentions_status() {
        let err = AnalysisError::Upstream {
            status: 503,
            body: "busy".into(),
        };
        assert!(err.user_message().contains("503"));
    }
}
