//! Realtime Database REST access.
//!
//! Every call is a plain GET of `<path>.json` authenticated with the doctor's
//! current ID token. Streaming is replaced by the poll watchers in `watch`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use super::{RealtimeError, RealtimeSource};
use crate::auth::IdToken;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct FirebaseRest {
    base_url: Url,
    token: IdToken,
    client: reqwest::Client,
}

impl FirebaseRest {
    pub fn new(database_url: &str, token: IdToken) -> Result<Self, RealtimeError> {
        let base_url = Url::parse(database_url.trim())
            .map_err(|e| RealtimeError::InvalidUrl(format!("{database_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RealtimeError::InvalidUrl(database_url.to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RealtimeError::Http(e.to_string()))?;

        Ok(Self {
            base_url,
            token,
            client,
        })
    }

    /// `<base>/<segments...>.json`; segments are percent-encoded.
    pub(crate) fn node_url(&self, segments: &[&str]) -> Result<Url, RealtimeError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| RealtimeError::InvalidUrl(self.base_url.to_string()))?;
            path.pop_if_empty();
            if let Some((last, parents)) = segments.split_last() {
                path.extend(parents);
                path.push(&format!("{last}.json"));
            }
        }
        Ok(url)
    }

    /// Read at request time so a refreshed token applies to the next poll.
    pub(crate) fn auth_param(&self) -> (&'static str, String) {
        ("auth", self.token.current())
    }

    async fn get(&self, url: Url, query: &[(&str, String)]) -> Result<Value, RealtimeError> {
        let path = url.path().to_string();
        let response = self
            .client
            .get(url)
            .query(&[self.auth_param()])
            .query(query)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                if e.is_connect() || e.is_timeout() {
                    RealtimeError::Connection(e.to_string())
                } else {
                    RealtimeError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(path = %path, status = status.as_u16(), "Database request rejected");
            return Err(RealtimeError::Status {
                status: status.as_u16(),
                body: database_error_message(&body),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| RealtimeError::Decode(e.without_url().to_string()))
    }
}

/// Query string for the last `limit` readings ordered by timestamp.
/// The database requires the child key to be a quoted JSON string.
pub(crate) fn readings_query(limit: usize) -> Vec<(&'static str, String)> {
    vec![
        ("orderBy", "\"timestamp\"".to_string()),
        ("limitToLast", limit.to_string()),
    ]
}

/// Database errors arrive as `{"error": "..."}`; fall back to the raw body.
pub(crate) fn database_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl RealtimeSource for FirebaseRest {
    async fn fetch_patients(&self) -> Result<Value, RealtimeError> {
        let url = self.node_url(&["patients"])?;
        self.get(url, &[]).await
    }

    async fn fetch_profile(&self, patient_id: &str) -> Result<Value, RealtimeError> {
        let url = self.node_url(&["patients", patient_id, "profile"])?;
        self.get(url, &[]).await
    }

    async fn fetch_readings(
        &self,
        patient_id: &str,
        limit: usize,
    ) -> Result<Value, RealtimeError> {
        let url = self.node_url(&["patients", patient_id, "readings"])?;
        self.get(url, &readings_query(limit)).await
    }
}
