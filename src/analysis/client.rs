use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::gemini::GeminiClient;
use super::proxy::ProxyClient;
use super::types::{AnalysisClient, AnalysisRequestPayload, ParsedAiResponse};
use super::AnalysisError;
use crate::config::AnalysisBackend;

/// Single factory for the configured analysis backend.
pub fn client_from_config(
    backend: &AnalysisBackend,
) -> Result<Arc<dyn AnalysisClient>, AnalysisError> {
    let client: Arc<dyn AnalysisClient> = match backend {
        AnalysisBackend::Proxy { url } => Arc::new(ProxyClient::new(url)?),
        AnalysisBackend::Direct { api_key, model } => Arc::new(GeminiClient::new(api_key, model)?),
        AnalysisBackend::Unconfigured => Arc::new(UnconfiguredClient),
    };
    tracing::info!(backend = client.backend_name(), "Analysis backend selected");
    Ok(client)
}

/// Stands in when neither proxy nor key is set; every request fails.
pub struct UnconfiguredClient;

#[async_trait]
impl AnalysisClient for UnconfiguredClient {
    async fn analyze(
        &self,
        _payload: AnalysisRequestPayload,
    ) -> Result<ParsedAiResponse, AnalysisError> {
        Err(AnalysisError::NotConfigured)
    }

    fn backend_name(&self) -> &'static str {
        "unconfigured"
    }
}

/// Mock analysis client for testing. Replays queued results, then repeats
/// the default, and records every payload it receives.
pub struct MockAnalysisClient {
    queued: Mutex<VecDeque<Result<ParsedAiResponse, AnalysisError>>>,
    default: Result<ParsedAiResponse, AnalysisError>,
    payloads: Mutex<Vec<AnalysisRequestPayload>>,
    delay: Option<Duration>,
}

impl MockAnalysisClient {
    pub fn new(response: ParsedAiResponse) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            default: Ok(response),
            payloads: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn failing(error: AnalysisError) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            default: Err(error),
            payloads: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn then(self, result: Result<ParsedAiResponse, AnalysisError>) -> Self {
        if let Ok(mut queued) = self.queued.lock() {
            queued.push_back(result);
        }
        self
    }

    /// Hold every response for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.payloads.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn payloads(&self) -> Vec<AnalysisRequestPayload> {
        self.payloads.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AnalysisClient for MockAnalysisClient {
    async fn analyze(
        &self,
        payload: AnalysisRequestPayload,
    ) -> Result<ParsedAiResponse, AnalysisError> {
        if let Ok(mut payloads) = self.payloads.lock() {
            payloads.push(payload);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.queued.lock().ok().and_then(|mut q| q.pop_front());
        next.unwrap_or_else(|| self.default.clone())
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}
