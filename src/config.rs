use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Cardiolink";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default Gemini model for direct analysis.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-lite";

/// Default watch poll interval.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Placeholder fragments shipped in sample configs; treated as unset.
const PROXY_PLACEHOLDER: &str = "your-vercel-app";
const GEMINI_KEY_PLACEHOLDER: &str = "YOUR_GEMINI_API_KEY";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "cardiolink_lib=info,cardiolink=info,warn"
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// How analysis requests reach the generative model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisBackend {
    /// Operator-hosted proxy that accepts the raw payload.
    Proxy { url: String },
    /// Gemini `generateContent` called with an API key.
    Direct { api_key: String, model: String },
    /// Neither proxy nor key configured.
    Unconfigured,
}

/// Runtime configuration for the monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub firebase_api_key: String,
    pub database_url: String,
    pub analysis: AnalysisBackend,
    pub poll_interval: Duration,
}

impl MonitorConfig {
    /// Read configuration from `CARDIOLINK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from any key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let firebase_api_key = get("CARDIOLINK_FIREBASE_API_KEY")
            .ok_or(ConfigError::Missing("CARDIOLINK_FIREBASE_API_KEY"))?;
        let database_url = get("CARDIOLINK_DATABASE_URL")
            .ok_or(ConfigError::Missing("CARDIOLINK_DATABASE_URL"))?;

        let poll_interval = match get("CARDIOLINK_POLL_INTERVAL_MS") {
            None => Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            Some(raw) => {
                let ms: u64 = raw.parse().map_err(|_| ConfigError::Invalid {
                    name: "CARDIOLINK_POLL_INTERVAL_MS",
                    value: raw.clone(),
                })?;
                if ms == 0 {
                    return Err(ConfigError::Invalid {
                        name: "CARDIOLINK_POLL_INTERVAL_MS",
                        value: raw,
                    });
                }
                Duration::from_millis(ms)
            }
        };

        let analysis = resolve_backend(
            get("CARDIOLINK_GEMINI_PROXY_URL"),
            get("CARDIOLINK_GEMINI_API_KEY"),
            get("CARDIOLINK_GEMINI_MODEL"),
        );

        Ok(Self {
            firebase_api_key,
            database_url: database_url.trim_end_matches('/').to_string(),
            analysis,
            poll_interval,
        })
    }
}

/// Proxy wins over a direct key; placeholders count as unset.
fn resolve_backend(
    proxy_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
) -> AnalysisBackend {
    if let Some(url) = proxy_url.filter(|u| !u.contains(PROXY_PLACEHOLDER)) {
        return AnalysisBackend::Proxy { url };
    }
    if let Some(api_key) = api_key.filter(|k| k != GEMINI_KEY_PLACEHOLDER) {
        return AnalysisBackend::Direct {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        };
    }
    AnalysisBackend::Unconfigured
}
