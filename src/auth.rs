//! Doctor sign-in through the Identity Toolkit password endpoint.
//!
//! The returned ID token authorizes every database read. It lives about an
//! hour; `spawn_token_refresh` swaps a fresh one into the shared `IdToken`
//! before it lapses. Sign-out is dropping the session.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;

pub const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com";
pub const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const FALLBACK_LOGIN_ERROR: &str = "Login failed. Check credentials.";

/// Lifetime assumed when the response omits `expiresIn`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);
/// Refresh this long before expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);
/// Wait between attempts after a transient refresh failure.
const REFRESH_RETRY: Duration = Duration::from_secs(30);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Email and password are required")]
    MissingCredentials,

    #[error("{0}")]
    Rejected(String),

    #[error("Sign-in service unreachable: {0}")]
    Connection(String),

    #[error("Unexpected sign-in response: {0}")]
    InvalidResponse(String),
}

/// A signed-in doctor.
#[derive(Clone, PartialEq)]
pub struct DoctorSession {
    pub email: String,
    pub local_id: String,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: Duration,
}

impl fmt::Debug for DoctorSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoctorSession")
            .field("email", &self.email)
            .field("local_id", &self.local_id)
            .field("id_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// The current ID token, shared between the refresher and database readers.
#[derive(Clone, Default)]
pub struct IdToken(Arc<RwLock<String>>);

impl IdToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::new(RwLock::new(token.into())))
    }

    pub fn current(&self) -> String {
        self.0.read().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn replace(&self, token: String) {
        if let Ok(mut current) = self.0.write() {
            *current = token;
        }
    }
}

impl fmt::Debug for IdToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdToken(<redacted>)")
    }
}

/// Tokens returned by a successful refresh.
#[derive(Clone, PartialEq)]
pub struct TokenGrant {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: Duration,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignInRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignInResponse {
    #[serde(default)]
    pub email: String,
    pub local_id: String,
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: String,
}

/// The securetoken endpoint answers in snake_case.
#[derive(Debug, Deserialize)]
pub(crate) struct RefreshResponse {
    pub id_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: String,
}

#[derive(Clone)]
pub struct AuthClient {
    base_url: String,
    token_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AuthClient {
    pub fn new(api_key: &str) -> Result<Self, AuthError> {
        Self::with_urls(IDENTITY_TOOLKIT_URL, SECURE_TOKEN_URL, api_key)
    }

    /// One host for both endpoints, as the auth emulator serves them.
    pub fn with_base_url(base_url: &str, api_key: &str) -> Result<Self, AuthError> {
        Self::with_urls(base_url, base_url, api_key)
    }

    pub fn with_urls(base_url: &str, token_url: &str, api_key: &str) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Connection(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token_url: token_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }

    pub(crate) fn endpoint(&self) -> String {
        format!("{}/v1/accounts:signInWithPassword", self.base_url)
    }

    pub(crate) fn token_endpoint(&self) -> String {
        format!("{}/v1/token", self.token_url)
    }

    /// Exchange email and password for a session. The email is trimmed; the
    /// password is sent as typed.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<DoctorSession, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let request = SignInRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| AuthError::Connection(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.without_url().to_string()))?;

        if !status.is_success() {
            let message = rejection_message(&body);
            tracing::warn!(status = status.as_u16(), reason = %message, "Sign-in rejected");
            return Err(AuthError::Rejected(message));
        }

        let session = parse_session(&body, email)?;
        tracing::info!(email = %session.email, "Doctor signed in");
        Ok(session)
    }

    /// Exchange a refresh token for a new ID token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let response = self
            .client
            .post(self.token_endpoint())
            .query(&[("key", self.api_key.as_str())])
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .send()
            .await
            .map_err(|e| AuthError::Connection(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(AuthError::Rejected(rejection_message(&body)));
        }
        parse_grant(&body)
    }
}

/// Keep `token` fresh until the task is aborted or the refresh token is
/// rejected. Transient failures retry; the old token stays in place meanwhile.
pub fn spawn_token_refresh(client: AuthClient, session: &DoctorSession, token: IdToken) -> JoinHandle<()> {
    let mut refresh_token = session.refresh_token.clone();
    let mut delay = refresh_delay(session.expires_in);

    tokio::spawn(async move {
        if refresh_token.is_empty() {
            tracing::warn!("No refresh token issued; database access ends when the ID token expires");
            return;
        }
        loop {
            tokio::time::sleep(delay).await;
            match client.refresh(&refresh_token).await {
                Ok(grant) => {
                    token.replace(grant.id_token);
                    refresh_token = grant.refresh_token;
                    delay = refresh_delay(grant.expires_in);
                    tracing::info!(expires_in_s = grant.expires_in.as_secs(), "ID token refreshed");
                }
                Err(AuthError::Rejected(reason)) => {
                    tracing::error!(%reason, "Token refresh rejected, sign in again");
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, retry_s = REFRESH_RETRY.as_secs(), "Token refresh failed");
                    delay = REFRESH_RETRY;
                }
            }
        }
    })
}

/// Time to wait before refreshing a token that expires in `expires_in`.
pub(crate) fn refresh_delay(expires_in: Duration) -> Duration {
    if expires_in > REFRESH_MARGIN * 2 {
        expires_in - REFRESH_MARGIN
    } else {
        expires_in / 2
    }
}

/// `expiresIn` is a decimal string of seconds.
fn lifetime(expires_in: &str) -> Duration {
    expires_in
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TOKEN_LIFETIME)
}

pub(crate) fn parse_grant(body: &str) -> Result<TokenGrant, AuthError> {
    let parsed: RefreshResponse =
        serde_json::from_str(body).map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
    Ok(TokenGrant {
        id_token: parsed.id_token,
        refresh_token: parsed.refresh_token,
        expires_in: lifetime(&parsed.expires_in),
    })
}

pub(crate) fn parse_session(body: &str, email: &str) -> Result<DoctorSession, AuthError> {
    let parsed: SignInResponse =
        serde_json::from_str(body).map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
    Ok(DoctorSession {
        email: if parsed.email.is_empty() {
            email.to_string()
        } else {
            parsed.email
        },
        local_id: parsed.local_id,
        id_token: parsed.id_token,
        refresh_token: parsed.refresh_token,
        expires_in: lifetime(&parsed.expires_in),
    })
}

/// Error code from `{"error": {"message": "..."}}`, made readable.
pub(crate) fn rejection_message(body: &str) -> String {
    let code = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string));

    let Some(code) = code else {
        return FALLBACK_LOGIN_ERROR.to_string();
    };
    // Codes may carry a suffix: "TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled..."
    let head = code.split(':').next().unwrap_or("").trim();
    match head {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
            "Invalid email or password.".to_string()
        }
        "USER_DISABLED" => "This account has been disabled.".to_string(),
        "TOO_MANY_ATTEMPTS_TRY_LATER" => {
            "Too many failed attempts. Try again later.".to_string()
        }
        "INVALID_EMAIL" => "Invalid email address.".to_string(),
        "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" => {
            "Session expired. Sign in again.".to_string()
        }
        "" => FALLBACK_LOGIN_ERROR.to_string(),
        _ => code,
    }
}
