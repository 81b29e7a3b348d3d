//! Client for the external authentication service.
//!
//! The service issues and renews credential pairs:
//! - `POST token/` exchanges email and password for a pair
//! - `POST register/` creates an account
//! - `POST token/refresh/` exchanges a refresh token for a new access token
//!   (and a new refresh token when the service rotates them)

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::auth::{AuthError, CredentialPair};
use crate::config::Config;

const TOKEN_PATH: &str = "token/";
const REGISTER_PATH: &str = "register/";
const REFRESH_PATH: &str = "token/refresh/";

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// Account creation payload. `password2` is the confirmation field.
#[derive(Clone, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct RegistrationRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub password2: String,
}

impl std::fmt::Debug for RegistrationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationRequest")
            .field("email", &self.email)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Success payload of the registration endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RegistrationResult {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Response of the refresh endpoint. `refresh` is only present when the
/// service rotates refresh tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedTokens {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

impl RefreshedTokens {
    /// Combine with the refresh token that was used for the call.
    pub fn into_pair(self, previous_refresh: &str) -> CredentialPair {
        let refresh = self
            .refresh
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| previous_refresh.to_string());
        CredentialPair::new(self.access, refresh)
    }
}

/// Network calls to the authentication service.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn obtain_pair(&self, email: &str, password: &str) -> Result<CredentialPair, AuthError>;

    async fn register(&self, request: &RegistrationRequest)
        -> Result<RegistrationResult, AuthError>;

    async fn refresh(&self, refresh: &str) -> Result<RefreshedTokens, AuthError>;
}

/// [`AuthService`] over HTTP.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpAuthService {
    client: Client,
    base_url: String,
}

impl HttpAuthService {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self::with_client(client, config.auth_base_url()))
    }

    /// Create a service sharing an existing connection pool.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AuthError> {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::NetworkUnreachable(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::NetworkUnreachable(e.to_string()))?;
        debug!(url = %url, status = status.as_u16(), "Authentication service responded");

        if !status.is_success() {
            return Err(AuthError::rejected(status.as_u16(), &text));
        }

        serde_json::from_str(&text)
            .map_err(|e| AuthError::MalformedToken(format!("invalid response from {path}: {e}")))
    }
}

#[async_trait]
impl AuthService for HttpAuthService {
    async fn obtain_pair(&self, email: &str, password: &str) -> Result<CredentialPair, AuthError> {
        self.post(TOKEN_PATH, &LoginRequest { email, password }).await
    }

    async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResult, AuthError> {
        self.post(REGISTER_PATH, request).await
    }

    async fn refresh(&self, refresh: &str) -> Result<RefreshedTokens, AuthError> {
        self.post(REFRESH_PATH, &RefreshRequest { refresh })
            .await
            .map_err(|e| match e {
                AuthError::ValidationRejected { status, payload } => {
                    AuthError::RefreshFailed(classify_refresh_rejection(status, &payload))
                }
                other => other,
            })
    }
}

/// Human-readable reason for a rejected refresh, e.g. SimpleJWT's
/// `{"detail": "Token is invalid or expired", "code": "token_not_valid"}`.
fn classify_refresh_rejection(status: u16, payload: &serde_json::Value) -> String {
    let detail = payload
        .get("detail")
        .and_then(|d| d.as_str())
        .or_else(|| payload.as_str());
    let code = payload.get("code").and_then(|c| c.as_str());

    match (code, detail) {
        (Some("token_not_valid"), _) => "refresh token invalid or expired".to_string(),
        (Some("token_blacklisted"), _) => "refresh token already used".to_string(),
        (_, Some(detail)) if !detail.is_empty() => format!("status {status}: {detail}"),
        _ => format!("status {status}"),
    }
}
