//! Test helpers: token construction and an in-process authentication service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;

use crate::api::service::{AuthService, RefreshedTokens, RegistrationRequest, RegistrationResult};
use crate::auth::{AuthError, CredentialPair};

/// Build an unsigned JWT carrying `claims`.
pub(crate) fn make_token(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

/// Access token expiring `secs` seconds from now (negative for the past).
pub(crate) fn token_expiring_in(secs: i64) -> String {
    make_token(serde_json::json!({
        "token_type": "access",
        "exp": Utc::now().timestamp() + secs,
        "user_id": 42,
    }))
}

pub(crate) fn pair_expiring_in(secs: i64, refresh: &str) -> CredentialPair {
    CredentialPair::new(token_expiring_in(secs), refresh)
}

/// Scripted [`AuthService`] that counts its calls.
///
/// Unscripted logins fail as unreachable and unscripted refreshes are
/// rejected, so a test only sees success it asked for.
pub(crate) struct FakeAuthService {
    login: Mutex<Result<CredentialPair, AuthError>>,
    register: Mutex<Option<Result<RegistrationResult, AuthError>>>,
    refresh: Mutex<Result<RefreshedTokens, AuthError>>,
    refresh_delay: Duration,
    login_calls: AtomicUsize,
    register_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    last_refresh_token: Mutex<Option<String>>,
}

impl FakeAuthService {
    pub(crate) fn new() -> Self {
        Self {
            login: Mutex::new(Err(AuthError::NetworkUnreachable(
                "connection refused".into(),
            ))),
            register: Mutex::new(None),
            refresh: Mutex::new(Err(AuthError::RefreshFailed(
                "refresh token invalid or expired".into(),
            ))),
            refresh_delay: Duration::ZERO,
            login_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            last_refresh_token: Mutex::new(None),
        }
    }

    pub(crate) fn with_login(self, result: Result<CredentialPair, AuthError>) -> Self {
        *self.login.lock().expect("lock") = result;
        self
    }

    pub(crate) fn with_register(self, result: Result<RegistrationResult, AuthError>) -> Self {
        *self.register.lock().expect("lock") = Some(result);
        self
    }

    pub(crate) fn with_refresh(self, result: Result<RefreshedTokens, AuthError>) -> Self {
        *self.refresh.lock().expect("lock") = result;
        self
    }

    pub(crate) fn with_refresh_access(self, access: &str, refresh: Option<&str>) -> Self {
        self.with_refresh(Ok(RefreshedTokens {
            access: access.to_string(),
            refresh: refresh.map(String::from),
        }))
    }

    pub(crate) fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub(crate) fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.login_calls() + self.register_calls() + self.refresh_calls()
    }

    pub(crate) fn last_refresh_token(&self) -> Option<String> {
        self.last_refresh_token.lock().expect("lock").clone()
    }
}

#[async_trait]
impl AuthService for FakeAuthService {
    async fn obtain_pair(&self, _email: &str, _password: &str) -> Result<CredentialPair, AuthError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login.lock().expect("lock").clone()
    }

    async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResult, AuthError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.register.lock().expect("lock").clone();
        scripted.unwrap_or_else(|| {
            Ok(RegistrationResult {
                email: Some(request.email.clone()),
                username: Some(request.username.clone()),
                extra: serde_json::Map::new(),
            })
        })
    }

    async fn refresh(&self, refresh: &str) -> Result<RefreshedTokens, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refresh_token.lock().expect("lock") = Some(refresh.to_string());
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        self.refresh.lock().expect("lock").clone()
    }
}
