//! Per-request credential attachment.
//!
//! Every outgoing API request passes through [`RequestAugmenter::augment`]
//! before dispatch. A request either leaves with a non-expired access token,
//! leaves untouched because nobody is signed in, or is rejected.

use chrono::Utc;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Request;
use tracing::debug;

use crate::auth::codec;
use crate::auth::{AuthCoordinator, AuthError};

#[derive(Clone)]
pub struct RequestAugmenter {
    auth: AuthCoordinator,
}

impl RequestAugmenter {
    pub fn new(auth: AuthCoordinator) -> Self {
        Self { auth }
    }

    pub fn coordinator(&self) -> &AuthCoordinator {
        &self.auth
    }

    /// Attach a valid bearer token to `request`, refreshing it first when the
    /// current one has expired.
    pub async fn augment(&self, mut request: Request) -> Result<Request, AuthError> {
        let Some(access) = self.current_access_token().await? else {
            debug!(url = %request.url(), "Anonymous request, no credentials attached");
            return Ok(request);
        };

        let mut value = HeaderValue::from_str(&format!("Bearer {}", access))
            .map_err(|e| AuthError::MalformedToken(format!("invalid header value: {e}")))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(request)
    }

    /// The access token a request should carry right now, or `None` when
    /// signed out.
    pub async fn current_access_token(&self) -> Result<Option<String>, AuthError> {
        let state = self.auth.snapshot();
        let (Some(identity), Some(credentials)) = (state.identity(), state.credentials()) else {
            return Ok(None);
        };

        if !codec::is_expired(identity, Utc::now()) {
            return Ok(Some(credentials.access.clone()));
        }

        debug!(
            expires_at = identity.expires_at,
            "Access token expired, refreshing before dispatch"
        );
        let refreshed = self.auth.refresh_expired(&credentials.access).await?;
        Ok(Some(refreshed.access))
    }
}
