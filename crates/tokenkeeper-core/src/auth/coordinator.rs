//! Login, registration, refresh and logout against the authentication service.
//!
//! `AuthCoordinator` is the only writer of the session state and the token
//! store. Every successful login or refresh replaces both; logout and a
//! failed refresh clear both.
//!
//! Concurrent refreshes are coalesced: the first caller installs a shared
//! in-flight future and later callers await the same outcome, so a refresh
//! token is never sent twice. Services that rotate refresh tokens reject a
//! reused one, which would otherwise sign the user out.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, error, info, warn};

use super::codec::DecodedIdentity;
use super::session::{Session, SessionState, SignedIn};
use super::{AuthError, CredentialPair, TokenStore};
use crate::api::service::{AuthService, RegistrationRequest, RegistrationResult};

type RefreshOutcome = Result<CredentialPair, AuthError>;
type InFlightRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Owner of the authentication state.
/// Clone is cheap - all clones share the same session, store and service.
#[derive(Clone)]
pub struct AuthCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    service: Arc<dyn AuthService>,
    store: Arc<dyn TokenStore>,
    session: Session,
    in_flight: Mutex<Option<InFlightRefresh>>,
}

impl AuthCoordinator {
    /// Create a coordinator, restoring a still-valid session from `store`.
    pub fn new(service: Arc<dyn AuthService>, store: Arc<dyn TokenStore>) -> Self {
        let session = Session::hydrate(store.as_ref(), Utc::now());
        Self {
            inner: Arc::new(Inner {
                service,
                store,
                session,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Current state. The returned snapshot never changes; call again to
    /// observe later updates.
    pub fn snapshot(&self) -> Arc<SessionState> {
        self.inner.session.snapshot()
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot().is_authenticated()
    }

    pub fn identity(&self) -> Option<DecodedIdentity> {
        self.snapshot().identity().cloned()
    }

    pub fn last_error(&self) -> Option<AuthError> {
        self.snapshot().last_error.clone()
    }

    /// Exchange email and password for a credential pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<CredentialPair, AuthError> {
        self.inner.session.update(|s| s.with_pending(true));

        let result = self
            .inner
            .service
            .obtain_pair(email, password)
            .await
            .and_then(SignedIn::from_pair);

        match result {
            Ok(signed_in) => {
                let pair = signed_in.credentials.clone();
                info!(subject = ?signed_in.identity.subject, "Login successful");
                self.install(signed_in);
                Ok(pair)
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                self.inner.session.update(|s| s.with_error(e.clone()));
                Err(e)
            }
        }
    }

    /// Create an account. Registration does not sign the user in.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
        password_confirmation: &str,
    ) -> Result<RegistrationResult, AuthError> {
        let request = RegistrationRequest {
            email: email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            password2: password_confirmation.to_string(),
        };

        match self.inner.service.register(&request).await {
            Ok(result) => {
                info!(username = ?result.username, "Registration successful");
                Ok(result)
            }
            Err(e) => {
                error!(error = %e, "Registration failed");
                Err(e)
            }
        }
    }

    /// Renew the access token with the current refresh token.
    ///
    /// Without a refresh token this signs out and fails with
    /// [`AuthError::NoRefreshToken`] without touching the network. Any other
    /// failure signs out and fails with [`AuthError::RefreshFailed`].
    pub async fn refresh(&self) -> Result<CredentialPair, AuthError> {
        self.coalesced_refresh(None).await
    }

    /// Refresh on behalf of a request that found `observed_access` expired.
    ///
    /// If the session already holds a different, valid access token, that
    /// token is returned without a network call.
    pub(crate) async fn refresh_expired(
        &self,
        observed_access: &str,
    ) -> Result<CredentialPair, AuthError> {
        self.coalesced_refresh(Some(observed_access)).await
    }

    /// Clear the session and the token store. Safe to call when signed out.
    pub fn logout(&self) {
        let was_authenticated = self.is_authenticated();
        self.inner.session.replace(SessionState::default());
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear stored credentials");
        }
        if was_authenticated {
            info!("Logged out");
        }
    }

    fn install(&self, signed_in: SignedIn) {
        if let Err(e) = self.inner.store.save(&signed_in.credentials) {
            warn!(error = %e, "Failed to save credentials");
        }
        self.inner.session.replace(SessionState::signed_in(signed_in));
    }

    #[cfg(test)]
    pub(crate) fn install_pair(&self, pair: CredentialPair) {
        let signed_in = SignedIn::from_pair(pair).expect("decodable test token");
        self.install(signed_in);
    }

    async fn coalesced_refresh(&self, observed_access: Option<&str>) -> RefreshOutcome {
        let in_flight = {
            let mut slot = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            match slot.clone() {
                Some(in_flight) => {
                    debug!("Joining in-flight token refresh");
                    in_flight
                }
                None => {
                    // The slot is released only after the session is updated,
                    // so an empty slot means any earlier refresh is visible here.
                    if let Some(observed) = observed_access {
                        let state = self.snapshot();
                        if let Some(current) = state.credentials() {
                            if current.access != observed && state.is_valid(Utc::now()) {
                                debug!("Access token already refreshed");
                                return Ok(current.clone());
                            }
                        }
                    }

                    let in_flight = self.clone().run_refresh().boxed().shared();
                    *slot = Some(in_flight.clone());
                    in_flight
                }
            }
        };

        in_flight.await
    }

    async fn run_refresh(self) -> RefreshOutcome {
        let outcome = self.perform_refresh().await;
        *self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        outcome
    }

    async fn perform_refresh(&self) -> RefreshOutcome {
        let state = self.snapshot();
        let Some(refresh) = state
            .credentials()
            .filter(|c| c.has_refresh())
            .map(|c| c.refresh.clone())
        else {
            warn!("Token refresh requested without a refresh token, signing out");
            self.logout();
            self.inner
                .session
                .update(|s| s.with_error(AuthError::NoRefreshToken));
            return Err(AuthError::NoRefreshToken);
        };

        self.inner.session.update(|s| s.with_pending(true));
        debug!("Refreshing access token");

        let result = self
            .inner
            .service
            .refresh(&refresh)
            .await
            .and_then(|tokens| SignedIn::from_pair(tokens.into_pair(&refresh)));

        // A login or logout may have replaced the session while the call was
        // in flight; only the session that owned `refresh` is affected.
        let current = self.snapshot();
        let still_current =
            current.credentials().map(|c| c.refresh.as_str()) == Some(refresh.as_str());

        match result {
            Ok(signed_in) if still_current => {
                let pair = signed_in.credentials.clone();
                info!(
                    expires_at = signed_in.identity.expires_at,
                    "Access token refreshed"
                );
                self.install(signed_in);
                Ok(pair)
            }
            Ok(_) => {
                debug!("Session changed during refresh, discarding refreshed tokens");
                current.credentials().cloned().ok_or_else(|| {
                    AuthError::RefreshFailed("session ended during refresh".into())
                })
            }
            Err(e) => {
                let error = match e {
                    AuthError::RefreshFailed(reason) => AuthError::RefreshFailed(reason),
                    other => AuthError::RefreshFailed(other.to_string()),
                };
                warn!(error = %error, "Token refresh failed, signing out");
                if still_current {
                    self.logout();
                    self.inner.session.update(|s| s.with_error(error.clone()));
                }
                Err(error)
            }
        }
    }
}
