use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::codec::{self, DecodedIdentity};
use super::{AuthError, CredentialPair, TokenStore};

/// A credential pair together with the identity decoded from its access token.
///
/// Keeping both in one value means a session is either fully signed in or
/// fully signed out.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub identity: DecodedIdentity,
    pub credentials: CredentialPair,
}

impl SignedIn {
    /// Decode the access token of `credentials`; undecodable tokens are rejected.
    pub fn from_pair(credentials: CredentialPair) -> Result<Self, AuthError> {
        let identity = codec::decode(&credentials.access)?;
        Ok(Self {
            identity,
            credentials,
        })
    }
}

/// Snapshot of the authentication state.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    signed_in: Option<SignedIn>,
    pub pending: bool,
    pub last_error: Option<AuthError>,
}

impl SessionState {
    pub fn signed_in(signed_in: SignedIn) -> Self {
        Self {
            signed_in: Some(signed_in),
            pending: false,
            last_error: None,
        }
    }

    pub fn identity(&self) -> Option<&DecodedIdentity> {
        self.signed_in.as_ref().map(|s| &s.identity)
    }

    pub fn credentials(&self) -> Option<&CredentialPair> {
        self.signed_in.as_ref().map(|s| &s.credentials)
    }

    /// Get the access token if signed in
    pub fn access_token(&self) -> Option<&str> {
        self.credentials().map(|c| c.access.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.signed_in.is_some()
    }

    /// Signed in with an access token that has not expired yet
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.identity()
            .map(|identity| !codec::is_expired(identity, now))
            .unwrap_or(false)
    }

    pub(crate) fn with_pending(&self, pending: bool) -> Self {
        Self {
            pending,
            ..self.clone()
        }
    }

    pub(crate) fn with_error(&self, error: AuthError) -> Self {
        Self {
            pending: false,
            last_error: Some(error),
            ..self.clone()
        }
    }
}

/// Shared holder of the current [`SessionState`].
///
/// Every update installs a new `Arc`, so readers holding a snapshot never see
/// a partially written state. The lock is never held across an await point.
#[derive(Debug, Default)]
pub(crate) struct Session {
    state: RwLock<Arc<SessionState>>,
}

impl Session {
    /// Restore the session from `store`, keeping it only if the access token
    /// decodes and has not expired. Anything else is erased from the store so
    /// the store keeps mirroring the session.
    pub(crate) fn hydrate(store: &dyn TokenStore, now: DateTime<Utc>) -> Self {
        let Some(pair) = store.load() else {
            debug!("No stored credentials found");
            return Self::default();
        };

        let restored = match SignedIn::from_pair(pair) {
            Ok(signed_in) if !codec::is_expired(&signed_in.identity, now) => Some(signed_in),
            Ok(signed_in) => {
                debug!(expires_at = signed_in.identity.expires_at, "Stored access token expired");
                None
            }
            Err(e) => {
                debug!(error = %e, "Stored access token undecodable");
                None
            }
        };

        match restored {
            Some(signed_in) => {
                debug!(subject = ?signed_in.identity.subject, "Session restored from store");
                Self {
                    state: RwLock::new(Arc::new(SessionState::signed_in(signed_in))),
                }
            }
            None => {
                if let Err(e) = store.clear() {
                    warn!(error = %e, "Failed to clear stale credentials");
                }
                Self::default()
            }
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<SessionState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn replace(&self, state: SessionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(state);
    }

    /// Derive the next state from the current one under a single write lock.
    pub(crate) fn update(&self, f: impl FnOnce(&SessionState) -> SessionState) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let next = f(&guard);
        *guard = Arc::new(next);
    }
}
