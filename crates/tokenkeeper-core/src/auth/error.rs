use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length for error response bodies kept in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Failures of the authentication lifecycle.
///
/// Clone is required so that a single refresh outcome can be handed to every
/// caller waiting on the same in-flight refresh.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Authentication service unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("Rejected by authentication service (status {status}): {payload}")]
    ValidationRejected {
        status: u16,
        payload: serde_json::Value,
    },

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
}

/// Plain discriminant of [`AuthError`], for display and state inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum AuthErrorKind {
    MalformedToken,
    NoRefreshToken,
    NetworkUnreachable,
    ValidationRejected,
    RefreshFailed,
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::MalformedToken(_) => AuthErrorKind::MalformedToken,
            AuthError::NoRefreshToken => AuthErrorKind::NoRefreshToken,
            AuthError::NetworkUnreachable(_) => AuthErrorKind::NetworkUnreachable,
            AuthError::ValidationRejected { .. } => AuthErrorKind::ValidationRejected,
            AuthError::RefreshFailed(_) => AuthErrorKind::RefreshFailed,
        }
    }

    /// Build a `ValidationRejected` from an error response body.
    ///
    /// JSON bodies are kept as-is so field-level errors can be displayed;
    /// anything else is kept as a (truncated) JSON string.
    pub fn rejected(status: u16, body: &str) -> Self {
        let payload = serde_json::from_str(body)
            .unwrap_or_else(|_| serde_json::Value::String(truncate_body(body)));
        AuthError::ValidationRejected { status, payload }
    }

    /// Field-level messages from a validation payload, e.g.
    /// `{"email": ["user with this email already exists."]}`.
    pub fn field_errors(&self) -> Vec<(String, String)> {
        let AuthError::ValidationRejected { payload, .. } = self else {
            return Vec::new();
        };
        let Some(fields) = payload.as_object() else {
            return Vec::new();
        };

        let mut errors = Vec::new();
        for (field, value) in fields {
            match value {
                serde_json::Value::Array(messages) => {
                    for message in messages {
                        if let Some(text) = message.as_str() {
                            errors.push((field.clone(), text.to_string()));
                        }
                    }
                }
                serde_json::Value::String(text) => errors.push((field.clone(), text.clone())),
                _ => {}
            }
        }
        errors
    }

    /// True when the failure means the caller has to sign in again.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            AuthError::NoRefreshToken | AuthError::RefreshFailed(_)
        )
    }
}

/// Truncate a response body to avoid logging excessive data
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}
