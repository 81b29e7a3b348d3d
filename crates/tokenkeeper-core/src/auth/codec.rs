//! Decoding of access token claims.
//!
//! Tokens are JWTs (`header.payload.signature`). Only the payload is read;
//! the signature is not verified here, the authentication service checks it
//! on every login and refresh call. The decoded expiry is a client-side hint
//! that saves a round trip with a token the server would reject anyway.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::AuthError;

/// Tokens within this margin of their expiry are treated as expired, so a
/// token cannot lapse while a request is in flight.
const EXPIRY_MARGIN_SECS: i64 = 1;

/// Claims extracted from an access token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedIdentity {
    /// `sub`, or the `user_id` claim issued by Django SimpleJWT.
    pub subject: Option<String>,
    /// `exp`, seconds since the epoch.
    pub expires_at: i64,
    pub issued_at: Option<i64>,
    pub token_type: Option<String>,
    /// All remaining claims, verbatim.
    pub claims: serde_json::Map<String, serde_json::Value>,
}

impl DecodedIdentity {
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        match self.expiry() {
            Some(expiry) => expiry - now,
            None => Duration::zero(),
        }
    }

    /// Get seconds remaining until expiry (for display)
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.time_until_expiry(now).num_seconds().max(0)
    }
}

/// Decode the claims of `token` without verifying its signature.
pub fn decode(token: &str) -> Result<DecodedIdentity, AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::MalformedToken(format!(
            "expected 3 segments, found {}",
            parts.len()
        )));
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| AuthError::MalformedToken(format!("base64 decode failed: {e}")))?;

    let payload: serde_json::Value = serde_json::from_slice(&payload_bytes)
        .map_err(|e| AuthError::MalformedToken(format!("JSON parse failed: {e}")))?;

    let serde_json::Value::Object(mut claims) = payload else {
        return Err(AuthError::MalformedToken(
            "payload is not a JSON object".into(),
        ));
    };

    let expires_at = claims
        .remove("exp")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .ok_or_else(|| AuthError::MalformedToken("missing numeric exp claim".into()))?;

    let subject = claims
        .remove("sub")
        .or_else(|| claims.get("user_id").cloned())
        .and_then(|v| match v {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    let issued_at = claims.remove("iat").and_then(|v| v.as_i64());
    let token_type = claims
        .remove("token_type")
        .and_then(|v| v.as_str().map(String::from));

    Ok(DecodedIdentity {
        subject,
        expires_at,
        issued_at,
        token_type,
        claims,
    })
}

/// True when `identity` expires within [`EXPIRY_MARGIN_SECS`] of `now`.
pub fn is_expired(identity: &DecodedIdentity, now: DateTime<Utc>) -> bool {
    match identity.expiry() {
        Some(expiry) => expiry - now <= Duration::seconds(EXPIRY_MARGIN_SECS),
        None => true,
    }
}
