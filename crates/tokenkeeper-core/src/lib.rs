//! tokenkeeper-core - client-side access/refresh token lifecycle management.
//!
//! This crate keeps a pair of credentials for an external authentication
//! service and guarantees that every outgoing API request carries a valid
//! access token, or that the caller is signed out.
//!
//! - [`auth`]: token codec, token stores, session state, and the
//!   [`AuthCoordinator`] that owns them
//! - [`api`]: the authentication service client, the [`RequestAugmenter`]
//!   middleware and the [`ApiClient`] consumers use
//! - [`config`]: configuration file and environment overrides

pub mod api;
pub mod auth;
pub mod config;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, ApiError, AuthService, HttpAuthService, RequestAugmenter};
pub use auth::{
    AuthCoordinator, AuthError, AuthErrorKind, CredentialPair, DecodedIdentity, SessionState,
    TokenStore,
};
pub use config::Config;
