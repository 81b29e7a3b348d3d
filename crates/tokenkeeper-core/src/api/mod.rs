//! HTTP side of tokenkeeper.
//!
//! This module provides the client for the external authentication service,
//! the `RequestAugmenter` middleware that attaches (and when needed renews)
//! the bearer token, and the `ApiClient` that routes every API call through
//! it.

pub mod augmenter;
pub mod client;
pub mod error;
pub mod service;

pub use augmenter::RequestAugmenter;
pub use client::ApiClient;
pub use error::ApiError;
pub use service::{AuthService, HttpAuthService, RegistrationRequest, RegistrationResult};
