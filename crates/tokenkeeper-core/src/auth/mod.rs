//! Authentication module for managing the credential pair and session.
//!
//! This module provides:
//! - `codec`: decoding of access token claims and the expiry check
//! - `TokenStore`: persistence of the credential pair (keychain, file, memory)
//! - `SessionState`: the in-memory view of who is signed in
//! - `AuthCoordinator`: login, registration, refresh and logout
//!
//! The coordinator is the only writer of the session and the store.

pub mod codec;
pub mod coordinator;
pub mod credentials;
pub mod error;
pub mod session;

pub use codec::DecodedIdentity;
pub use coordinator::AuthCoordinator;
pub use credentials::{
    CredentialPair, FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore,
};
pub use error::{AuthError, AuthErrorKind};
pub use session::SessionState;
