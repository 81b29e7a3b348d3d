use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Keychain service name for the stored credential pair
const SERVICE_NAME: &str = "tokenkeeper";

/// Name of the single persisted slot holding the credential pair
pub const TOKEN_SLOT: &str = "authTokens";

/// Access and refresh tokens as issued by the authentication service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CredentialPair {
    pub access: String,
    pub refresh: String,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }

    pub fn has_refresh(&self) -> bool {
        !self.refresh.is_empty()
    }
}

// Tokens are bearer secrets; keep them out of logs.
impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Persistence for the current credential pair.
///
/// Absence is a normal state, so `load` never fails: a missing or unreadable
/// entry is reported as `None`.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<CredentialPair>;

    fn save(&self, pair: &CredentialPair) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

fn parse_entry(contents: &str, source: &str) -> Option<CredentialPair> {
    match serde_json::from_str(contents) {
        Ok(pair) => Some(pair),
        Err(e) => {
            debug!(source, error = %e, "Ignoring malformed stored credentials");
            None
        }
    }
}

/// Credential pair stored in the OS keychain.
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, TOKEN_SLOT).context("Failed to create keyring entry")
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn load(&self) -> Option<CredentialPair> {
        let entry = self.entry().ok()?;
        match entry.get_password() {
            Ok(contents) => parse_entry(&contents, "keyring"),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                debug!(error = %e, "Failed to read credentials from keychain");
                None
            }
        }
    }

    fn save(&self, pair: &CredentialPair) -> Result<()> {
        let contents = serde_json::to_string(pair)?;
        self.entry()?
            .set_password(&contents)
            .context("Failed to store credentials in keychain")?;

        // A fresh entry must see the write; keyring's mock backend accepts
        // writes that no later entry can read.
        match self.entry()?.get_password() {
            Ok(stored) if stored == contents => Ok(()),
            Ok(_) => Err(anyhow::anyhow!(
                "Keychain returned different credentials than were stored"
            )),
            Err(e) => Err(e).context("Keychain did not persist credentials"),
        }
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credentials from keychain"),
        }
    }
}

/// Credential pair stored as JSON in a file, e.g. `<cache_dir>/authTokens.json`.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store in `dir` under the standard slot name
    pub fn in_dir(dir: PathBuf) -> Self {
        Self::new(dir.join(format!("{}.json", TOKEN_SLOT)))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<CredentialPair> {
        if !self.path.exists() {
            return None;
        }
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => parse_entry(&contents, "file"),
            Err(e) => {
                debug!(path = ?self.path, error = %e, "Failed to read credentials file");
                None
            }
        }
    }

    fn save(&self, pair: &CredentialPair) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create credentials directory")?;
        }
        let contents = serde_json::to_string_pretty(pair)?;
        std::fs::write(&self.path, contents).context("Failed to write credentials file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove credentials file")?;
        }
        Ok(())
    }
}

/// Process-local store; nothing survives a restart.
#[derive(Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a raw entry, as a previous process would have left it.
    pub fn with_raw(contents: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(contents.into())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().map(|s| s.is_none()).unwrap_or(true)
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<CredentialPair> {
        let slot = self.slot.lock().ok()?;
        slot.as_deref().and_then(|c| parse_entry(c, "memory"))
    }

    fn save(&self, pair: &CredentialPair) -> Result<()> {
        let contents = serde_json::to_string(pair)?;
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))?;
        *slot = Some(contents);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))?;
        *slot = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> CredentialPair {
        CredentialPair::new("header.payload.sig", "refresh-token")
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileTokenStore::in_dir(dir.path().join("nested"));

        assert!(store.load().is_none());
        store.save(&pair()).expect("save");
        assert_eq!(store.load(), Some(pair()));
        assert!(store.path().ends_with("authTokens.json"));
    }

    #[test]
    fn test_file_store_format() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileTokenStore::in_dir(dir.path().to_path_buf());
        store.save(&pair()).expect("save");

        let contents = std::fs::read_to_string(store.path()).expect("read");
        let value: serde_json::Value = serde_json::from_str(&contents).expect("json");
        assert_eq!(value["access"], "header.payload.sig");
        assert_eq!(value["refresh"], "refresh-token");
    }

    #[test]
    fn test_file_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileTokenStore::in_dir(dir.path().to_path_buf());
        store.save(&pair()).expect("save");

        store.clear().expect("clear");
        store.clear().expect("second clear");
        assert!(store.load().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_file_store_malformed_is_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileTokenStore::in_dir(dir.path().to_path_buf());
        std::fs::write(store.path(), "{not json").expect("write");
        assert!(store.load().is_none());

        std::fs::write(store.path(), r#"{"access": "only-access"}"#).expect("write");
        assert!(store.load().is_none());
    }

    #[test]
    fn test_keyring_store_round_trip() {
        let store = KeyringTokenStore::with_service(format!(
            "tokenkeeper-test-{}",
            std::process::id()
        ));

        // Headless machines may have no usable keychain; a save that does not
        // persist must then be reported as an error.
        match store.save(&pair()) {
            Ok(()) => {
                assert_eq!(store.load(), Some(pair()));
                store.clear().expect("clear");
                store.clear().expect("second clear");
                assert!(store.load().is_none());
            }
            Err(e) => {
                assert!(store.load().is_none(), "save failed ({e:#}) but load found a pair");
            }
        }
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryTokenStore::new();
        assert!(store.is_empty());
        store.save(&pair()).expect("save");
        assert_eq!(store.load(), Some(pair()));
        store.clear().expect("clear");
        assert!(store.is_empty());
        assert!(store.load().is_none());
    }

    #[test]
    fn test_memory_store_malformed_is_absent() {
        let store = MemoryTokenStore::with_raw("garbage");
        assert!(store.load().is_none());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", pair());
        assert!(!rendered.contains("refresh-token"));
        assert!(!rendered.contains("header.payload.sig"));
        assert!(rendered.contains("<redacted>"));
    }
}
