//! Application configuration management.
//!
//! This module handles loading and saving the configuration, which holds the
//! service URLs, the token store backend, and the last used email address.
//!
//! Configuration is stored at `~/.config/tokenkeeper/config.json`.
//! `TOKENKEEPER_*` environment variables override the file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "tokenkeeper";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Authentication service used when nothing is configured
const DEFAULT_AUTH_BASE_URL: &str = "http://localhost:8000/api/";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ENV_AUTH_URL: &str = "TOKENKEEPER_AUTH_URL";
pub const ENV_API_URL: &str = "TOKENKEEPER_API_URL";
pub const ENV_STORE: &str = "TOKENKEEPER_STORE";
pub const ENV_EMAIL: &str = "TOKENKEEPER_EMAIL";

/// Where the credential pair is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Keyring,
    File,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyring" => Ok(StoreBackend::Keyring),
            "file" => Ok(StoreBackend::File),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow::anyhow!("Unknown token store backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub auth_base_url: Option<String>,
    /// Base URL of the application API; defaults to the auth base URL
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub token_store: StoreBackend,
    pub request_timeout_secs: Option<u64>,
    pub last_email: Option<String>,
}

impl Config {
    /// Load the config file (defaults when absent) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_file(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `TOKENKEEPER_*` overrides; `lookup` abstracts the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_AUTH_URL) {
            self.auth_base_url = Some(url);
        }
        if let Some(url) = non_empty(ENV_API_URL) {
            self.api_base_url = Some(url);
        }
        if let Some(store) = non_empty(ENV_STORE) {
            self.token_store = store
                .parse::<StoreBackend>()
                .with_context(|| format!("Invalid {}", ENV_STORE))?;
        }
        if let Some(email) = non_empty(ENV_EMAIL) {
            self.last_email = Some(email);
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn auth_base_url(&self) -> &str {
        self.auth_base_url
            .as_deref()
            .unwrap_or(DEFAULT_AUTH_BASE_URL)
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or_else(|| self.auth_base_url())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    /// Build the configured token store backend.
    pub fn open_token_store(&self) -> Result<Arc<dyn TokenStore>> {
        let store: Arc<dyn TokenStore> = match self.token_store {
            StoreBackend::Keyring => Arc::new(KeyringTokenStore::new()),
            StoreBackend::File => Arc::new(FileTokenStore::in_dir(self.cache_dir()?)),
            StoreBackend::Memory => Arc::new(MemoryTokenStore::new()),
        };
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.auth_base_url(), DEFAULT_AUTH_BASE_URL);
        assert_eq!(config.api_base_url(), DEFAULT_AUTH_BASE_URL);
        assert_eq!(config.token_store, StoreBackend::Keyring);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_AUTH_URL, "https://auth.example/api/"),
            (ENV_STORE, "File"),
            (ENV_EMAIL, "a@b.c"),
            (ENV_API_URL, "  "),
        ]);
        let mut config = Config {
            api_base_url: Some("https://api.example/".into()),
            ..Config::default()
        };
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .expect("apply env");

        assert_eq!(config.auth_base_url(), "https://auth.example/api/");
        // Blank values do not override
        assert_eq!(config.api_base_url(), "https://api.example/");
        assert_eq!(config.token_store, StoreBackend::File);
        assert_eq!(config.last_email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn test_invalid_store_backend() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == ENV_STORE).then(|| "vault".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tokenkeeper").join(CONFIG_FILE);
        let config = Config {
            auth_base_url: Some("https://auth.example/api/".into()),
            token_store: StoreBackend::Memory,
            request_timeout_secs: Some(5),
            ..Config::default()
        };
        config.save_to(&path).expect("save");

        let loaded = Config::load_file(&path).expect("load");
        assert_eq!(loaded.auth_base_url(), "https://auth.example/api/");
        assert_eq!(loaded.token_store, StoreBackend::Memory);
        assert_eq!(loaded.request_timeout(), Duration::from_secs(5));

        let missing = Config::load_file(&dir.path().join("missing.json")).expect("defaults");
        assert!(missing.auth_base_url.is_none());
    }
}
