//! CLI settings.
//!
//! Settings are stored at `~/.config/portalauth/config.json` and can be
//! overridden by environment variables (a `.env` file is honored):
//! `PORTALAUTH_BASE_URL`, `PORTALAUTH_PORTAL`, `PORTALAUTH_STORAGE`,
//! `PORTALAUTH_TIMEOUT_SECS`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use portalauth_core::{AuthConfig, FileStorage, KeyringStorage, Portal, SessionStorage};
use serde::{Deserialize, Serialize};

/// Application name used for config directory paths
const APP_NAME: &str = "portalauth";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_BASE_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub portal: Option<Portal>,
    pub base_url: Option<String>,
    pub storage: Option<StorageBackend>,
    /// Per-request timeout for auth calls, in seconds.
    pub timeout_secs: Option<u64>,
    pub last_username: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut settings = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };
        settings.apply_env()?;
        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("PORTALAUTH_BASE_URL") {
            self.base_url = Some(url);
        }
        if let Ok(portal) = std::env::var("PORTALAUTH_PORTAL") {
            self.portal = Some(portal.parse().map_err(anyhow::Error::msg)?);
        }
        if let Ok(secs) = std::env::var("PORTALAUTH_TIMEOUT_SECS") {
            let secs = secs
                .parse()
                .with_context(|| format!("invalid PORTALAUTH_TIMEOUT_SECS '{}'", secs))?;
            self.timeout_secs = Some(secs);
        }
        if let Ok(storage) = std::env::var("PORTALAUTH_STORAGE") {
            self.storage = Some(match storage.to_ascii_lowercase().as_str() {
                "file" => StorageBackend::File,
                "keyring" => StorageBackend::Keyring,
                other => anyhow::bail!("unknown storage backend '{}'", other),
            });
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn portal(&self) -> Portal {
        self.portal.unwrap_or_default()
    }

    pub fn auth_config(&self) -> AuthConfig {
        let base_url = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let config = self.portal().config(base_url);
        match self.timeout_secs {
            Some(secs) => config.with_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }

    pub fn session_storage(&self, config: &AuthConfig) -> Result<Box<dyn SessionStorage>> {
        Ok(match self.storage.unwrap_or_default() {
            StorageBackend::File => Box::new(FileStorage::in_data_dir(&config.storage_key)?),
            StorageBackend::Keyring => Box::new(KeyringStorage::new(&config.storage_key)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_config_defaults() {
        let config = Settings::default().auth_config();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.storage_key, "user-auth");
    }

    #[test]
    fn test_auth_config_applies_timeout() {
        let settings = Settings {
            portal: Some(Portal::Admin),
            timeout_secs: Some(5),
            ..Settings::default()
        };
        let config = settings.auth_config();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.storage_key, "admin-auth");
    }
}
