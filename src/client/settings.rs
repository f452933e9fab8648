//! The provider and credential the user picked, kept on disk between
//! runs. Loaded once when a chat starts and replaced wholesale on save.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ai::Provider;

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider: Provider,
    #[serde(default)]
    pub credential: String,
}

impl ProviderConfig {
    pub fn new(provider: Provider, credential: &str) -> Self {
        Self {
            provider,
            credential: credential.to_string(),
        }
    }

    /// Whether a chat can be sent with these settings.
    pub fn is_usable(&self) -> bool {
        !self.provider.requires_api_key() || self.credential().is_some()
    }

    /// The credential, if one has been set.
    pub fn credential(&self) -> Option<&str> {
        Some(self.credential.trim()).filter(|c| !c.is_empty())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(Provider::OpenAi, "")
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("credential", &self.credential().map(|_| "<redacted>"))
            .finish()
    }
}

pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<ProviderConfig>;

    fn save(&self, config: &ProviderConfig) -> Result<()>;
}

/// Settings stored as JSON in a single file. Concurrent writers are
/// not coordinated, whichever save lands last wins.
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `STUDYCHAT_SETTINGS_PATH` if set, otherwise `settings.json`
    /// under the platform config directory.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = env::var("STUDYCHAT_SETTINGS_PATH") {
            return Ok(PathBuf::from(path));
        }
        let dir = dirs::config_dir().ok_or_else(|| anyhow!("No config directory found"))?;
        Ok(dir.join("studychat").join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<ProviderConfig> {
        if !self.path.exists() {
            tracing::debug!("No settings at {}, using defaults", self.path.display());
            return Ok(ProviderConfig::default());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse settings {}", self.path.display()))
    }

    fn save(&self, config: &ProviderConfig) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        // Write next to the target then rename over it so readers
        // never see a half written file
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| String::from("settings.json"));
        let tmp = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));
        fs::write(&tmp, serde_json::to_vec_pretty(config)?)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        tracing::debug!("Saved settings for {}", config.provider);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSettingsStore::new(dir.path().join("settings.json"));
        assert_eq!(store.load().unwrap(), ProviderConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSettingsStore::new(dir.path().join("nested").join("settings.json"));

        store
            .save(&ProviderConfig::new(Provider::Anthropic, "sk-ant-1"))
            .unwrap();
        store
            .save(&ProviderConfig::new(Provider::Google, "g-key"))
            .unwrap();

        assert_eq!(
            store.load().unwrap(),
            ProviderConfig::new(Provider::Google, "g-key")
        );
        // Only the settings file is left behind
        let entries = fs::read_dir(dir.path().join("nested")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_load_rejects_unknown_provider() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"provider":"bogus","credential":"x"}"#).unwrap();
        assert!(FileSettingsStore::new(path).load().is_err());
    }

    #[test]
    fn test_is_usable() {
        assert!(!ProviderConfig::new(Provider::OpenAi, "  ").is_usable());
        assert!(ProviderConfig::new(Provider::OpenAi, "sk-1").is_usable());
        assert!(ProviderConfig::new(Provider::Ollama, "").is_usable());
    }

    #[test]
    fn test_debug_redacts_credential() {
        let debug = format!("{:?}", ProviderConfig::new(Provider::OpenAi, "sk-secret"));
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("redacted"));
    }
}
