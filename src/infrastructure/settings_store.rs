//! Settings persistence adapters.

use async_trait::async_trait;
use directories::ProjectDirs;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;

use super::config::app_config::{APP_NAME, APP_ORGANIZATION, APP_QUALIFIER};
use super::config::save_toml_atomic;
use crate::domain::entities::Settings;
use crate::domain::errors::SettingsError;
use crate::domain::ports::SettingsStorePort;

const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Settings stored as TOML in the config directory.
#[derive(Debug, Clone)]
pub struct TomlSettingsStore {
    path: Option<PathBuf>,
}

impl Default for TomlSettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TomlSettingsStore {
    /// Creates a store in the default config directory.
    ///
    /// If project directories cannot be determined, persistence will be disabled
    /// and a warning will be logged.
    #[must_use]
    pub fn new() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME) {
            Self {
                path: Some(proj_dirs.config_dir().join(SETTINGS_FILE_NAME)),
            }
        } else {
            tracing::warn!("Failed to determine project directories. Settings persistence disabled.");
            Self { path: None }
        }
    }

    /// Creates a store backed by `path`.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }
}

#[async_trait]
impl SettingsStorePort for TomlSettingsStore {
    async fn load(&self) -> Result<Settings, SettingsError> {
        let Some(path) = &self.path else {
            return Ok(Settings::default());
        };

        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| SettingsError::ReadFailed(e.to_string()))?;

        toml::from_str(&content).map_err(|e| SettingsError::Malformed(e.to_string()))
    }

    async fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let Some(path) = self.path.clone() else {
            return Err(SettingsError::NotAvailable(
                "no settings location".to_string(),
            ));
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SettingsError::WriteFailed(e.to_string()))?;
        }

        let settings = settings.clone();
        tokio::task::spawn_blocking(move || save_toml_atomic(&path, &settings))
            .await
            .map_err(|e| SettingsError::WriteFailed(e.to_string()))?
            .map_err(|e| SettingsError::WriteFailed(e.to_string()))
    }
}

/// Settings kept in memory for the life of the process.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: RwLock<Settings>,
}

impl MemorySettingsStore {
    /// Creates a store holding `settings`.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }
}

#[async_trait]
impl SettingsStorePort for MemorySettingsStore {
    async fn load(&self) -> Result<Settings, SettingsError> {
        Ok(self.settings.read().await.clone())
    }

    async fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        *self.settings.write().await = settings.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let store = TomlSettingsStore::with_path(dir.path().join(SETTINGS_FILE_NAME));

        assert_eq!(store.load().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = TomlSettingsStore::with_path(dir.path().join("nested").join(SETTINGS_FILE_NAME));
        let settings = Settings {
            is_enabled: false,
            excluded_domains: vec!["example.org".to_string()],
        };

        store.save(&settings).await.unwrap();

        assert_eq!(store.load().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "is_enabled = [").unwrap();

        let result = TomlSettingsStore::with_path(path).load().await;

        assert!(matches!(result, Err(SettingsError::Malformed(_))));
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySettingsStore::default();
        let disabled = Settings {
            is_enabled: false,
            ..Settings::default()
        };

        tokio_test::block_on(async {
            store.save(&disabled).await.unwrap();
            assert_eq!(store.load().await.unwrap(), disabled);
        });
    }
}
