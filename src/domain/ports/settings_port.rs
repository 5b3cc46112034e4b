//! Settings storage port definition.

use async_trait::async_trait;

use crate::domain::entities::Settings;
use crate::domain::errors::SettingsError;

/// Port for settings persistence.
#[async_trait]
pub trait SettingsStorePort: Send + Sync {
    /// Loads stored settings; defaults when nothing is stored yet.
    async fn load(&self) -> Result<Settings, SettingsError>;

    /// Stores settings.
    async fn save(&self, settings: &Settings) -> Result<(), SettingsError>;
}
