//! Applies extension messages to the stored settings.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::domain::entities::{ExtensionMessage, ExtensionStateResponse, Settings};
use crate::domain::errors::SettingsError;
use crate::domain::ports::SettingsStorePort;

/// What handling a message produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageOutcome {
    /// Reply to send back, if the message expects one.
    pub response: Option<ExtensionStateResponse>,
    /// New master switch state for live sessions and the interceptor.
    pub enabled: Option<bool>,
}

/// Owns the current settings and their persistence.
pub struct SettingsService {
    store: Arc<dyn SettingsStorePort>,
    current: RwLock<Settings>,
}

impl std::fmt::Debug for SettingsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsService")
            .field("current", &*self.current.read())
            .finish_non_exhaustive()
    }
}

impl SettingsService {
    /// Loads settings from `store`, falling back to defaults on error.
    pub async fn load(store: Arc<dyn SettingsStorePort>) -> Self {
        let settings = match store.load().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Failed to load settings, using defaults");
                Settings::default()
            }
        };

        Self {
            store,
            current: RwLock::new(settings),
        }
    }

    /// Snapshot of the current settings.
    #[must_use]
    pub fn current(&self) -> Settings {
        self.current.read().clone()
    }

    /// Applies one message.
    ///
    /// # Errors
    /// Returns an error if the changed settings cannot be persisted. The
    /// in-memory settings are left unchanged in that case.
    pub async fn handle(&self, message: &ExtensionMessage) -> Result<MessageOutcome, SettingsError> {
        match message {
            ExtensionMessage::ToggleExtension { is_enabled }
            | ExtensionMessage::UpdateExtensionState { is_enabled } => {
                let mut next = self.current();
                next.is_enabled = *is_enabled;
                self.persist(next).await?;
                info!(enabled = is_enabled, "Extension state changed");

                Ok(MessageOutcome {
                    response: None,
                    enabled: Some(*is_enabled),
                })
            }
            ExtensionMessage::UpdateExcludedDomains { excluded_domains } => {
                let mut next = self.current();
                next.excluded_domains.clone_from(excluded_domains);
                self.persist(next).await?;
                info!(count = excluded_domains.len(), "Excluded domains updated");

                Ok(MessageOutcome::default())
            }
            ExtensionMessage::GetExtensionState => Ok(MessageOutcome {
                response: Some(ExtensionStateResponse {
                    is_enabled: self.current.read().is_enabled,
                }),
                enabled: None,
            }),
        }
    }

    async fn persist(&self, settings: Settings) -> Result<(), SettingsError> {
        self.store.save(&settings).await?;
        *self.current.write() = settings;
        Ok(())
    }
}
