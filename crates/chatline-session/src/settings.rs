//! User settings kept next to the sessions.

use std::sync::Arc;

use chatline_completion::find_model;
use chatline_core::{CredentialProvider, DurableStorage, ModelProvider, StorageError};
use secrecy::SecretString;

/// Key of the completion service API key.
pub const API_KEY_KEY: &str = "openrouter_api_key";

/// Key of the selected model id.
pub const SELECTED_MODEL_KEY: &str = "selected_model";

/// API key and model selection, persisted in durable storage.
///
/// Doubles as the credential and model source of the completion client
/// so changes apply to the next request without rebuilding anything.
#[derive(Clone)]
pub struct Settings {
    storage: Arc<dyn DurableStorage>,
    default_model: String,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("default_model", &self.default_model)
            .field("has_api_key", &self.has_api_key())
            .finish_non_exhaustive()
    }
}

impl Settings {
    #[must_use]
    pub fn new(storage: Arc<dyn DurableStorage>, default_model: impl Into<String>) -> Self {
        Self {
            storage,
            default_model: default_model.into(),
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value.filter(|v| !v.trim().is_empty()),
            Err(e) => {
                tracing::warn!(key, "Failed to read setting: {e}");
                None
            }
        }
    }

    /// Stored API key.
    #[must_use]
    pub fn api_key(&self) -> Option<SecretString> {
        self.read(API_KEY_KEY).map(SecretString::from)
    }

    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.read(API_KEY_KEY).is_some()
    }

    /// Save `key`, trimmed. Returns `false` and stores nothing when blank.
    ///
    /// # Errors
    /// Returns error if the storage write fails.
    pub fn set_api_key(&self, key: &str) -> Result<bool, StorageError> {
        let key = key.trim();
        if key.is_empty() {
            return Ok(false);
        }
        self.storage.set(API_KEY_KEY, key)?;
        tracing::info!("API key saved");
        Ok(true)
    }

    /// Forget the stored API key.
    ///
    /// # Errors
    /// Returns error if the storage write fails.
    pub fn reset_api_key(&self) -> Result<(), StorageError> {
        self.storage.remove(API_KEY_KEY)?;
        tracing::info!("API key removed");
        Ok(())
    }

    /// Model used for the next request.
    #[must_use]
    pub fn selected_model(&self) -> String {
        self.read(SELECTED_MODEL_KEY)
            .unwrap_or_else(|| self.default_model.clone())
    }

    /// Remember `model_id` as the selected model.
    ///
    /// Ids outside the catalog are stored too; the service decides whether
    /// it knows them.
    ///
    /// # Errors
    /// Returns error if the storage write fails.
    pub fn select_model(&self, model_id: &str) -> Result<(), StorageError> {
        if find_model(model_id).is_none() {
            tracing::warn!(model = model_id, "selecting model outside the catalog");
        }
        self.storage.set(SELECTED_MODEL_KEY, model_id)
    }
}

impl CredentialProvider for Settings {
    fn credential(&self) -> Option<SecretString> {
        self.api_key()
    }
}

impl ModelProvider for Settings {
    fn selected_model(&self) -> String {
        Self::selected_model(self)
    }
}
