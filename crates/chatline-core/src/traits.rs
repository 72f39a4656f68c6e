//! Core traits for storage and completion.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use crate::{CompletionError, CompletionRequest, CompletionResponse};

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Durable string key-value space shared by every surface.
///
/// Calls are synchronous so a read-modify-write over it never yields to
/// the scheduler halfway through.
pub trait DurableStorage: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value under `key` in a single write.
    ///
    /// # Errors
    /// Returns error if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    /// Returns error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: DurableStorage + ?Sized> DurableStorage for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// Source of the bearer credential for the completion service.
pub trait CredentialProvider: Send + Sync {
    /// Current credential, or `None` when the user has not supplied one.
    fn credential(&self) -> Option<SecretString>;
}

/// Source of the model identifier used for the next request.
pub trait ModelProvider: Send + Sync {
    fn selected_model(&self) -> String;
}

impl ModelProvider for String {
    fn selected_model(&self) -> String {
        self.clone()
    }
}

/// External service that turns a message sequence into a reply.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Run one completion.
    ///
    /// Implementations make at most one network call and never retry.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError>;
}
