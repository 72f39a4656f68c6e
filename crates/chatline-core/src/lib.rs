//! Core abstractions for chatline session management.
//!
//! This crate provides the fundamental building blocks:
//! - `ChangeNotifier` - Payload-less broadcast telling surfaces to re-read state
//! - `Message` / `SessionId` - Conversation data model
//! - `ClientConfig` - Completion service configuration
//! - Storage and completion traits

pub mod completion;
pub mod config;
pub mod notifier;
pub mod traits;
pub mod types;

pub use completion::{
    ChatMessage, ChatRole, Choice, CompletionError, CompletionRequest, CompletionResponse,
    StructuredOutputSchema,
};
pub use config::ClientConfig;
pub use notifier::{ChangeNotifier, StoreChanged, Subscription};
pub use traits::{CompletionService, CredentialProvider, DurableStorage, ModelProvider, StorageError};
pub use types::{Message, Role, SessionId, SessionSummary};
