//! Completion service client for chatline.
//!
//! Provides:
//! - `OpenRouterClient` - `CompletionService` over the OpenRouter HTTP API
//! - Model catalog for the model picker
//! - Structured list output helpers

pub mod models;
pub mod openrouter;
pub mod schema;

pub use models::{ModelOption, available_models, find_model, model_name};
pub use openrouter::OpenRouterClient;
pub use schema::{format_structured_content, list_schema, wants_list};
