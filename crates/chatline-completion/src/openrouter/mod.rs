//! OpenRouter chat completions client.

pub mod client;
pub mod protocol;

pub use client::OpenRouterClient;
