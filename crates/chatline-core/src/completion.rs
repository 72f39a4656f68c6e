//! Request and response types exchanged with a completion service.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{Message, Role};

/// Role of a message sent to the completion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl From<Role> for ChatRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Self::User,
            Role::Assistant => Self::Assistant,
        }
    }
}

/// `{role, content}` pair; identifiers and timestamps stay local.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.into(),
            content: message.content.clone(),
        }
    }
}

/// JSON schema the model is asked to follow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredOutputSchema {
    pub name: String,
    pub strict: bool,
    pub schema: Value,
}

/// One round trip worth of input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<StructuredOutputSchema>,
}

/// A generated alternative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChatMessage,
}

/// Service reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<Choice>,
}

impl CompletionResponse {
    /// Response carrying a single assistant choice.
    #[must_use]
    pub fn from_text(content: impl Into<String>) -> Self {
        Self {
            id: None,
            model: None,
            choices: vec![Choice {
                message: ChatMessage {
                    role: ChatRole::Assistant,
                    content: content.into(),
                },
            }],
        }
    }

    /// The reply used by a conversation: choice 0.
    #[must_use]
    pub fn first_message(&self) -> Option<&ChatMessage> {
        self.choices.first().map(|c| &c.message)
    }
}

/// Completion failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("API key not found. Please add your API key.")]
    MissingCredential,
    #[error("{}", .reason.as_deref().unwrap_or("Failed to send message"))]
    RequestFailed { reason: Option<String> },
}

impl CompletionError {
    /// Request failure with a human-readable reason.
    #[must_use]
    pub fn request_failed(reason: impl Into<String>) -> Self {
        Self::RequestFailed {
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_drops_local_fields() {
        let msg = Message::user("Hello");
        let wire = serde_json::to_value(ChatMessage::from(&msg)).unwrap();
        assert_eq!(wire, serde_json::json!({"role": "user", "content": "Hello"}));
    }

    #[test]
    fn test_request_omits_absent_schema() {
        let request = CompletionRequest {
            messages: vec![],
            model: "m".to_string(),
            response_format: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn test_error_messages() {
        let generic = CompletionError::RequestFailed { reason: None };
        assert_eq!(generic.to_string(), "Failed to send message");
        assert_eq!(
            CompletionError::request_failed("HTTP 500").to_string(),
            "HTTP 500"
        );
    }

    #[test]
    fn test_parse_response_without_metadata() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Hi there"}}]}"#;
        let response: CompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.first_message().unwrap().content, "Hi there");
        assert!(response.id.is_none());
    }
}
