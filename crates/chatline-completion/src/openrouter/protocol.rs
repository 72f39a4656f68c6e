//! OpenRouter wire format.

use chatline_core::{ChatMessage, CompletionRequest, StructuredOutputSchema};
use serde::{Deserialize, Serialize};

/// Body of `POST /chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatCompletionBody<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat<'a>>,
}

impl<'a> ChatCompletionBody<'a> {
    #[must_use]
    pub fn from_request(request: &'a CompletionRequest) -> Self {
        Self {
            model: &request.model,
            messages: &request.messages,
            response_format: request
                .response_format
                .as_ref()
                .map(|json_schema| ResponseFormat {
                    kind: "json_schema",
                    json_schema,
                }),
        }
    }
}

/// `response_format` object requesting schema-shaped output.
#[derive(Debug, Serialize)]
pub struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub json_schema: &'a StructuredOutputSchema,
}

/// Error body returned with a non-success status.
///
/// OpenRouter nests the message under `error`; some proxies put it at the
/// top level.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Human-readable reason carried by a raw error body, if any.
    #[must_use]
    pub fn reason(raw: &str) -> Option<String> {
        let body: Self = serde_json::from_str(raw).ok()?;
        body.message
            .or_else(|| body.error.and_then(|e| e.message))
            .filter(|m| !m.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use chatline_core::ChatRole;

    use super::*;

    #[test]
    fn test_body_without_schema() {
        let request = CompletionRequest {
            messages: vec![ChatMessage {
                role: ChatRole::User,
                content: "Hello".to_string(),
            }],
            model: "openai/gpt-4".to_string(),
            response_format: None,
        };
        let json = serde_json::to_value(ChatCompletionBody::from_request(&request)).unwrap();
        assert_eq!(json["model"], "openai/gpt-4");
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn test_body_with_schema() {
        let request = CompletionRequest {
            messages: vec![],
            model: "m".to_string(),
            response_format: Some(crate::list_schema()),
        };
        let json = serde_json::to_value(ChatCompletionBody::from_request(&request)).unwrap();
        assert_eq!(json["response_format"]["type"], "json_schema");
        assert_eq!(json["response_format"]["json_schema"]["name"], "list");
    }

    #[test]
    fn test_error_reason() {
        assert_eq!(
            ErrorBody::reason(r#"{"error":{"message":"No auth credentials found","code":401}}"#)
                .as_deref(),
            Some("No auth credentials found")
        );
        assert_eq!(
            ErrorBody::reason(r#"{"message":"Rate limited"}"#).as_deref(),
            Some("Rate limited")
        );
        assert_eq!(ErrorBody::reason("<html>bad gateway</html>"), None);
    }
}
