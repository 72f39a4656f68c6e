//! Structured list output.
//!
//! Requests that ask for a list get a JSON schema attached; replies that
//! follow it come back as `{"items": [...]}` and are rendered as a
//! numbered list.

use chatline_core::StructuredOutputSchema;
use serde_json::{Value, json};

/// Words that mark a request as asking for a list.
const LIST_HINTS: [&str; 3] = ["list", "ideas", "suggestions"];

/// Schema asking the model for an array of strings under `items`.
#[must_use]
pub fn list_schema() -> StructuredOutputSchema {
    StructuredOutputSchema {
        name: "list".to_string(),
        strict: true,
        schema: json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "description": "List of items",
                    "items": {
                        "type": "string",
                        "description": "Individual item in the list"
                    }
                }
            },
            "required": ["items"],
            "additionalProperties": false
        }),
    }
}

/// Whether `text` asks for a list.
#[must_use]
pub fn wants_list(text: &str) -> bool {
    let lower = text.to_lowercase();
    LIST_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Render list-shaped JSON as `1. first\n\n2. second`.
///
/// Anything else, including invalid JSON, is returned unchanged.
#[must_use]
pub fn format_structured_content(content: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(content) else {
        return content.to_string();
    };
    let Some(items) = parsed.get("items").and_then(Value::as_array) else {
        return content.to_string();
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::String(s) => format!("{}. {s}", i + 1),
            other => format!("{}. {other}", i + 1),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
