//! Models offered in the model picker.

use chatline_core::config::DEFAULT_MODEL_ID;
use serde::Serialize;

/// A selectable model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelOption {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

const MODELS: &[ModelOption] = &[
    ModelOption {
        id: DEFAULT_MODEL_ID,
        name: "Qwen 2.5 VL 72B",
        description: "Vision-language model, free tier",
    },
    ModelOption {
        id: "deepseek/deepseek-chat:free",
        name: "DeepSeek V3",
        description: "General chat, free tier",
    },
    ModelOption {
        id: "meta-llama/llama-3.3-70b-instruct:free",
        name: "Llama 3.3 70B",
        description: "Instruction tuned, free tier",
    },
    ModelOption {
        id: "google/gemini-2.0-flash-exp:free",
        name: "Gemini 2.0 Flash",
        description: "Fast responses, free tier",
    },
    ModelOption {
        id: "openai/gpt-4",
        name: "GPT-4",
        description: "Supports structured output",
    },
];

/// All models, default first.
#[must_use]
pub const fn available_models() -> &'static [ModelOption] {
    MODELS
}

#[must_use]
pub fn find_model(id: &str) -> Option<&'static ModelOption> {
    MODELS.iter().find(|m| m.id == id)
}

/// Display name for `id`; empty when the model is not in the catalog.
#[must_use]
pub fn model_name(id: &str) -> &'static str {
    find_model(id).map_or("", |m| m.name)
}
