//! Completion client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Model used until the user picks another one.
pub const DEFAULT_MODEL_ID: &str = "qwen/qwen2.5-vl-72b-instruct:free";

/// Default OpenAI-compatible endpoint root.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Client configuration.
///
/// The credential is deliberately absent: it is user-supplied and read
/// from the durable store on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Endpoint root; `/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sent as `X-Title`.
    #[serde(default = "default_app_title")]
    pub app_title: String,

    /// Sent as `HTTP-Referer` when set.
    #[serde(default)]
    pub referer: Option<String>,

    /// Model used when no selection is stored.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Whole-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_app_title() -> String {
    "chatline".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL_ID.to_string()
}

const fn default_timeout_secs() -> u64 {
    120
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            app_title: default_app_title(),
            referer: None,
            default_model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `CHATLINE_BASE_URL`, `CHATLINE_MODEL`,
    /// `CHATLINE_REFERER` and `CHATLINE_TIMEOUT_SECS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup("CHATLINE_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config.base_url = url;
        }
        if let Some(model) = lookup("CHATLINE_MODEL").filter(|v| !v.trim().is_empty()) {
            config.default_model = model;
        }
        if let Some(referer) = lookup("CHATLINE_REFERER").filter(|v| !v.trim().is_empty()) {
            config.referer = Some(referer);
        }
        match lookup("CHATLINE_TIMEOUT_SECS").map(|v| v.parse::<u64>()) {
            Some(Ok(secs)) if secs > 0 => config.timeout_secs = secs,
            Some(_) => tracing::warn!("ignoring invalid CHATLINE_TIMEOUT_SECS"),
            None => {}
        }
        config
    }

    /// Builder-style base URL override.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Full chat completions URL.
    #[must_use]
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(
            config.completions_url(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
        assert_eq!(config.default_model, DEFAULT_MODEL_ID);
        assert!(config.referer.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CHATLINE_BASE_URL", "http://localhost:9000/"),
            ("CHATLINE_MODEL", "openai/gpt-4"),
            ("CHATLINE_TIMEOUT_SECS", "5"),
        ]);
        let config = ClientConfig::from_lookup(|k| vars.get(k).map(ToString::to_string));

        assert_eq!(config.completions_url(), "http://localhost:9000/chat/completions");
        assert_eq!(config.default_model, "openai/gpt-4");
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_timeout_keeps_default() {
        let config = ClientConfig::from_lookup(|k| {
            (k == "CHATLINE_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"app_title":"demo"}"#).unwrap();
        assert_eq!(config.app_title, "demo");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }
}
