//! Conversation data model.

use std::{
    fmt,
    sync::atomic::{AtomicI64, Ordering},
};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of characters kept in a derived session title.
pub const TITLE_MAX_CHARS: usize = 40;

/// Marker appended to titles cut at [`TITLE_MAX_CHARS`].
pub const TITLE_ELLIPSIS: &str = "...";

/// Last timestamp handed out by [`SessionId::mint`].
static LAST_MINTED: AtomicI64 = AtomicI64::new(0);

/// Session identifier.
///
/// Minted ids are the creation time in Unix milliseconds, so they sort by
/// age. Ids read back from storage are kept verbatim even when they do not
/// follow that shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a fresh identifier.
    ///
    /// Strictly increasing within the process, even when called twice in
    /// the same millisecond.
    #[must_use]
    pub fn mint() -> Self {
        let now = Utc::now().timestamp_millis();
        let mut last = LAST_MINTED.load(Ordering::Acquire);
        loop {
            let next = if now > last { now } else { last + 1 };
            match LAST_MINTED.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Self(next.to_string()),
                Err(actual) => last = actual,
            }
        }
    }

    /// Creation time embedded in the identifier, if it has one.
    #[must_use]
    pub fn created_at_millis(&self) -> Option<i64> {
        self.0.parse().ok()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Author of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique within the owning session.
    pub id: String,
    pub role: Role,
    /// Raw text; may carry markup or structured JSON for presentation.
    pub content: String,
    /// Display time. Ordering is positional, never by this field.
    pub timestamp: String,
}

impl Message {
    /// Create a message stamped with the local wall-clock time.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: display_timestamp(&Local::now()),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Format a time the way message bubbles show it (`2:34 PM`).
#[must_use]
pub fn display_timestamp(time: &DateTime<Local>) -> String {
    time.format("%-I:%M %p").to_string()
}

/// Session entry shown in a session list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub title: String,
    pub active: bool,
}

/// Title of a session: its first user message, shortened for display.
///
/// Returns `None` while the session has no user message, which also means
/// the session is not listed yet.
#[must_use]
pub fn session_title(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .find(|m| m.is_user())
        .map(|m| truncate_title(&m.content))
}

/// Cut `text` to [`TITLE_MAX_CHARS`] characters, marking the cut.
#[must_use]
pub fn truncate_title(text: &str) -> String {
    if text.chars().count() <= TITLE_MAX_CHARS {
        return text.to_string();
    }
    let mut title: String = text.chars().take(TITLE_MAX_CHARS).collect();
    title.push_str(TITLE_ELLIPSIS);
    title
}
