//! Wire protocol between presentation surfaces and the chat backend.

use chatline_core::{Message, SessionId, SessionSummary};
use chatline_session::{ExchangeState, Notice};
use serde::{Deserialize, Serialize};

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request the session list.
    ListSessions,
    /// Start a fresh session and make it current.
    NewSession,
    /// Switch to a session.
    SelectSession { session_id: SessionId },
    /// Delete a session.
    DeleteSession { session_id: SessionId },
    /// Send a user message. Without an id the current session is used.
    Send {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        text: String,
    },
    /// Dismiss the failure notice.
    DismissNotice,
    /// Ping for keepalive.
    Ping,
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Started sessions, newest first.
    Sessions { sessions: Vec<SessionSummary> },
    /// Messages to display for a session.
    Transcript {
        session_id: SessionId,
        messages: Vec<Message>,
    },
    /// Exchange state transition.
    State { state: ExchangeState },
    /// Failure notice.
    Notice { notice: Notice },
    /// The store changed; a fresh list and transcript follow.
    StoreChanged,
    /// The current session changed in response to a request.
    SessionSelected { session_id: SessionId },
    /// Error message.
    Error { message: String },
    /// Pong response.
    Pong,
}

impl ServerMessage {
    /// Create an error message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
