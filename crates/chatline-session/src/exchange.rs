//! Request/response exchange with the completion service.

use std::sync::{Arc, Mutex, PoisonError};

use chatline_completion::{list_schema, wants_list};
use chatline_core::{
    ChatMessage, CompletionError, CompletionRequest, CompletionService, Message, ModelProvider,
    SessionId,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::store::{SessionStore, StoreError};

/// Capacity of the transition channel.
const TRANSITION_CAPACITY: usize = 64;

/// Exchange state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeState {
    /// Ready for input.
    Idle,
    /// Waiting on the completion service; input must be rejected.
    Sending,
    /// Reply appended. Followed immediately by `Idle`.
    Succeeded,
    /// No reply appended. Followed immediately by `Idle`.
    Failed,
}

/// Kind of failure notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// No API key configured; surfaces keep a call-to-action up.
    MissingCredential,
    /// Transport, service or storage failure; shown transiently.
    RequestFailed,
}

/// User-visible failure notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl From<&CompletionError> for Notice {
    fn from(err: &CompletionError) -> Self {
        let kind = match err {
            CompletionError::MissingCredential => NoticeKind::MissingCredential,
            CompletionError::RequestFailed { .. } => NoticeKind::RequestFailed,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<&StoreError> for Notice {
    fn from(err: &StoreError) -> Self {
        Self {
            kind: NoticeKind::RequestFailed,
            message: format!("Could not save the conversation: {err}"),
        }
    }
}

/// What a `send` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input; nothing happened.
    Ignored,
    /// The reply was appended.
    Delivered(Message),
    /// No reply was appended. The user message, if saved, stays.
    Failed(Notice),
}

/// Exchange options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeOptions {
    /// Attach the list schema to requests that ask for a list.
    pub structured_lists: bool,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            structured_lists: true,
        }
    }
}

/// Sequences one round trip at a time against the session store.
///
/// The exchange does not queue: callers check [`Self::can_submit`] and
/// keep input disabled while a request is in flight.
pub struct ConversationExchange {
    store: SessionStore,
    completion: Arc<dyn CompletionService>,
    models: Arc<dyn ModelProvider>,
    options: ExchangeOptions,
    state: Mutex<ExchangeState>,
    notice: Mutex<Option<Notice>>,
    transitions: broadcast::Sender<ExchangeState>,
}

impl std::fmt::Debug for ConversationExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationExchange")
            .field("state", &self.state())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ConversationExchange {
    /// Create an idle exchange.
    #[must_use]
    pub fn new(
        store: SessionStore,
        completion: Arc<dyn CompletionService>,
        models: Arc<dyn ModelProvider>,
    ) -> Self {
        Self::with_options(store, completion, models, ExchangeOptions::default())
    }

    #[must_use]
    pub fn with_options(
        store: SessionStore,
        completion: Arc<dyn CompletionService>,
        models: Arc<dyn ModelProvider>,
        options: ExchangeOptions,
    ) -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            store,
            completion,
            models,
            options,
            state: Mutex::new(ExchangeState::Idle),
            notice: Mutex::new(None),
            transitions,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ExchangeState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether input may be submitted now.
    #[must_use]
    pub fn can_submit(&self) -> bool {
        self.state() != ExchangeState::Sending
    }

    /// Receiver for every state transition, in order.
    #[must_use]
    pub fn subscribe_state(&self) -> broadcast::Receiver<ExchangeState> {
        self.transitions.subscribe()
    }

    /// Latest failure notice, until dismissed.
    #[must_use]
    pub fn notice(&self) -> Option<Notice> {
        self.notice
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Dismiss the current notice.
    pub fn dismiss_notice(&self) {
        self.notice
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Send `text` as a user message in `session_id` and append the reply.
    ///
    /// Never returns an error: failures are reported through the outcome,
    /// the notice and the `Failed` transition.
    pub async fn send(&self, session_id: &SessionId, text: &str) -> SendOutcome {
        if text.trim().is_empty() {
            tracing::debug!(session = %session_id, "ignoring blank message");
            return SendOutcome::Ignored;
        }

        self.dismiss_notice();
        let saved = self.store.append_message(session_id, Message::user(text));
        self.transition(ExchangeState::Sending);
        if let Err(e) = saved {
            tracing::error!(session = %session_id, "Failed to save user message: {e}");
            return self.fail(Notice::from(&e));
        }

        let request = self.build_request(session_id, text);
        tracing::info!(
            session = %session_id,
            model = %request.model,
            messages = request.messages.len(),
            "sending message"
        );

        let reply = match self.completion.complete(request).await {
            Ok(response) => match response.first_message() {
                Some(choice) => Message::assistant(choice.content.clone()),
                None => {
                    return self.fail(Notice::from(&CompletionError::request_failed(
                        "Response contained no choices",
                    )));
                }
            },
            Err(e) => {
                tracing::warn!(session = %session_id, "Completion failed: {e}");
                return self.fail(Notice::from(&e));
            }
        };

        if let Err(e) = self.store.append_message(session_id, reply.clone()) {
            tracing::error!(session = %session_id, "Failed to save reply: {e}");
            return self.fail(Notice::from(&e));
        }

        self.transition(ExchangeState::Succeeded);
        self.transition(ExchangeState::Idle);
        tracing::info!(session = %session_id, "reply received");
        SendOutcome::Delivered(reply)
    }

    /// Request over the whole session, ending with the message just saved.
    fn build_request(&self, session_id: &SessionId, text: &str) -> CompletionRequest {
        let messages = self
            .store
            .lookup(session_id)
            .into_messages()
            .iter()
            .map(ChatMessage::from)
            .collect();

        CompletionRequest {
            messages,
            model: self.models.selected_model(),
            response_format: (self.options.structured_lists && wants_list(text))
                .then(list_schema),
        }
    }

    fn fail(&self, notice: Notice) -> SendOutcome {
        *self.notice.lock().unwrap_or_else(PoisonError::into_inner) = Some(notice.clone());
        self.transition(ExchangeState::Failed);
        self.transition(ExchangeState::Idle);
        SendOutcome::Failed(notice)
    }

    fn transition(&self, next: ExchangeState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
        let _ = self.transitions.send(next);
    }
}
