//! Bridge between one connected surface and the shared chat backend.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use chatline_core::{CompletionService, ModelProvider, SessionId, Subscription};
use chatline_session::{
    ConversationExchange, ExchangeOptions, SendOutcome, SessionController, SessionStore,
};
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};

use crate::protocol::{ClientMessage, ServerMessage};

/// Send error.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Channel closed")]
    ChannelClosed,
}

/// Services shared by every connection.
#[derive(Clone)]
pub struct ChatBackend {
    store: SessionStore,
    completion: Arc<dyn CompletionService>,
    models: Arc<dyn ModelProvider>,
    options: ExchangeOptions,
}

impl std::fmt::Debug for ChatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatBackend")
            .field("store", &self.store)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ChatBackend {
    #[must_use]
    pub fn new(
        store: SessionStore,
        completion: Arc<dyn CompletionService>,
        models: Arc<dyn ModelProvider>,
    ) -> Self {
        Self {
            store,
            completion,
            models,
            options: ExchangeOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ExchangeOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub const fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Open a link for a new surface.
    ///
    /// Returns the link and the receiver for everything pushed to the
    /// surface. Must be called inside a tokio runtime.
    #[must_use]
    pub fn connect(&self) -> (ChatLink, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = self.store.handle();
        let controller = SessionController::new(store.clone());
        let exchange = Arc::new(ConversationExchange::with_options(
            store.clone(),
            Arc::clone(&self.completion),
            Arc::clone(&self.models),
            self.options,
        ));

        let subscription = {
            let controller = controller.clone();
            let tx = tx.clone();
            store.subscribe(move || {
                let _ = tx.send(ServerMessage::StoreChanged);
                push_view(&controller, &tx);
            })
        };

        let forward_states = {
            let mut states = exchange.subscribe_state();
            let tx = tx.clone();
            tokio::spawn(async move {
                loop {
                    match states.recv().await {
                        Ok(state) => {
                            if tx.send(ServerMessage::State { state }).is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "state forwarder lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        };

        tracing::debug!("surface connected");
        let link = ChatLink {
            controller,
            exchange,
            tx,
            in_flight: Arc::new(AtomicBool::new(false)),
            subscription: Some(subscription),
            forward_states,
        };
        (link, rx)
    }
}

/// One surface's view of the backend.
///
/// Dropping the link unsubscribes it from store changes. Sends already
/// in flight keep running and still append their reply.
pub struct ChatLink {
    controller: SessionController,
    exchange: Arc<ConversationExchange>,
    tx: mpsc::UnboundedSender<ServerMessage>,
    in_flight: Arc<AtomicBool>,
    subscription: Option<Subscription>,
    forward_states: JoinHandle<()>,
}

impl ChatLink {
    #[must_use]
    pub const fn controller(&self) -> &SessionController {
        &self.controller
    }

    #[must_use]
    pub fn exchange(&self) -> &ConversationExchange {
        &self.exchange
    }

    /// Push the session list and current transcript, starting a session
    /// when none is current.
    ///
    /// # Errors
    /// Returns error if the surface is gone.
    pub fn sync(&self) -> Result<(), SendError> {
        if let Err(e) = self.controller.ensure_current() {
            tracing::error!("Failed to start a session: {e}");
            self.push(ServerMessage::error(e.to_string()))?;
        }
        push_view(&self.controller, &self.tx);
        if let Some(notice) = self.exchange.notice() {
            self.push(ServerMessage::Notice { notice })?;
        }
        Ok(())
    }

    /// Handle one client message.
    ///
    /// Store failures are reported to the surface as `Error` messages.
    ///
    /// # Errors
    /// Returns error if the surface is gone.
    pub fn handle(&self, msg: ClientMessage) -> Result<(), SendError> {
        match msg {
            ClientMessage::Ping => self.push(ServerMessage::Pong),
            ClientMessage::ListSessions => self.push(ServerMessage::Sessions {
                sessions: self.controller.list_sessions(),
            }),
            ClientMessage::NewSession => match self.controller.new_session() {
                Ok(session_id) => self.push(ServerMessage::SessionSelected { session_id }),
                Err(e) => self.push(ServerMessage::error(e.to_string())),
            },
            ClientMessage::SelectSession { session_id } => {
                match self.controller.select_session(&session_id) {
                    Ok(()) => self.push(ServerMessage::SessionSelected { session_id }),
                    Err(e) => self.push(ServerMessage::error(e.to_string())),
                }
            }
            ClientMessage::DeleteSession { session_id } => {
                match self.controller.delete_session(&session_id) {
                    Ok(Some(session_id)) => {
                        self.push(ServerMessage::SessionSelected { session_id })
                    }
                    Ok(None) => Ok(()),
                    Err(e) => self.push(ServerMessage::error(e.to_string())),
                }
            }
            ClientMessage::Send { session_id, text } => self.start_send(session_id, text),
            ClientMessage::DismissNotice => {
                self.exchange.dismiss_notice();
                Ok(())
            }
        }
    }

    fn start_send(&self, session_id: Option<SessionId>, text: String) -> Result<(), SendError> {
        let session_id = match session_id {
            Some(id) => id,
            None => match self.controller.ensure_current() {
                Ok(id) => id,
                Err(e) => return self.push(ServerMessage::error(e.to_string())),
            },
        };

        if !self.exchange.can_submit()
            || self
                .in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return self.push(ServerMessage::error("A message is already being sent"));
        }

        let exchange = Arc::clone(&self.exchange);
        let in_flight = Arc::clone(&self.in_flight);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = exchange.send(&session_id, &text).await;
            in_flight.store(false, Ordering::Release);
            if let SendOutcome::Failed(notice) = outcome {
                // The surface may be gone; the user message is saved either way.
                let _ = tx.send(ServerMessage::Notice { notice });
            }
        });
        Ok(())
    }

    /// Push `msg` to the surface.
    ///
    /// # Errors
    /// Returns error if the surface is gone.
    pub fn push(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.tx.send(msg).map_err(|_| SendError::ChannelClosed)
    }
}

impl Drop for ChatLink {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.forward_states.abort();
        tracing::debug!("surface disconnected");
    }
}

fn push_view(controller: &SessionController, tx: &mpsc::UnboundedSender<ServerMessage>) {
    let _ = tx.send(ServerMessage::Sessions {
        sessions: controller.list_sessions(),
    });
    if let Some(session_id) = controller.current_session() {
        let messages = controller.transcript(&session_id);
        let _ = tx.send(ServerMessage::Transcript {
            session_id,
            messages,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chatline_core::{
        ChangeNotifier, CompletionError, CompletionRequest, CompletionResponse, Role,
    };
    use chatline_session::{ExchangeState, NoticeKind, storage::MemoryStorage};
    use tokio::sync::Notify;

    use super::*;

    /// Replies once released, so tests can observe the in-flight window.
    struct Gated {
        gate: Notify,
        reply: Result<CompletionResponse, CompletionError>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl CompletionService for Gated {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, CompletionError> {
            *self.calls.lock().unwrap() += 1;
            self.gate.notified().await;
            self.reply.clone()
        }
    }

    fn backend(reply: Result<CompletionResponse, CompletionError>) -> (ChatBackend, Arc<Gated>) {
        let gated = Arc::new(Gated {
            gate: Notify::new(),
            reply,
            calls: Mutex::new(0),
        });
        let store = SessionStore::new(Arc::new(MemoryStorage::new()), ChangeNotifier::new());
        let backend = ChatBackend::new(
            store,
            Arc::clone(&gated) as Arc<dyn CompletionService>,
            Arc::new("test/model".to_string()),
        );
        (backend, gated)
    }

    /// Receive until `pred` matches.
    async fn recv_until(
        rx: &mut mpsc::UnboundedReceiver<ServerMessage>,
        pred: impl Fn(&ServerMessage) -> bool,
    ) -> ServerMessage {
        loop {
            let msg = rx.recv().await.expect("link closed");
            if pred(&msg) {
                return msg;
            }
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn test_ping() {
        let (backend, _) = backend(Ok(CompletionResponse::from_text("unused")));
        let (link, mut rx) = backend.connect();

        link.handle(ClientMessage::Ping).unwrap();

        assert_eq!(rx.recv().await, Some(ServerMessage::Pong));
    }

    #[tokio::test]
    async fn test_sync_greets_fresh_surface() {
        let (backend, _) = backend(Ok(CompletionResponse::from_text("unused")));
        let (link, mut rx) = backend.connect();

        link.sync().unwrap();

        let transcript = recv_until(&mut rx, |m| matches!(m, ServerMessage::Transcript { .. })).await;
        let ServerMessage::Transcript { messages, .. } = transcript else {
            unreachable!();
        };
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_other_surface_sees_new_session() {
        let (backend, _) = backend(Ok(CompletionResponse::from_text("unused")));
        let (sidebar, _sidebar_rx) = backend.connect();
        let (_chat, mut chat_rx) = backend.connect();

        sidebar.handle(ClientMessage::NewSession).unwrap();

        let messages = drain(&mut chat_rx);
        assert_eq!(messages[0], ServerMessage::StoreChanged);
        assert!(matches!(messages[1], ServerMessage::Sessions { .. }));
        assert!(matches!(messages[2], ServerMessage::Transcript { .. }));
    }

    #[tokio::test]
    async fn test_send_round_trip() {
        let (backend, gated) = backend(Ok(CompletionResponse::from_text("Hi there")));
        let (link, mut rx) = backend.connect();
        link.handle(ClientMessage::NewSession).unwrap();

        link.handle(ClientMessage::Send {
            session_id: None,
            text: "Hello".to_string(),
        })
        .unwrap();
        recv_until(&mut rx, |m| {
            *m == ServerMessage::State {
                state: ExchangeState::Sending,
            }
        })
        .await;

        link.handle(ClientMessage::Send {
            session_id: None,
            text: "again".to_string(),
        })
        .unwrap();
        recv_until(&mut rx, |m| matches!(m, ServerMessage::Error { .. })).await;

        gated.gate.notify_one();
        recv_until(&mut rx, |m| {
            *m == ServerMessage::State {
                state: ExchangeState::Idle,
            }
        })
        .await;

        let sessions = link.controller().list_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title, "Hello");
        let current = link.controller().current_session().unwrap();
        assert_eq!(link.controller().messages(&current).len(), 2);
        assert_eq!(*gated.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_send_pushes_notice() {
        let (backend, gated) = backend(Err(CompletionError::MissingCredential));
        let (link, mut rx) = backend.connect();
        gated.gate.notify_one();

        link.handle(ClientMessage::Send {
            session_id: Some(SessionId::from("1700000000000")),
            text: "Hello".to_string(),
        })
        .unwrap();

        let notice = recv_until(&mut rx, |m| matches!(m, ServerMessage::Notice { .. })).await;
        let ServerMessage::Notice { notice } = notice else {
            unreachable!();
        };
        assert_eq!(notice.kind, NoticeKind::MissingCredential);

        link.handle(ClientMessage::DismissNotice).unwrap();
        assert!(link.exchange().notice().is_none());
    }

    #[tokio::test]
    async fn test_reply_lands_after_disconnect() {
        let (backend, gated) = backend(Ok(CompletionResponse::from_text("late reply")));
        let (link, mut rx) = backend.connect();
        let id = SessionId::from("1700000000000");

        link.handle(ClientMessage::Send {
            session_id: Some(id.clone()),
            text: "Hello".to_string(),
        })
        .unwrap();
        recv_until(&mut rx, |m| {
            *m == ServerMessage::State {
                state: ExchangeState::Sending,
            }
        })
        .await;

        drop(link);
        drop(rx);
        assert_eq!(backend.store().notifier().subscriber_count(), 0);

        let mut changes = backend.store().notifier().receiver();
        gated.gate.notify_one();
        changes.recv().await.unwrap();

        let messages = backend.store().lookup(&id).into_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "late reply");
    }
}
