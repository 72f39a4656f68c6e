//! Broadcast change notification for store observers.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc, PoisonError, RwLock, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use futures::{StreamExt, future};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use uuid::Uuid;

/// Capacity of the async change channel.
const CHANNEL_CAPACITY: usize = 256;

/// Signal meaning "durable state changed, re-read it".
///
/// Carries no data; observers go back to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreChanged;

struct HandlerSlot {
    active: AtomicBool,
    handler: Box<dyn Fn() + Send + Sync>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: BTreeMap<u64, Arc<HandlerSlot>>,
}

struct Inner {
    registry: RwLock<Registry>,
    sender: broadcast::Sender<StoreChanged>,
    context: String,
    stamps: AtomicU64,
}

/// Process-wide change broadcaster.
///
/// Clones share the same subscribers, so every store handle built from a
/// clone (one per surface or tab) reaches every observer.
#[derive(Clone)]
pub struct ChangeNotifier {
    inner: Arc<Inner>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("context", &self.inner.context)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ChangeNotifier {
    /// Create a notifier with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                registry: RwLock::new(Registry::default()),
                sender,
                context: Uuid::new_v4().simple().to_string(),
                stamps: AtomicU64::new(0),
            }),
        }
    }

    /// Tell every subscriber that the store changed.
    pub fn notify(&self) {
        let _ = self.inner.sender.send(StoreChanged); // async listeners

        // Snapshot first so handlers may subscribe or unsubscribe re-entrantly.
        let slots: Vec<Arc<HandlerSlot>> = self
            .inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .values()
            .cloned()
            .collect();

        tracing::debug!(handlers = slots.len(), "broadcasting store change");

        for slot in slots {
            if slot.active.load(Ordering::Acquire) {
                (slot.handler)();
            }
        }
    }

    /// Register `handler` for every future notification.
    ///
    /// The handler stops firing once the returned [`Subscription`] is
    /// unsubscribed or dropped.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let slot = Arc::new(HandlerSlot {
            active: AtomicBool::new(true),
            handler: Box::new(handler),
        });

        let mut registry = self
            .inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.insert(id, Arc::clone(&slot));

        Subscription {
            id,
            slot,
            owner: Arc::downgrade(&self.inner),
        }
    }

    /// Get a receiver for notifications in async code.
    #[must_use]
    pub fn receiver(&self) -> broadcast::Receiver<StoreChanged> {
        self.inner.sender.subscribe()
    }

    /// Stream of notifications.
    ///
    /// A lagging consumer sees one signal in place of the ones it missed;
    /// re-reading once covers all of them.
    #[must_use]
    pub fn changes(&self) -> futures::stream::BoxStream<'static, StoreChanged> {
        BroadcastStream::new(self.receiver())
            .filter_map(|res: Result<StoreChanged, BroadcastStreamRecvError>| {
                future::ready(match res {
                    Ok(signal) => Some(signal),
                    Err(BroadcastStreamRecvError::Lagged(_)) => Some(StoreChanged),
                })
            })
            .boxed()
    }

    /// Identifier of the execution context (tab, process) this notifier
    /// serves. Clones share it.
    #[must_use]
    pub fn context_id(&self) -> &str {
        &self.inner.context
    }

    /// Fresh change stamp, `{context_id}:{sequence}`.
    ///
    /// Stored next to durable state so other contexts can tell that it
    /// changed and who changed it.
    #[must_use]
    pub fn next_stamp(&self) -> String {
        let seq = self.inner.stamps.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}:{seq}", self.inner.context)
    }

    /// Whether `stamp` came from [`Self::next_stamp`] of this context.
    #[must_use]
    pub fn is_own_stamp(&self, stamp: &str) -> bool {
        stamp
            .split_once(':')
            .is_some_and(|(context, _)| context == self.inner.context)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .len()
    }
}

/// Handle to a registered handler.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    id: u64,
    slot: Arc<HandlerSlot>,
    owner: Weak<Inner>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Subscription {
    /// Remove the handler. Equivalent to dropping the subscription.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Whether the handler is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.slot.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Deactivate before removal so an in-progress broadcast skips it.
        self.slot.active.store(false, Ordering::Release);
        if let Some(inner) = self.owner.upgrade() {
            inner
                .registry
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .handlers
                .remove(&self.id);
        }
    }
}
