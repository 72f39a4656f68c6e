//! Durable session store.
//!
//! Two entries in the durable key space hold all state: the session
//! mapping, serialized as one JSON object, and the current session id.
//! Every write replaces a whole entry; there is no merging, so when two
//! handles (tabs) interleave read-modify-write cycles the later save wins.
//!
//! A third entry holds the stamp of the latest change. Contexts that share
//! the storage but not the notifier watch it (see [`crate::watch`]).

use std::{collections::BTreeMap, sync::Arc};

use chatline_core::{
    ChangeNotifier, DurableStorage, Message, SessionId, StorageError, Subscription,
};

/// Key of the serialized session mapping.
pub const SESSIONS_KEY: &str = "chat_sessions";

/// Key of the current session id.
pub const CURRENT_SESSION_KEY: &str = "current_chat_id";

/// Key of the latest change stamp.
pub const REVISION_KEY: &str = "chat_revision";

/// Session id → ordered messages.
pub type SessionMap = BTreeMap<SessionId, Vec<Message>>;

/// Store error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Failed to encode sessions: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Persisted sessions are corrupt: {0}")]
    CorruptPersistedState(#[source] serde_json::Error),
}

/// Everything the store holds at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub sessions: SessionMap,
    pub current: Option<SessionId>,
}

/// Result of looking a session up.
///
/// Sessions come into existence on their first append, so `Absent` is an
/// ordinary state, read as an empty session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLookup {
    Found(Vec<Message>),
    Absent,
}

impl SessionLookup {
    /// Messages of the session; empty when absent.
    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Self::Found(messages) => messages,
            Self::Absent => Vec::new(),
        }
    }

    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Handle to the durable session state.
///
/// Cheap to clone. Handles built over the same storage and notifier see
/// each other's writes; each one stands for a surface or a tab.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn DurableStorage>,
    notifier: ChangeNotifier,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Create a store over `storage`, broadcasting through `notifier`.
    #[must_use]
    pub fn new(storage: Arc<dyn DurableStorage>, notifier: ChangeNotifier) -> Self {
        Self { storage, notifier }
    }

    /// Another handle over the same storage and notifier.
    #[must_use]
    pub fn handle(&self) -> Self {
        self.clone()
    }

    #[must_use]
    pub const fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    #[must_use]
    pub fn storage(&self) -> Arc<dyn DurableStorage> {
        Arc::clone(&self.storage)
    }

    /// Register a change handler. See [`ChangeNotifier::subscribe`].
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.notifier.subscribe(handler)
    }

    /// Read the whole store.
    ///
    /// Never fails: unreadable or corrupt data reads as an empty store.
    #[must_use]
    pub fn load(&self) -> StoreSnapshot {
        StoreSnapshot {
            sessions: self.load_sessions(),
            current: self.current_pointer(),
        }
    }

    /// Look a single session up.
    #[must_use]
    pub fn lookup(&self, id: &SessionId) -> SessionLookup {
        self.load_sessions()
            .remove(id)
            .map_or(SessionLookup::Absent, SessionLookup::Found)
    }

    /// Persist `snapshot` and notify.
    ///
    /// The mapping is written in one piece; the pointer only when it
    /// differs from the stored one.
    ///
    /// # Errors
    /// Returns error if the storage write fails.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        self.write_sessions(&snapshot.sessions)?;
        if self.current_pointer() != snapshot.current {
            self.write_pointer(snapshot.current.as_ref())?;
        }
        self.notify();
        Ok(())
    }

    /// Id of the session on display, if any.
    #[must_use]
    pub fn current_pointer(&self) -> Option<SessionId> {
        match self.storage.get(CURRENT_SESSION_KEY) {
            Ok(value) => value.filter(|v| !v.is_empty()).map(SessionId::from),
            Err(e) => {
                tracing::warn!("Failed to read current session, treating as unset: {e}");
                None
            }
        }
    }

    /// Point at `id` and notify. `id` need not exist yet.
    ///
    /// # Errors
    /// Returns error if the storage write fails.
    pub fn set_current_pointer(&self, id: &SessionId) -> Result<(), StoreError> {
        self.write_pointer(Some(id))?;
        self.notify();
        Ok(())
    }

    /// Append `message` to the session, creating the session if needed.
    ///
    /// Load, push and save run back to back with no await in between.
    ///
    /// # Errors
    /// Returns error if the storage write fails.
    pub fn append_message(&self, id: &SessionId, message: Message) -> Result<(), StoreError> {
        let mut sessions = self.load_sessions();
        let messages = sessions.entry(id.clone()).or_default();
        messages.push(message);
        tracing::debug!(session = %id, count = messages.len(), "appending message");

        self.write_sessions(&sessions)?;
        self.notify();
        Ok(())
    }

    pub(crate) fn load_sessions(&self) -> SessionMap {
        let raw = match self.storage.get(SESSIONS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return SessionMap::new(),
            Err(e) => {
                tracing::warn!("Failed to read sessions, starting empty: {e}");
                return SessionMap::new();
            }
        };

        decode_sessions(&raw).unwrap_or_else(|e| {
            tracing::warn!("Discarding stored sessions: {e}");
            SessionMap::new()
        })
    }

    pub(crate) fn write_sessions(&self, sessions: &SessionMap) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(sessions).map_err(StoreError::Encode)?;
        self.storage.set(SESSIONS_KEY, &encoded)?;
        Ok(())
    }

    pub(crate) fn write_pointer(&self, id: Option<&SessionId>) -> Result<(), StoreError> {
        match id {
            Some(id) => self.storage.set(CURRENT_SESSION_KEY, id.as_str())?,
            None => self.storage.remove(CURRENT_SESSION_KEY)?,
        }
        Ok(())
    }

    /// Stored change stamp, if any.
    pub(crate) fn revision(&self) -> Option<String> {
        self.storage.get(REVISION_KEY).unwrap_or_else(|e| {
            tracing::warn!("Failed to read change stamp: {e}");
            None
        })
    }

    /// Stamp the change for other contexts, then notify this one.
    pub(crate) fn notify(&self) {
        let stamp = self.notifier.next_stamp();
        if let Err(e) = self.storage.set(REVISION_KEY, &stamp) {
            tracing::warn!("Failed to write change stamp: {e}");
        }
        self.notifier.notify();
    }
}

fn decode_sessions(raw: &str) -> Result<SessionMap, StoreError> {
    serde_json::from_str(raw).map_err(StoreError::CorruptPersistedState)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chatline_core::Role;

    use super::*;
    use crate::storage::MemoryStorage;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryStorage::new()), ChangeNotifier::new())
    }

    #[test]
    fn test_append_preserves_order() {
        let store = store();
        let id = SessionId::mint();

        for i in 0..5 {
            store.append_message(&id, Message::user(format!("m{i}"))).unwrap();
        }

        let contents: Vec<String> = store
            .lookup(&id)
            .into_messages()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, ["m0", "m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn test_absent_session() {
        let store = store();
        let lookup = store.lookup(&SessionId::from("missing"));
        assert!(lookup.is_absent());
        assert!(lookup.into_messages().is_empty());
    }

    #[test]
    fn test_load_is_idempotent() {
        let store = store();
        let id = SessionId::mint();
        store.append_message(&id, Message::user("hi")).unwrap();
        store.set_current_pointer(&id).unwrap();

        let first = store.load();
        let second = store.load();

        assert_eq!(first, second);
        assert_eq!(first.current, Some(id));
    }

    #[test]
    fn test_corrupt_sessions_read_as_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(SESSIONS_KEY, "{not json").unwrap();
        let store = SessionStore::new(storage, ChangeNotifier::new());

        assert!(store.load().sessions.is_empty());

        let id = SessionId::mint();
        store.append_message(&id, Message::user("recovered")).unwrap();
        assert_eq!(store.lookup(&id).into_messages().len(), 1);
    }

    #[test]
    fn test_wrong_shape_reads_as_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(SESSIONS_KEY, r#"{"1":[{"role":"robot"}]}"#).unwrap();
        let store = SessionStore::new(storage, ChangeNotifier::new());

        assert!(store.load().sessions.is_empty());
    }

    #[test]
    fn test_empty_pointer_is_unset() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(CURRENT_SESSION_KEY, "").unwrap();
        let store = SessionStore::new(storage, ChangeNotifier::new());

        assert_eq!(store.current_pointer(), None);
    }

    #[test]
    fn test_save_writes_changed_pointer() {
        let store = store();
        let id = SessionId::mint();
        let mut snapshot = store.load();
        snapshot.sessions.insert(id.clone(), vec![Message::user("a")]);
        snapshot.current = Some(id.clone());

        store.save(&snapshot).unwrap();

        assert_eq!(store.load(), snapshot);
        assert_eq!(store.current_pointer(), Some(id));
    }

    #[test]
    fn test_each_write_notifies_once() {
        let store = store();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let _sub = store.subscribe(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let id = SessionId::mint();
        store.append_message(&id, Message::user("a")).unwrap();
        store.set_current_pointer(&id).unwrap();
        store.save(&store.load()).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_persisted_layout() {
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone(), ChangeNotifier::new());
        let id = SessionId::from("1700000000000");

        store.append_message(&id, Message::assistant("Hi there")).unwrap();
        store.set_current_pointer(&id).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&storage.get(SESSIONS_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(raw["1700000000000"][0]["role"], "assistant");
        assert_eq!(raw["1700000000000"][0]["content"], "Hi there");
        assert_eq!(
            storage.get(CURRENT_SESSION_KEY).unwrap().as_deref(),
            Some("1700000000000")
        );
        assert_eq!(store.lookup(&id).into_messages()[0].role, Role::Assistant);

        let stamp = storage.get(REVISION_KEY).unwrap().unwrap();
        assert!(store.notifier().is_own_stamp(&stamp));
    }
}
