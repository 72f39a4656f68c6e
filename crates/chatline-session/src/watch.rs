//! Change relay between contexts that share storage but not memory.
//!
//! Every store write leaves a stamp under [`REVISION_KEY`]. A watcher polls
//! that entry and re-broadcasts through its own notifier whenever the stamp
//! was written by another context.

use std::time::Duration;

use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::store::{REVISION_KEY, SessionStore};

/// Default polling period of [`SessionStore::watch_external`].
pub const DEFAULT_WATCH_PERIOD: Duration = Duration::from_millis(500);

/// Running watcher. Dropping it stops the relay.
#[derive(Debug)]
#[must_use = "dropping an ExternalWatch stops relaying changes"]
pub struct ExternalWatch {
    task: JoinHandle<()>,
}

impl ExternalWatch {
    /// Stop relaying. Equivalent to dropping the watch.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for ExternalWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl SessionStore {
    /// Relay changes made by other contexts to this store's subscribers.
    ///
    /// Polls the change stamp every `period`. Changes this context made
    /// itself were already announced and are not repeated. Several foreign
    /// writes within one period collapse into one signal. Must be called
    /// inside a tokio runtime.
    pub fn watch_external(&self, period: Duration) -> ExternalWatch {
        let store = self.handle();
        let mut seen = store.revision();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let current = store.revision();
                if current == seen {
                    continue;
                }

                let foreign = current
                    .as_deref()
                    .is_none_or(|stamp| !store.notifier().is_own_stamp(stamp));
                if foreign {
                    tracing::debug!(key = REVISION_KEY, "relaying change from another context");
                    store.notifier().notify();
                }
                seen = current;
            }
        });

        ExternalWatch { task }
    }
}
