//! Process-wide registry of in-flight generation streams.
//!
//! One service object is constructed at startup and injected into request
//! handlers; entries map a composite notebook/tab id to the cancellation
//! handle of the generation currently running under it. Nothing here is
//! persisted: after a restart an aborted-in-flight request simply runs to
//! completion.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Composite identifier for one generation stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub notebook_id: String,
    pub tab_id: String,
}

impl StreamKey {
    pub fn new(notebook_id: impl Into<String>, tab_id: impl Into<String>) -> Self {
        Self {
            notebook_id: notebook_id.into(),
            tab_id: tab_id.into(),
        }
    }
}

#[derive(Debug)]
struct StreamEntry {
    id: Uuid,
    token: CancellationToken,
}

/// Handle returned by [`StreamRegistry::register`]. The `id` ties the entry
/// to its creator so completion never evicts a successor registration.
#[derive(Debug, Clone)]
pub struct RegisteredStream {
    pub id: Uuid,
    pub token: CancellationToken,
}

#[derive(Debug, Default)]
pub struct StreamRegistry {
    entries: Mutex<HashMap<StreamKey, StreamEntry>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a fresh cancellation handle under `key`, replacing
    /// any prior entry. The displaced operation keeps running; it merely
    /// becomes unreachable for cancellation.
    pub fn register(&self, key: StreamKey) -> RegisteredStream {
        let entry = StreamEntry {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
        };
        let registered = RegisteredStream {
            id: entry.id,
            token: entry.token.clone(),
        };

        let mut entries = self.entries.lock().expect("stream registry lock poisoned");
        if entries.insert(key, entry).is_some() {
            tracing::debug!("replaced in-flight stream registration");
        }
        registered
    }

    /// Signal and remove the entry under `key`. Returns `false` when nothing
    /// is registered; "nothing to cancel" is a normal outcome, not an error.
    pub fn abort(&self, key: &StreamKey) -> bool {
        let removed = {
            let mut entries = self.entries.lock().expect("stream registry lock poisoned");
            entries.remove(key)
        };
        match removed {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Non-mutating read of the cancellation handle under `key`.
    pub fn lookup(&self, key: &StreamKey) -> Option<CancellationToken> {
        let entries = self.entries.lock().expect("stream registry lock poisoned");
        entries.get(key).map(|entry| entry.token.clone())
    }

    /// Remove the entry under `key` if it still belongs to the registration
    /// identified by `id`. Returns `true` when the entry was removed.
    pub fn complete(&self, key: &StreamKey, id: Uuid) -> bool {
        let mut entries = self.entries.lock().expect("stream registry lock poisoned");
        match entries.get(key) {
            Some(entry) if entry.id == id => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().expect("stream registry lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key() -> StreamKey {
        StreamKey::new("nb-1", "tab-1")
    }

    #[test]
    fn abort_without_entry_returns_false() {
        let registry = StreamRegistry::new();
        assert!(!registry.abort(&key()));
    }

    #[test]
    fn abort_signals_and_removes_exactly_once() {
        let registry = StreamRegistry::new();
        let registered = registry.register(key());
        assert!(!registered.token.is_cancelled());

        assert!(registry.abort(&key()));
        assert!(registered.token.is_cancelled());
        assert_eq!(registry.len(), 0);

        assert!(!registry.abort(&key()), "second abort finds nothing");
    }

    #[test]
    fn register_overwrites_without_cancelling_the_prior_stream() {
        let registry = StreamRegistry::new();
        let first = registry.register(key());
        let second = registry.register(key());

        assert!(
            !first.token.is_cancelled(),
            "displaced stream keeps running"
        );
        assert!(registry.abort(&key()));
        assert!(second.token.is_cancelled());
        assert!(
            !first.token.is_cancelled(),
            "abort only reaches the live registration"
        );
    }

    #[test]
    fn complete_only_removes_the_owning_registration() {
        let registry = StreamRegistry::new();
        let first = registry.register(key());
        let second = registry.register(key());

        assert!(
            !registry.complete(&key(), first.id),
            "stale completion must not evict the successor"
        );
        assert_eq!(registry.len(), 1);
        assert!(registry.complete(&key(), second.id));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn lookup_does_not_mutate() {
        let registry = StreamRegistry::new();
        assert!(registry.lookup(&key()).is_none());
        let registered = registry.register(key());
        let token = registry.lookup(&key()).expect("entry present");
        assert!(!token.is_cancelled());
        assert_eq!(registry.len(), 1);
        drop(registered);
        assert_eq!(registry.len(), 1, "dropping the handle keeps the entry");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_aborts_grant_true_to_at_most_one_caller() {
        for _ in 0..32 {
            let registry = Arc::new(StreamRegistry::new());
            registry.register(key());

            let mut handles = Vec::new();
            for _ in 0..8 {
                let registry = Arc::clone(&registry);
                handles.push(tokio::spawn(async move { registry.abort(&key()) }));
            }

            let mut winners = 0usize;
            for handle in handles {
                if handle.await.expect("abort task join") {
                    winners += 1;
                }
            }
            assert_eq!(winners, 1, "exactly one concurrent abort may win");
        }
    }
}
