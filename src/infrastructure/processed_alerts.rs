//! Dedup store for alert ids the auto-trader has already consumed.
//!
//! The id set is bounded and survives restarts through a pluggable
//! persistence port, so a crash never replays old alerts into new trades.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing::warn;

/// Persistence port for the processed-id set.
pub trait ProcessedAlertStore: Send + Sync {
    /// Previously saved ids, oldest first. Missing or corrupt storage reads
    /// as empty.
    fn load(&self) -> Vec<String>;
    /// Persist the full id set, oldest first.
    fn save(&self, ids: &[String]);
}

/// JSON file storage for processed ids.
pub struct FileAlertStore {
    path: PathBuf,
}

impl FileAlertStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileAlertStore { path: path.into() }
    }
}

impl ProcessedAlertStore for FileAlertStore {
    fn load(&self) -> Vec<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Ignoring corrupt processed-alerts file");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }

    fn save(&self, ids: &[String]) {
        match serde_json::to_string(ids) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    warn!(path = %self.path.display(), error = %e, "Failed to persist processed alerts");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize processed alerts"),
        }
    }
}

/// Bounded set of consumed alert ids with write-through persistence. When
/// full, the least recently seen id is evicted first.
pub struct ProcessedAlerts {
    ids: LruCache<String, ()>,
    store: Box<dyn ProcessedAlertStore>,
}

impl ProcessedAlerts {
    pub fn new(capacity: usize, store: Box<dyn ProcessedAlertStore>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        let mut ids = LruCache::new(capacity);
        for id in store.load() {
            ids.put(id, ());
        }
        ProcessedAlerts { ids, store }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.peek(id).is_some()
    }

    /// Record an id as processed. Returns false when it was already known.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.ids.put(id.to_string(), ());
        self.store.save(&self.snapshot());
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids oldest first, matching the storage order.
    fn snapshot(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.ids.iter().map(|(id, _)| id.clone()).collect();
        ids.reverse();
        ids
    }
}
