use std::collections::HashSet;
use std::sync::Mutex;

/// Run-scoped membership set shared across in-flight tasks.
///
/// One instance tracks detail URLs already fetched, another tracks
/// canonical phones already emitted. Nothing is persisted; cross-run
/// dedup is the job of the unique key on `leads.phone`.
#[derive(Debug, Default)]
pub struct SeenSet {
    inner: Mutex<HashSet<String>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically record `key`; true when this is its first sighting.
    pub fn insert(&self, key: &str) -> bool {
        self.inner.lock().unwrap().insert(key.to_string())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Tests ──
