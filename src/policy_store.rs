//! The Policy Store: an in-process cache of the three policy kinds,
//! refreshed by cluster change notifications and read by every
//! reconciliation through a single atomically-published snapshot.
//!
//! Grounded in the teacher's `Store = Arc<RwLock<HashMap<...>>>` idiom
//! (`resources/src/controller.rs`), generalized: rather than one flat map,
//! the three collections are composed into a single `Snapshot` so readers
//! never observe a torn view across GlobalConfig/Override/Ignore.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::objects::{GlobalConfig, Ignore, Object, Override};

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub global: GlobalConfig,
    pub overrides: Vec<Override>,
    pub ignores: Vec<Ignore>,
}

pub struct PolicyStore {
    inner: RwLock<Arc<Snapshot>>,
}

impl PolicyStore {
    /// GlobalConfig defaults to `{percentage: 100, min: 1, max: 100}` until
    /// the first successful load.
    pub fn new() -> Self {
        PolicyStore {
            inner: RwLock::new(Arc::new(Snapshot {
                global: GlobalConfig::default(),
                overrides: Vec::new(),
                ignores: Vec::new(),
            })),
        }
    }

    /// Lock-free-ish read: cloning an `Arc<Snapshot>` is a pointer bump, not a
    /// deep copy. Writers never mutate a published snapshot in place; they
    /// build a new one and swap it in.
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.read().await.clone()
    }

    /// Replace the GlobalConfig document. A failed load must never reach
    /// here — callers keep the previous snapshot by simply not calling this.
    pub async fn publish_global(&self, global: GlobalConfig) {
        let mut guard = self.inner.write().await;
        let previous = guard.clone();
        *guard = Arc::new(Snapshot {
            global,
            overrides: previous.overrides.clone(),
            ignores: previous.ignores.clone(),
        });
    }

    pub async fn upsert_override(&self, updated: Override) {
        let mut guard = self.inner.write().await;
        let previous = guard.clone();
        let mut overrides = previous.overrides.clone();
        let key = updated.key();
        match overrides.iter_mut().find(|o| o.key() == key) {
            Some(slot) => *slot = updated,
            None => overrides.push(updated),
        }
        *guard = Arc::new(Snapshot {
            global: previous.global,
            overrides,
            ignores: previous.ignores.clone(),
        });
    }

    pub async fn remove_override(&self, key: &str) {
        let mut guard = self.inner.write().await;
        let previous = guard.clone();
        let overrides = previous.overrides.iter().filter(|o| o.key() != key).cloned().collect();
        *guard = Arc::new(Snapshot {
            global: previous.global,
            overrides,
            ignores: previous.ignores.clone(),
        });
    }

    pub async fn upsert_ignore(&self, updated: Ignore) {
        let mut guard = self.inner.write().await;
        let previous = guard.clone();
        let mut ignores = previous.ignores.clone();
        let key = updated.key();
        match ignores.iter_mut().find(|i| i.key() == key) {
            Some(slot) => *slot = updated,
            None => ignores.push(updated),
        }
        *guard = Arc::new(Snapshot {
            global: previous.global,
            overrides: previous.overrides.clone(),
            ignores,
        });
    }

    pub async fn remove_ignore(&self, key: &str) {
        let mut guard = self.inner.write().await;
        let previous = guard.clone();
        let ignores = previous.ignores.iter().filter(|i| i.key() != key).cloned().collect();
        *guard = Arc::new(Snapshot {
            global: previous.global,
            overrides: previous.overrides.clone(),
            ignores,
        });
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}
