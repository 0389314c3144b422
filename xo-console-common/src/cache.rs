//! Single-entry memo for derived view values
//!
//! Each dashboard and restore selector keeps its last result together with
//! the input key (usually a set of store revisions) it was computed from.
//! The value is recomputed only when the key changes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct MemoEntry<K, V> {
    key: K,
    value: V,
}

/// A thread-safe, cheaply cloneable memoized selector
#[derive(Debug, Clone)]
pub struct Memo<K, V> {
    entry: Arc<Mutex<Option<MemoEntry<K, V>>>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self {
            entry: Arc::new(Mutex::new(None)),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<K, V> Memo<K, V>
where
    K: PartialEq + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, or compute and store it
    pub fn get_or_compute(&self, key: &K, compute: impl FnOnce() -> V) -> V {
        if let Ok(entry) = self.entry.lock() {
            if let Some(entry) = entry.as_ref() {
                if entry.key == *key {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return entry.value.clone();
                }
            }
        }

        // Compute outside the lock
        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute();
        log::debug!("Recomputed memoized selector");

        if let Ok(mut entry) = self.entry.lock() {
            *entry = Some(MemoEntry {
                key: key.clone(),
                value: value.clone(),
            });
        }

        value
    }

    /// Drop the cached value so the next read recomputes
    pub fn invalidate(&self) {
        if let Ok(mut entry) = self.entry.lock() {
            *entry = None;
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
