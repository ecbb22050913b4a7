use crate::Value;
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

type CacheKey = (&'static str, String);

struct CacheEntry {
    rows: Vec<Vec<Value>>,
    expires_at: Instant,
}

/// Time expiring results, keyed by entity type and statement signature.
///
/// The lock is taken only to read or write an entry, never across a backend call.
/// Concurrent misses on the same key both query the backend, the last write wins.
#[derive(Default)]
pub struct ResultCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Default::default()
    }

    /// Value slots of the rows stored under the key, `None` when missing or stale.
    pub fn get(&self, entity: &'static str, signature: &str) -> Option<Vec<Vec<Value>>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (entity, signature.to_string());
        match entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.rows.clone()),
            Some(..) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn set(
        &self,
        entity: &'static str,
        signature: String,
        rows: Vec<Vec<Value>>,
        expiry: Duration,
    ) {
        let entry = CacheEntry {
            rows,
            expires_at: Instant::now() + expiry,
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((entity, signature), entry);
    }

    /// Drops every entry of `entity`.
    pub fn invalidate(&self, entity: &'static str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(v, _), _| *v != entity);
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
