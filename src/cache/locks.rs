//! Per-key mutual exclusion for the optional locked analysis path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::cache::entry::CacheKey;

/// A set of mutexes keyed by [`CacheKey`].
///
/// Slots are created on first use and dropped again once no caller holds
/// or waits on them, so the map only grows with the number of keys being
/// worked on concurrently.
#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    slots: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    /// Run `f` while holding the lock for `key`.
    pub(crate) fn with_lock<T>(&self, key: &CacheKey, f: impl FnOnce() -> T) -> T {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let out = {
            let _held = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map plus ours means nobody else is queued.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(key);
        }
        out
    }

    #[cfg(test)]
    fn active(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
