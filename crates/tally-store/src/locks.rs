//! Striped per-key locks.
//!
//! Keys hash onto a fixed set of mutexes. Two keys sharing a stripe are
//! serialized together, which is harmless; a key never maps to two stripes.
//! Callers must not acquire a second stripe while holding one.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Number of stripes used by [`KeyedLocks::default`].
pub const DEFAULT_STRIPES: usize = 64;

/// A fixed pool of mutexes indexed by key hash.
#[derive(Debug)]
pub struct KeyedLocks {
    stripes: Vec<Mutex<()>>,
}

impl KeyedLocks {
    /// Create a pool with `stripes` mutexes (at least one).
    #[must_use]
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Lock the stripe that owns `key`.
    ///
    /// Poisoned stripes are recovered; the guarded value is `()`.
    pub fn lock(&self, key: &[u8]) -> MutexGuard<'_, ()> {
        let stripe = &self.stripes[self.index(key)];
        stripe.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        // Truncation is fine: only the low bits select a stripe.
        #[allow(clippy::cast_possible_truncation)]
        let hash = hasher.finish() as usize;
        hash % self.stripes.len()
    }
}

impl Default for KeyedLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn same_key_same_stripe() {
        let locks = KeyedLocks::default();
        assert_eq!(locks.index(b"user-1"), locks.index(b"user-1"));
    }

    #[test]
    fn zero_stripes_still_works() {
        let locks = KeyedLocks::new(0);
        drop(locks.lock(b"anything"));
    }

    #[test]
    fn lock_serializes_read_modify_write() {
        let locks = Arc::new(KeyedLocks::default());
        let counter = Arc::new(Mutex::new(0_u32));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let _guard = locks.lock(b"shared");
                        let current = *counter.lock().unwrap();
                        *counter.lock().unwrap() = current + 1;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*counter.lock().unwrap(), 800);
    }
}
