//! Named advisory locks giving background tasks at-most-once semantics.

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::store::StoreError;

/// A named lock held for a bounded time.
pub trait AdvisoryLock {
    /// Take `key` for `ttl`; `false` when another holder still owns it.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backing store fails.
    fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Give `key` back. Releasing a free key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backing store fails.
    fn release(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local lock table.
#[derive(Debug, Default)]
pub struct MemoryLock {
    held: RefCell<HashMap<String, Instant>>,
}

impl MemoryLock {
    /// An empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is currently held.
    #[must_use]
    pub fn is_held(&self, key: &str) -> bool {
        self.held
            .borrow()
            .get(key)
            .is_some_and(|expires| *expires > Instant::now())
    }
}

impl AdvisoryLock for MemoryLock {
    fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut held = self.held.borrow_mut();
        if held.get(key).is_some_and(|expires| *expires > now) {
            return Ok(false);
        }
        held.insert(key.to_owned(), now + ttl);
        Ok(true)
    }

    fn release(&self, key: &str) -> Result<(), StoreError> {
        self.held.borrow_mut().remove(key);
        Ok(())
    }
}
