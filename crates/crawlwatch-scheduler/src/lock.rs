//! Per-key run-lock. At most one execution per task (or system job) at a
//! time; a second trigger while one is in flight is dropped, not queued.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct RunLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl RunLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `key`, or `None` if a run already holds it.
    pub fn try_acquire(&self, key: &str) -> Option<RunGuard> {
        if !lock_set(&self.held).insert(key.to_string()) {
            return None;
        }
        Some(RunGuard {
            key: key.to_string(),
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_held(&self, key: &str) -> bool {
        lock_set(&self.held).contains(key)
    }

    pub fn held_count(&self) -> usize {
        lock_set(&self.held).len()
    }
}

/// Releases its key on drop, including during unwinding.
#[derive(Debug)]
pub struct RunGuard {
    key: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl RunGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        lock_set(&self.held).remove(&self.key);
    }
}

// A poisoned set is still consistent: every mutation is a single insert/remove.
fn lock_set(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(|e| e.into_inner())
}
