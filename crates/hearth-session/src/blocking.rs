//! The blocking-operation set consulted before suspension.
//!
//! Each entry names a reason suspension is currently disallowed: a
//! wait-for-method in flight, an active child process, an open
//! connection. Membership matters, not count — but the same name may be
//! registered from nested scopes, so entries are reference counted
//! internally and a name stays present until its last guard drops.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Set of named operations that forbid suspension while present.
#[derive(Debug, Default)]
pub struct BlockingOps {
    ops: Mutex<HashMap<String, usize>>,
}

impl BlockingOps {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`, holding it in the set until the guard drops.
    pub fn register(self: &Arc<Self>, name: impl Into<String>) -> BlockingOpGuard {
        let name = name.into();
        *self.ops.lock().entry(name.clone()).or_insert(0) += 1;
        BlockingOpGuard {
            ops: Arc::clone(self),
            name,
        }
    }

    /// Whether nothing blocks suspension.
    pub fn is_empty(&self) -> bool {
        self.ops.lock().is_empty()
    }

    /// Whether `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.ops.lock().contains_key(name)
    }

    /// Sorted names of every registered op.
    pub fn snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ops.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    fn release(&self, name: &str) {
        let mut ops = self.ops.lock();
        if let Some(count) = ops.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                let _ = ops.remove(name);
            }
        }
    }
}

/// RAII guard keeping a blocking op registered.
#[derive(Debug)]
pub struct BlockingOpGuard {
    ops: Arc<BlockingOps>,
    name: String,
}

impl BlockingOpGuard {
    /// The registered name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for BlockingOpGuard {
    fn drop(&mut self) {
        self.ops.release(&self.name);
    }
}
