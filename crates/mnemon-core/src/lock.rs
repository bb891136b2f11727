//! Per-agent lock registry.
//!
//! One mutex per agent id, allocated lazily on first use. The registry
//! guarantees that concurrent first-use allocation for the same new id
//! never produces two distinct locks (DashMap entry API), and a held lock
//! is never dropped out from under its holder (callers hold an `Arc`).

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Registry of per-agent mutexes.
///
/// The agent runtime holds the lock for the full load -> step -> persist
/// span, so at most one step executes per agent id at a time while
/// different agent ids proceed fully in parallel. The lock is not
/// reentrant: re-acquiring it for the same agent id from within a held
/// span deadlocks and is a programming error.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock for an agent id, allocating it on first use.
    ///
    /// Idempotent: repeated calls for the same id return handles to the
    /// same underlying mutex.
    pub fn get_lock(&self, agent_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(agent_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the registry's handle for an agent id (teardown after agent
    /// deletion). Outstanding holders keep their `Arc` alive.
    pub fn clear(&self, agent_id: Uuid) {
        self.locks.remove(&agent_id);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
