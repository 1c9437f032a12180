//! Per-project write serialization.

use dashmap::DashMap;
use lattice_core::ProjectId;
use parking_lot::Mutex;
use std::sync::Arc;

/// One mutex per project. Builds and updates hold their project's lock
/// from version allocation until commit or discard; other projects are
/// unaffected.
#[derive(Debug, Default)]
pub struct ProjectLocks {
    locks: DashMap<ProjectId, Arc<Mutex<()>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the project's lock.
    pub fn with_lock<T>(&self, project_id: &ProjectId, f: impl FnOnce() -> T) -> T {
        // Clone out of the shard before blocking so other projects stay free
        let lock = Arc::clone(self.locks.entry(project_id.clone()).or_default().value());
        let _guard = lock.lock();
        f()
    }
}
