//! Process-scoped registry for background sync operations.
//!
//! RULE: all mutation goes through this registry's methods — a single
//! writer path per operation id. Concurrently completing operations
//! contend on the lock, never on each other's entries.

use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Running,
    Finished,
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub label: &'static str,
    pub state: OperationState,
}

#[derive(Default)]
pub struct SyncProgress {
    operations: Mutex<HashMap<Uuid, Operation>>,
}

impl SyncProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, label: &'static str) -> Uuid {
        let id = Uuid::new_v4();
        let mut ops = self.lock();
        ops.insert(
            id,
            Operation {
                label,
                state: OperationState::Running,
            },
        );
        id
    }

    pub fn finish(&self, id: Uuid) {
        let mut ops = self.lock();
        if let Some(op) = ops.get_mut(&id) {
            op.state = OperationState::Finished;
        }
    }

    pub fn state(&self, id: Uuid) -> Option<OperationState> {
        self.lock().get(&id).map(|op| op.state)
    }

    pub fn running_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|op| op.state == OperationState::Running)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Operation>> {
        // A poisoned lock only means a panic mid-insert; the map itself
        // stays usable.
        self.operations.lock().unwrap_or_else(|e| e.into_inner())
    }
}
