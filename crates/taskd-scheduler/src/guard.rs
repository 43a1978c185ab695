//! Per-task mutual exclusion for executions.
//!
//! At most one execution of a given task may be in flight. A slot is taken
//! with [`ExecutionGuard::try_acquire`] and released when the returned
//! [`RunningPermit`] is dropped, so every exit path of an execution
//! (success, failure, timeout, panic) frees it.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use taskd_core::TaskId;
use tracing::debug;

#[derive(Debug, Default)]
struct Slots {
    /// Task id → generation of the permit currently holding it.
    held: HashMap<TaskId, u64>,
    next_generation: u64,
}

/// Shared set of task ids that are currently executing.
#[derive(Debug, Clone, Default)]
pub struct ExecutionGuard {
    slots: Arc<Mutex<Slots>>,
}

impl ExecutionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `id`. Returns `None` if an execution already holds it.
    pub fn try_acquire(&self, id: &TaskId) -> Option<RunningPermit> {
        let mut slots = self.lock();
        if slots.held.contains_key(id) {
            return None;
        }
        slots.next_generation += 1;
        let generation = slots.next_generation;
        slots.held.insert(id.clone(), generation);
        Some(RunningPermit {
            slots: Arc::clone(&self.slots),
            id: id.clone(),
            generation,
        })
    }

    pub fn is_running(&self, id: &TaskId) -> bool {
        self.lock().held.contains_key(id)
    }

    pub fn running_count(&self) -> usize {
        self.lock().held.len()
    }

    /// Ids of all executing tasks, sorted.
    pub fn running_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.lock().held.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Forget every slot. Permits that are still alive become inert: dropping
    /// them later will not free a slot re-acquired in the meantime.
    pub fn clear(&self) {
        self.lock().held.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof that the holder owns a task's execution slot.
#[derive(Debug)]
pub struct RunningPermit {
    slots: Arc<Mutex<Slots>>,
    id: TaskId,
    generation: u64,
}

impl RunningPermit {
    pub fn task_id(&self) -> &TaskId {
        &self.id
    }
}

impl Drop for RunningPermit {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.held.get(&self.id) == Some(&self.generation) {
            slots.held.remove(&self.id);
            debug!(task_id = %self.id, "execution slot released");
        }
    }
}
