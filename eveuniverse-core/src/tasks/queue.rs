//! In-process priority queue implementing [`AsyncExecutor`].

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use super::{AsyncExecutor, ExecutorError, UnitOfWork};

/// Pending units ordered by priority, first-in first-out within a priority.
#[derive(Debug, Default)]
pub struct TaskQueue {
    pending: RefCell<BTreeMap<(u8, u64), UnitOfWork>>,
    sequence: Cell<u64>,
}

impl TaskQueue {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return the next unit to run.
    pub fn pop(&self) -> Option<UnitOfWork> {
        self.pending
            .borrow_mut()
            .pop_first()
            .map(|(_, unit)| unit)
    }

    /// Number of pending units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Pending units in run order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<UnitOfWork> {
        self.pending.borrow().values().cloned().collect()
    }
}

impl AsyncExecutor for TaskQueue {
    fn enqueue(&self, unit: UnitOfWork) -> Result<(), ExecutorError> {
        let sequence = self.sequence.get();
        self.sequence.set(sequence.wrapping_add(1));
        self.pending
            .borrow_mut()
            .insert((unit.priority, sequence), unit);
        Ok(())
    }
}
