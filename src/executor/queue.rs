//! FIFO of pending tasks.

use super::task::Task;
use std::collections::VecDeque;

/// Pending tasks in submission order.
///
/// The worker keeps its queue inside a [`GuardedLock`](crate::sync::GuardedLock),
/// so every method here already runs under the lock. Tasks leave only from
/// the front.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            tasks: VecDeque::new(),
        }
    }

    /// Append a task. On allocation failure the task is handed back.
    pub fn push_back(&mut self, task: Task) -> Result<(), Task> {
        if self.tasks.try_reserve(1).is_err() {
            return Err(task);
        }
        self.tasks.push_back(task);
        Ok(())
    }

    /// Remove the oldest task, `None` when empty.
    pub fn pop_front(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    /// Number of pending tasks. Diagnostics only; never wait on it.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Take every pending task, oldest first, leaving the queue empty.
    pub(crate) fn take_all(&mut self) -> VecDeque<Task> {
        std::mem::take(&mut self.tasks)
    }
}

impl Drop for TaskQueue {
    // Tasks still queued here will never execute; their cleanup must still run.
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.discard();
        }
    }
}
