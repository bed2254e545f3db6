//! Task representation and execution.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Global task ID counter
static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Execute-then-cleanup pair over owned data.
trait Body: Send {
    fn execute(&mut self);
    fn cleanup(self: Box<Self>);
}

struct Callbacks<T, E, C> {
    data: T,
    execute: Option<E>,
    cleanup: C,
}

impl<T, E, C> Body for Callbacks<T, E, C>
where
    T: Send,
    E: FnOnce(&mut T) + Send,
    C: FnOnce(T) + Send,
{
    fn execute(&mut self) {
        if let Some(f) = self.execute.take() {
            f(&mut self.data);
        }
    }

    fn cleanup(self: Box<Self>) {
        let this = *self;
        (this.cleanup)(this.data);
    }
}

/// A unit of deferred work: an execution step, a cleanup step, and the data
/// both operate on.
///
/// The task owns its data. Execution borrows it; cleanup consumes it, so once
/// cleanup has run nothing refers to the data any more. Cleanup always runs
/// exactly once, whether the task executed, panicked, or was discarded.
pub struct Task {
    id: TaskId,
    body: Box<dyn Body>,
    spawn_time: Instant,
}

impl Task {
    /// A task with nothing to clean up.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::with_cleanup(
            Some(f),
            |slot: &mut Option<F>| {
                if let Some(f) = slot.take() {
                    f();
                }
            },
            |_| {},
        )
    }

    /// A task from an execution function, a cleanup function and their data.
    pub fn with_cleanup<T, E, C>(data: T, execute: E, cleanup: C) -> Self
    where
        T: Send + 'static,
        E: FnOnce(&mut T) + Send + 'static,
        C: FnOnce(T) + Send + 'static,
    {
        Task {
            id: TaskId::next(),
            body: Box::new(Callbacks {
                data,
                execute: Some(execute),
                cleanup,
            }),
            spawn_time: Instant::now(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// When the task was created.
    pub fn spawn_time(&self) -> Instant {
        self.spawn_time
    }

    /// Run cleanup without executing.
    pub fn discard(self) {
        self.body.cleanup();
    }

    pub(crate) fn into_parts(self) -> (TaskId, Runnable) {
        (self.id, Runnable { body: self.body })
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("spawn_time", &self.spawn_time)
            .finish()
    }
}

/// The body of a dequeued task, split so the two steps can run separately.
pub(crate) struct Runnable {
    body: Box<dyn Body>,
}

impl Runnable {
    pub(crate) fn execute(&mut self) {
        self.body.execute();
    }

    pub(crate) fn cleanup(self) {
        self.body.cleanup();
    }
}
