use super::task::TaskId;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

/// What the worker does when a task callback panics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PanicStrategy {
    /// Abort the process.
    Abort,
    /// Swallow the panic silently.
    Isolate,
    /// Log the panic and keep the worker running.
    #[default]
    LogAndContinue,
}

/// Which callback of a task was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStage {
    Execute,
    Cleanup,
}

impl TaskStage {
    fn as_str(self) -> &'static str {
        match self {
            TaskStage::Execute => "execute",
            TaskStage::Cleanup => "cleanup",
        }
    }
}

/// A panic caught in task code.
#[derive(Debug, Clone)]
pub struct TaskPanic {
    pub task: TaskId,
    pub stage: TaskStage,
    pub message: String,
}

impl fmt::Display for TaskPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task {} panicked in {}: {}",
            self.task.as_u64(),
            self.stage.as_str(),
            self.message
        )
    }
}

/// Keeps task panics from unwinding through the worker loop.
///
/// Both callbacks of a task go through [`contain`](Self::contain) separately,
/// so a panicking `execute` still gets its `cleanup`.
#[derive(Debug)]
pub struct PanicHandler {
    strategy: PanicStrategy,
    caught: AtomicUsize,
}

impl PanicHandler {
    pub fn new(strategy: PanicStrategy) -> Self {
        Self {
            strategy,
            caught: AtomicUsize::new(0),
        }
    }

    /// Run one callback of `task`, applying the strategy if it panics.
    pub fn contain<F, R>(&self, task: TaskId, stage: TaskStage, f: F) -> Result<R, TaskPanic>
    where
        F: FnOnce() -> R,
    {
        let payload = match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => return Ok(value),
            Err(payload) => payload,
        };
        self.caught.fetch_add(1, Ordering::Relaxed);

        let panic = TaskPanic {
            task,
            stage,
            message: payload_message(payload.as_ref()),
        };
        match self.strategy {
            PanicStrategy::Abort => {
                tracing::error!(
                    task_id = task.as_u64(),
                    stage = stage.as_str(),
                    message = %panic.message,
                    "task panicked, aborting"
                );
                std::process::abort();
            }
            PanicStrategy::Isolate => {}
            PanicStrategy::LogAndContinue => {
                tracing::error!(
                    task_id = task.as_u64(),
                    stage = stage.as_str(),
                    message = %panic.message,
                    "task panicked"
                );
            }
        }
        Err(panic)
    }

    /// Panics caught so far, across both stages.
    pub fn panic_count(&self) -> usize {
        self.caught.load(Ordering::Relaxed)
    }

    pub fn strategy(&self) -> PanicStrategy {
        self.strategy
    }
}

impl Default for PanicHandler {
    fn default() -> Self {
        Self::new(PanicStrategy::default())
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
