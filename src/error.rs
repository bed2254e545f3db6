use crate::executor::Task;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Shutdown has begun; no new work is accepted.
    #[error("worker queue is closed")]
    Closed,

    /// The queue could not grow to hold the task.
    #[error("could not allocate room for the task")]
    AllocationFailure,

    /// A signal handler interrupted this thread while it was mutating the
    /// queue, so the queue cannot be touched safely right now.
    #[error("queue is busy on this thread")]
    Busy,

    #[error("timed out waiting for the worker")]
    TimedOut,

    #[error("worker already started")]
    AlreadyStarted,

    #[error("config error: {0}")]
    Config(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }

    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Busy | Error::TimedOut | Error::AllocationFailure)
    }
}

/// A task the worker refused, handed back to the caller.
///
/// The caller owns the task again and decides what to do with it, usually
/// [`Task::discard`] to run its cleanup.
#[derive(Debug, thiserror::Error)]
#[error("task rejected: {reason}")]
pub struct SubmitError {
    task: Task,
    reason: Error,
}

impl SubmitError {
    pub(crate) fn new(task: Task, reason: Error) -> Self {
        Self { task, reason }
    }

    pub fn reason(&self) -> &Error {
        &self.reason
    }

    pub fn into_task(self) -> Task {
        self.task
    }

    /// Split into the task and the reason.
    pub fn into_parts(self) -> (Task, Error) {
        (self.task, self.reason)
    }
}
