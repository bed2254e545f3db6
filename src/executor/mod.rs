//! Task execution infrastructure.
//!
//! A [`BackgroundWorker`] owns one thread and a [`TaskQueue`] guarded by a
//! signal-gated lock. Producers submit [`Task`]s without waiting; the thread
//! runs each task's execution step and then its cleanup step, outside the
//! lock, in submission order.

pub mod panic_handler;
pub mod queue;
pub mod task;
pub mod worker;

pub use panic_handler::{PanicHandler, PanicStrategy, TaskPanic, TaskStage};
pub use queue::TaskQueue;
pub use task::{Task, TaskId};
pub use worker::{BackgroundWorker, Submitter, WorkerState, WorkerStats};
