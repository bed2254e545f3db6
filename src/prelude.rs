pub use crate::config::{WorkerConfig, WorkerConfigBuilder};
pub use crate::error::{Error, Result, SubmitError};
pub use crate::executor::{BackgroundWorker, PanicStrategy, Submitter, Task, WorkerState};
pub use crate::sync::{GuardedCondvar, GuardedLock, SignalGate};
pub use crate::timeout::Timeout;
