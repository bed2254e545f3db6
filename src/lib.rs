//! bgworker - background task execution for crash reporting clients
//!
//! A single-thread background executor for deferred telemetry work (event
//! delivery, file cleanup), built on a locking discipline that stays usable
//! from inside a signal handler while the process is crashing.
//!
//! # Quick Start
//!
//! ```no_run
//! use bgworker::prelude::*;
//! use std::sync::Arc;
//!
//! // One gate per process; the crash handler brackets itself with it.
//! let gate = Arc::new(SignalGate::new());
//!
//! let worker = BackgroundWorker::new(gate.clone());
//! worker.start().unwrap();
//!
//! worker
//!     .submit(
//!         |payload: &mut Vec<u8>| println!("sending {} bytes", payload.len()),
//!         |payload| drop(payload),
//!         vec![0u8; 128],
//!     )
//!     .unwrap();
//!
//! worker.shutdown(Timeout::from_millis(2000)).unwrap();
//! ```
//!
//! # Signal handlers
//!
//! Wrap any code running inside a signal handler in
//! [`SignalGate::enter_signal_handler`] / [`SignalGate::leave_signal_handler`].
//! While inside, locks sharing that gate are skipped instead of acquired on
//! the handling thread, and other threads wait for the handler to leave.
//! This favors never deadlocking over strict consistency; see [`sync`].
//!
//! # Features
//!
//! - **Recursive, signal-gated locking**: [`GuardedLock`] and [`GuardedCondvar`]
//! - **FIFO execution**: tasks run in global submission order
//! - **Owned task data**: cleanup always runs exactly once, even on rejection
//! - **Bounded shutdown**: drain and join with a [`Timeout`]
//! - **Backends**: `parking_lot` (default feature) or `std::sync`

#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod sync;
pub mod timeout;
pub mod util;

pub use config::{WorkerConfig, WorkerConfigBuilder};
pub use error::{Error, Result, SubmitError};
pub use executor::{BackgroundWorker, PanicStrategy, Submitter, Task, WorkerState, WorkerStats};
pub use sync::{GuardedCondvar, GuardedLock, GuardedLockGuard, HandlerScope, SignalGate};
pub use timeout::Timeout;
