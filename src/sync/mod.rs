//! Signal-handler-aware synchronization.
//!
//! [`SignalGate`] tracks whether a thread is inside a signal handler.
//! [`GuardedLock`] and [`GuardedCondvar`] consult it before every blocking
//! operation and skip the operation on the handling thread, trading a window
//! of possible inconsistency for never deadlocking during a crash.

mod condvar;
mod gate;
mod lock;
mod raw;

pub use condvar::GuardedCondvar;
pub use gate::{HandlerScope, SignalGate};
pub use lock::{GuardedLock, GuardedLockGuard};
