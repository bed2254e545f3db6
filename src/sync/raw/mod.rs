//! Backing mutex and condition variable.
//!
//! Both backends expose the same surface: `RawMutex<T>`, `RawGuard<'_, T>`
//! and `RawCondvar` with `wait`, `wait_until`, `notify_one` and
//! `notify_all`. The `parking_lot` feature picks the implementation at build
//! time; signal gating lives one layer up and is written once.

#[cfg(feature = "parking_lot")]
mod parking;
#[cfg(feature = "parking_lot")]
pub(crate) use parking::{RawCondvar, RawGuard, RawMutex};

#[cfg(not(feature = "parking_lot"))]
mod std_sync;
#[cfg(not(feature = "parking_lot"))]
pub(crate) use std_sync::{RawCondvar, RawGuard, RawMutex};
