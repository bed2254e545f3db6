//! Condition variable paired with a [`GuardedLock`].

use super::lock::GuardedLockGuard;
use super::raw::RawCondvar;
use crate::timeout::Timeout;
use crate::util::current_token;
use std::time::Instant;

/// Condition variable that waits on a [`GuardedLock`](super::GuardedLock).
///
/// Waiting fully releases the recursive lock, however deep, and restores the
/// same depth before returning. A wait inside a signal handler, or on a guard
/// whose acquisition was skipped, returns immediately. Wakeups may be
/// spurious; re-check the predicate in a loop.
///
/// A condvar must only ever be used with one lock.
#[derive(Debug, Default)]
pub struct GuardedCondvar {
    inner: RawCondvar,
}

impl GuardedCondvar {
    pub const fn new() -> Self {
        Self {
            inner: RawCondvar::new(),
        }
    }

    /// Block until notified.
    pub fn wait<T>(&self, guard: &mut GuardedLockGuard<'_, T>) {
        self.park(guard, None);
    }

    /// Block until notified or `deadline` passes. Returns `true` on timeout.
    pub fn wait_until<T>(&self, guard: &mut GuardedLockGuard<'_, T>, deadline: Instant) -> bool {
        self.park(guard, Some(deadline))
    }

    /// Block until notified or `timeout` elapses. Returns `true` on timeout.
    pub fn wait_timeout<T>(&self, guard: &mut GuardedLockGuard<'_, T>, timeout: Timeout) -> bool {
        self.park(guard, timeout.deadline())
    }

    /// Wake one waiter. Never blocks, so it is not gated.
    pub fn notify_one(&self) {
        self.inner.notify_one();
    }

    /// Wake all waiters.
    pub fn notify_all(&self) {
        self.inner.notify_all();
    }

    fn park<T>(&self, guard: &mut GuardedLockGuard<'_, T>, deadline: Option<Instant>) -> bool {
        let lock = guard.lock;
        if !guard.acquired || !lock.gate().block_for_signal_handler() {
            return false;
        }

        let me = current_token();
        let mut own = lock.raw.lock();
        let depth = own.depth;
        own.owner = 0;
        own.depth = 0;
        lock.released.notify_one();

        let timed_out = match deadline {
            Some(deadline) => self.inner.wait_until(&mut own, deadline),
            None => {
                self.inner.wait(&mut own);
                false
            }
        };

        while own.depth > 0 {
            lock.released.wait(&mut own);
        }
        own.owner = me;
        own.depth = depth;

        timed_out
    }
}
