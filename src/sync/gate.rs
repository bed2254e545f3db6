//! Signal-handler nesting gate.
//!
//! On unix a signal handler can interrupt a thread anywhere, including while
//! that thread holds one of our locks. If the handler then tried to take the
//! same lock it would wait for itself forever and the process would hang
//! while crashing. The gate tracks whether a handler is running and on which
//! thread:
//!
//! - the handling thread skips every blocking primitive and touches guarded
//!   state without the lock,
//! - every other thread waits for the handler to leave before blocking.
//!
//! Skipping the lock means the handler may observe or produce a torn state.
//! That is accepted: the process is going down, and never deadlocking matters
//! more than perfect consistency. State reachable from a handler is kept
//! tolerant of this.

use crate::util::{current_token, Backoff};
use std::sync::atomic::{AtomicUsize, Ordering};

// Thread tokens are never zero.
const NO_HANDLER: usize = 0;

/// Process-wide signal-handler nesting counter.
///
/// Create one at library start, share it (usually as `Arc<SignalGate>`) with
/// every [`GuardedLock`](super::GuardedLock) that a handler may reach, and
/// bracket handler code with [`enter_signal_handler`] and
/// [`leave_signal_handler`] (or [`enter`]). [`reset`] is for full teardown.
///
/// [`enter_signal_handler`]: SignalGate::enter_signal_handler
/// [`leave_signal_handler`]: SignalGate::leave_signal_handler
/// [`enter`]: SignalGate::enter
/// [`reset`]: SignalGate::reset
#[derive(Debug)]
pub struct SignalGate {
    depth: AtomicUsize,
    handler_thread: AtomicUsize,
}

impl SignalGate {
    /// Create a gate with nobody inside a handler.
    pub const fn new() -> Self {
        Self {
            depth: AtomicUsize::new(0),
            handler_thread: AtomicUsize::new(NO_HANDLER),
        }
    }

    /// Mark the calling thread as running a signal handler.
    ///
    /// Nested entries on the same thread only deepen the count. If another
    /// thread is inside a handler, this backs off until it has left, so only
    /// one thread at a time is ever the handling thread.
    ///
    /// Async-signal-safe: no allocation, no locking.
    pub fn enter_signal_handler(&self) {
        let me = current_token();
        let backoff = Backoff::new();
        loop {
            match self
                .handler_thread
                .compare_exchange(NO_HANDLER, me, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(owner) if owner == me => break,
                Err(_) => backoff.snooze(),
            }
        }
        self.depth.fetch_add(1, Ordering::AcqRel);
    }

    /// Undo one [`enter_signal_handler`](Self::enter_signal_handler).
    ///
    /// Async-signal-safe. A call from a thread that is not inside the
    /// handler, or one without a matching enter, is ignored.
    pub fn leave_signal_handler(&self) {
        if self.handler_thread.load(Ordering::Acquire) != current_token() {
            return;
        }
        let left = self
            .depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| d.checked_sub(1));
        if left == Ok(1) {
            self.handler_thread.store(NO_HANDLER, Ordering::Release);
        }
    }

    /// Enter handler context until the returned scope is dropped.
    pub fn enter(&self) -> HandlerScope<'_> {
        self.enter_signal_handler();
        HandlerScope { gate: self }
    }

    /// Whether the caller may perform a blocking operation.
    ///
    /// Returns `false` on the thread currently inside a signal handler. Any
    /// other thread backs off while a handler is active and returns `true`
    /// once it has left.
    pub fn block_for_signal_handler(&self) -> bool {
        let me = current_token();
        let backoff = Backoff::new();
        loop {
            match self.handler_thread.load(Ordering::Acquire) {
                NO_HANDLER => return true,
                owner if owner == me => return false,
                _ => backoff.snooze(),
            }
        }
    }

    /// Whether the calling thread is the one inside a signal handler.
    ///
    /// Never blocks.
    pub fn in_signal_handler(&self) -> bool {
        self.handler_thread.load(Ordering::Acquire) == current_token()
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Forget all handler state. Only for teardown.
    pub fn reset(&self) {
        self.handler_thread.store(NO_HANDLER, Ordering::Release);
        self.depth.store(0, Ordering::Release);
    }
}

impl Default for SignalGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Leaves signal-handler context on drop.
#[derive(Debug)]
#[must_use = "dropping the scope leaves the signal handler immediately"]
pub struct HandlerScope<'a> {
    gate: &'a SignalGate,
}

impl Drop for HandlerScope<'_> {
    fn drop(&mut self) {
        self.gate.leave_signal_handler();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_blocks_outside_handler() {
        let gate = SignalGate::new();
        assert!(gate.block_for_signal_handler());
        assert!(!gate.in_signal_handler());
    }

    #[test]
    fn test_nesting() {
        let gate = SignalGate::new();

        gate.enter_signal_handler();
        gate.enter_signal_handler();
        assert_eq!(gate.depth(), 2);
        assert!(!gate.block_for_signal_handler());

        gate.leave_signal_handler();
        assert!(!gate.block_for_signal_handler());

        gate.leave_signal_handler();
        assert!(gate.block_for_signal_handler());
    }

    #[test]
    fn test_unbalanced_leave_is_ignored() {
        let gate = SignalGate::new();
        gate.leave_signal_handler();
        assert_eq!(gate.depth(), 0);
        assert!(gate.block_for_signal_handler());
    }

    #[test]
    fn test_scope_leaves_on_drop() {
        let gate = SignalGate::new();
        {
            let _scope = gate.enter();
            assert!(gate.in_signal_handler());
        }
        assert_eq!(gate.depth(), 0);
    }

    #[test]
    fn test_other_threads_wait_for_handler() {
        let gate = Arc::new(SignalGate::new());
        let passed = Arc::new(AtomicBool::new(false));

        gate.enter_signal_handler();

        let waiter = {
            let gate = gate.clone();
            let passed = passed.clone();
            thread::spawn(move || {
                let allowed = gate.block_for_signal_handler();
                passed.store(true, Ordering::SeqCst);
                allowed
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!passed.load(Ordering::SeqCst));

        gate.leave_signal_handler();
        assert!(waiter.join().unwrap());
        assert!(passed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_concurrent_handlers_take_turns() {
        let gate = Arc::new(SignalGate::new());
        let entered = Arc::new(AtomicBool::new(false));

        gate.enter_signal_handler();

        let second = {
            let gate = gate.clone();
            let entered = entered.clone();
            thread::spawn(move || {
                gate.enter_signal_handler();
                entered.store(true, Ordering::SeqCst);
                let skipped = !gate.block_for_signal_handler();
                gate.leave_signal_handler();
                skipped
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!entered.load(Ordering::SeqCst));

        // Still the handling thread while the other one waits to enter.
        let start = Instant::now();
        assert!(gate.in_signal_handler());
        assert!(!gate.block_for_signal_handler());
        assert!(start.elapsed() < Duration::from_secs(1));

        gate.leave_signal_handler();
        assert!(second.join().unwrap());
        assert!(entered.load(Ordering::SeqCst));
        assert_eq!(gate.depth(), 0);
        assert!(gate.block_for_signal_handler());
    }

    #[test]
    fn test_leave_from_other_thread_is_ignored() {
        let gate = Arc::new(SignalGate::new());
        gate.enter_signal_handler();

        let other = gate.clone();
        thread::spawn(move || other.leave_signal_handler())
            .join()
            .unwrap();

        assert_eq!(gate.depth(), 1);
        assert!(gate.in_signal_handler());
        gate.leave_signal_handler();
        assert_eq!(gate.depth(), 0);
    }

    #[test]
    fn test_reset() {
        let gate = SignalGate::new();
        gate.enter_signal_handler();
        gate.reset();

        let start = Instant::now();
        assert!(gate.block_for_signal_handler());
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
