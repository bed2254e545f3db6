//! Recursive, signal-gated mutual exclusion.

use super::gate::SignalGate;
use super::raw::{RawCondvar, RawMutex};
use crate::util::current_token;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

#[derive(Debug, Default)]
pub(super) struct Ownership {
    pub(super) owner: usize,
    pub(super) depth: usize,
}

/// A recursive lock that steps aside inside signal handlers.
///
/// The owning thread may lock again without deadlocking; the lock is released
/// when the outermost guard drops. Before blocking, every operation asks the
/// [`SignalGate`]. On the thread running a signal handler the acquisition is
/// skipped and the guard hands out the data unlocked.
///
/// Like a reentrant mutex, the guard only gives shared access. Put mutable
/// state behind a `RefCell` (or atomics) and keep borrows short.
pub struct GuardedLock<T> {
    gate: Arc<SignalGate>,
    pub(super) raw: RawMutex<Ownership>,
    pub(super) released: RawCondvar,
    data: T,
}

// SAFETY: access to `data` is serialized by `raw` except on the thread inside
// a signal handler, which is the documented trade-off of this type.
unsafe impl<T: Send> Sync for GuardedLock<T> {}

impl<T> GuardedLock<T> {
    /// Wrap `data`, consulting `gate` before every blocking operation.
    pub fn new(gate: Arc<SignalGate>, data: T) -> Self {
        Self {
            gate,
            raw: RawMutex::new(Ownership::default()),
            released: RawCondvar::new(),
            data,
        }
    }

    /// Acquire the lock, re-entering if this thread already holds it.
    ///
    /// Inside a signal handler this returns at once without acquiring.
    pub fn lock(&self) -> GuardedLockGuard<'_, T> {
        let acquired = self.gate.block_for_signal_handler();
        if acquired {
            self.acquire();
        }
        GuardedLockGuard {
            lock: self,
            acquired,
            _not_send: PhantomData,
        }
    }

    /// Acquire only if no other thread holds the lock.
    ///
    /// Inside a signal handler this always succeeds without acquiring.
    pub fn try_lock(&self) -> Option<GuardedLockGuard<'_, T>> {
        if !self.gate.block_for_signal_handler() {
            return Some(GuardedLockGuard {
                lock: self,
                acquired: false,
                _not_send: PhantomData,
            });
        }

        let me = current_token();
        let mut own = self.raw.lock();
        if own.depth > 0 && own.owner != me {
            return None;
        }
        own.owner = me;
        own.depth += 1;
        drop(own);

        Some(GuardedLockGuard {
            lock: self,
            acquired: true,
            _not_send: PhantomData,
        })
    }

    /// Whether the calling thread currently holds the lock.
    ///
    /// Always `false` inside a signal handler, where ownership is not
    /// consulted.
    pub fn is_owned_by_current_thread(&self) -> bool {
        if !self.gate.block_for_signal_handler() {
            return false;
        }
        let own = self.raw.lock();
        own.depth > 0 && own.owner == current_token()
    }

    /// The gate this lock consults.
    pub fn gate(&self) -> &Arc<SignalGate> {
        &self.gate
    }

    /// Access the data through exclusive ownership, no locking needed.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.data
    }

    pub fn into_inner(self) -> T {
        self.data
    }

    fn acquire(&self) {
        let me = current_token();
        let mut own = self.raw.lock();
        while own.depth > 0 && own.owner != me {
            self.released.wait(&mut own);
        }
        own.owner = me;
        own.depth += 1;
    }

    fn release(&self) {
        let mut own = self.raw.lock();
        debug_assert!(own.depth > 0 && own.owner == current_token());
        own.depth = own.depth.saturating_sub(1);
        if own.depth == 0 {
            own.owner = 0;
            drop(own);
            self.released.notify_one();
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for GuardedLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedLock")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

/// Held lock, or a skipped acquisition inside a signal handler.
///
/// Releases on drop only what it actually acquired.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct GuardedLockGuard<'a, T> {
    pub(super) lock: &'a GuardedLock<T>,
    pub(super) acquired: bool,
    // Ownership is tracked per thread.
    _not_send: PhantomData<*const ()>,
}

impl<T> GuardedLockGuard<'_, T> {
    /// `false` when the acquisition was skipped for a signal handler.
    pub fn is_acquired(&self) -> bool {
        self.acquired
    }
}

impl<T> Deref for GuardedLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.lock.data
    }
}

impl<T> Drop for GuardedLockGuard<'_, T> {
    fn drop(&mut self) {
        if self.acquired {
            self.lock.release();
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for GuardedLockGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedLockGuard")
            .field("acquired", &self.acquired)
            .field("data", &self.lock.data)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn new_lock<T>(data: T) -> GuardedLock<T> {
        GuardedLock::new(Arc::new(SignalGate::new()), data)
    }

    #[test]
    fn test_recursive_lock() {
        let lock = new_lock(Cell::new(0));

        let outer = lock.lock();
        outer.set(1);
        {
            let inner = lock.lock();
            assert!(inner.is_acquired());
            inner.set(inner.get() + 1);
        }
        assert!(lock.is_owned_by_current_thread());
        assert_eq!(outer.get(), 2);
        drop(outer);

        assert!(!lock.is_owned_by_current_thread());
    }

    #[test]
    fn test_mutual_exclusion() {
        let lock = Arc::new(new_lock(AtomicUsize::new(0)));
        let inside = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                let inside = inside.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        let guard = lock.lock();
                        assert!(!inside.swap(true, Ordering::SeqCst));
                        guard.fetch_add(1, Ordering::Relaxed);
                        inside.store(false, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(lock.lock().load(Ordering::Relaxed), 1600);
    }

    #[test]
    fn test_try_lock_contended() {
        let lock = Arc::new(new_lock(()));
        let guard = lock.lock();

        let other = {
            let lock = lock.clone();
            thread::spawn(move || lock.try_lock().is_some())
        };
        assert!(!other.join().unwrap());

        assert!(lock.try_lock().is_some());
        drop(guard);
    }

    #[test]
    fn test_signal_handler_skips_held_lock() {
        let lock = new_lock(Cell::new(7));
        let held = lock.lock();

        let gate = lock.gate().clone();
        let scope = gate.enter();

        // Same thread, already holding: must not wait for itself.
        let read = lock.lock();
        assert!(!read.is_acquired());
        assert_eq!(read.get(), 7);
        drop(read);
        assert!(!lock.is_owned_by_current_thread());
        drop(scope);

        assert!(lock.is_owned_by_current_thread());
        drop(held);
        assert!(!lock.is_owned_by_current_thread());
    }

    #[test]
    fn test_ownership_query_skips_raw_lock_in_handler() {
        let lock = new_lock(Cell::new(0));
        let gate = lock.gate().clone();

        // Interrupted while the bookkeeping mutex is held.
        let raw = lock.raw.lock();
        let scope = gate.enter();
        assert!(!lock.is_owned_by_current_thread());
        drop(scope);
        drop(raw);

        let _guard = lock.lock();
        assert!(lock.is_owned_by_current_thread());
    }

    #[test]
    fn test_signal_handler_skips_lock_held_elsewhere() {
        let lock = Arc::new(new_lock(AtomicUsize::new(3)));
        let (locked_tx, locked_rx) = crossbeam_channel::bounded::<()>(0);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);

        let holder = {
            let lock = lock.clone();
            thread::spawn(move || {
                let _guard = lock.lock();
                locked_tx.send(()).unwrap();
                done_rx.recv().unwrap();
            })
        };
        locked_rx.recv().unwrap();

        {
            let _scope = lock.gate().enter();
            let guard = lock.lock();
            assert!(!guard.is_acquired());
            assert_eq!(guard.load(Ordering::Relaxed), 3);
        }

        done_tx.send(()).unwrap();
        holder.join().unwrap();
    }

    #[test]
    fn test_waiter_proceeds_after_release() {
        let lock = Arc::new(new_lock(AtomicUsize::new(0)));
        let guard = lock.lock();

        let waiter = {
            let lock = lock.clone();
            thread::spawn(move || {
                let guard = lock.lock();
                guard.load(Ordering::SeqCst)
            })
        };

        thread::sleep(Duration::from_millis(20));
        guard.store(5, Ordering::SeqCst);
        drop(guard);

        assert_eq!(waiter.join().unwrap(), 5);
    }
}
