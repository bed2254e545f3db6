use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

// Poisoning is ignored: task code never runs while these are held.

#[derive(Debug, Default)]
pub(crate) struct RawMutex<T> {
    inner: Mutex<T>,
}

impl<T> RawMutex<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    #[inline]
    pub(crate) fn lock(&self) -> RawGuard<'_, T> {
        RawGuard {
            inner: Some(self.inner.lock().unwrap_or_else(PoisonError::into_inner)),
        }
    }
}

/// `std`'s condvar consumes the guard; the `Option` lets waits borrow it.
#[derive(Debug)]
pub(crate) struct RawGuard<'a, T> {
    inner: Option<MutexGuard<'a, T>>,
}

impl<'a, T> RawGuard<'a, T> {
    fn take(&mut self) -> MutexGuard<'a, T> {
        match self.inner.take() {
            Some(guard) => guard,
            None => unreachable!("raw guard used while parked"),
        }
    }
}

impl<T> Deref for RawGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.inner {
            Some(guard) => &**guard,
            None => unreachable!("raw guard used while parked"),
        }
    }
}

impl<T> DerefMut for RawGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.inner {
            Some(guard) => &mut **guard,
            None => unreachable!("raw guard used while parked"),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct RawCondvar {
    inner: Condvar,
}

impl RawCondvar {
    pub(crate) const fn new() -> Self {
        Self {
            inner: Condvar::new(),
        }
    }

    pub(crate) fn wait<T>(&self, guard: &mut RawGuard<'_, T>) {
        let held = guard.take();
        let held = self.inner.wait(held).unwrap_or_else(PoisonError::into_inner);
        guard.inner = Some(held);
    }

    /// Returns `true` if the deadline passed without a notification.
    pub(crate) fn wait_until<T>(&self, guard: &mut RawGuard<'_, T>, deadline: Instant) -> bool {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let held = guard.take();
        let (held, result) = self
            .inner
            .wait_timeout(held, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        guard.inner = Some(held);
        result.timed_out()
    }

    pub(crate) fn notify_one(&self) {
        self.inner.notify_one();
    }

    pub(crate) fn notify_all(&self) {
        self.inner.notify_all();
    }
}
