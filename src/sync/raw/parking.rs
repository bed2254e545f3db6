use std::time::Instant;

pub(crate) type RawGuard<'a, T> = parking_lot::MutexGuard<'a, T>;

#[derive(Debug, Default)]
pub(crate) struct RawMutex<T> {
    inner: parking_lot::Mutex<T>,
}

impl<T> RawMutex<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self {
            inner: parking_lot::const_mutex(value),
        }
    }

    #[inline]
    pub(crate) fn lock(&self) -> RawGuard<'_, T> {
        self.inner.lock()
    }
}

#[derive(Debug, Default)]
pub(crate) struct RawCondvar {
    inner: parking_lot::Condvar,
}

impl RawCondvar {
    pub(crate) const fn new() -> Self {
        Self {
            inner: parking_lot::Condvar::new(),
        }
    }

    pub(crate) fn wait<T>(&self, guard: &mut RawGuard<'_, T>) {
        self.inner.wait(guard);
    }

    /// Returns `true` if the deadline passed without a notification.
    pub(crate) fn wait_until<T>(&self, guard: &mut RawGuard<'_, T>, deadline: Instant) -> bool {
        self.inner.wait_until(guard, deadline).timed_out()
    }

    pub(crate) fn notify_one(&self) {
        self.inner.notify_one();
    }

    pub(crate) fn notify_all(&self) {
        self.inner.notify_all();
    }
}
