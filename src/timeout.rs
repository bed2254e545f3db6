//! Wait bounds for shutdown and flush.

use std::fmt;
use std::time::{Duration, Instant};

/// How long a caller is willing to wait.
///
/// [`Timeout::ZERO`] checks once without waiting; [`Timeout::INFINITE`] waits
/// however long it takes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeout(Option<Duration>);

impl Timeout {
    /// Check once, don't wait.
    pub const ZERO: Timeout = Timeout(Some(Duration::ZERO));

    /// Wait until the condition holds.
    pub const INFINITE: Timeout = Timeout(None);

    /// A bounded wait in milliseconds. `u64::MAX` means infinite.
    pub const fn from_millis(ms: u64) -> Self {
        if ms == u64::MAX {
            Timeout::INFINITE
        } else {
            Timeout(Some(Duration::from_millis(ms)))
        }
    }

    /// The bound, or `None` when infinite.
    pub const fn duration(&self) -> Option<Duration> {
        self.0
    }

    pub const fn is_infinite(&self) -> bool {
        self.0.is_none()
    }

    /// Absolute deadline measured from `now`. `None` means never.
    ///
    /// A bound too large to represent is treated as infinite.
    pub fn deadline_from(&self, now: Instant) -> Option<Instant> {
        self.0.and_then(|d| now.checked_add(d))
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline_from(Instant::now())
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Timeout(Some(d))
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(d: Option<Duration>) -> Self {
        Timeout(d)
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Timeout::ZERO
    }
}

impl fmt::Debug for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(d) => write!(f, "Timeout({:?})", d),
            None => f.write_str("Timeout(infinite)"),
        }
    }
}
