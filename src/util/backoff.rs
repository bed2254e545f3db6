//! Exponential backoff for threads waiting out a signal handler.

use std::hint::spin_loop;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Spin, then yield, then sleep in growing steps.
#[derive(Debug)]
pub struct Backoff {
    step: AtomicUsize,
}

impl Backoff {
    const SPIN_LIMIT: usize = 6;
    const YIELD_LIMIT: usize = 10;
    const MAX_SLEEP: Duration = Duration::from_millis(10);

    /// Create a new backoff instance
    pub const fn new() -> Self {
        Self {
            step: AtomicUsize::new(0),
        }
    }

    /// Reset the backoff to its initial state
    pub fn reset(&self) {
        self.step.store(0, Ordering::Relaxed);
    }

    /// Wait one step.
    ///
    /// Past the yield phase each call sleeps, doubling from 10µs up to
    /// `MAX_SLEEP`, so a long-running handler does not keep a core busy.
    pub fn snooze(&self) {
        let step = self.step.fetch_add(1, Ordering::Relaxed);

        if step <= Self::SPIN_LIMIT {
            for _ in 0..(1 << step) {
                spin_loop();
            }
        } else if step <= Self::YIELD_LIMIT {
            thread::yield_now();
        } else {
            let shift = (step - Self::YIELD_LIMIT).min(10) as u32;
            let sleep = Duration::from_micros(10u64 << shift).min(Self::MAX_SLEEP);
            thread::sleep(sleep);
        }
    }

    /// Check if we've reached the sleep phase
    pub fn is_completed(&self) -> bool {
        self.step.load(Ordering::Relaxed) > Self::YIELD_LIMIT
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
