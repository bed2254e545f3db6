//! Cheap identity for the calling thread.
//!
//! `std::thread::current()` may allocate on first use, which is not allowed
//! from a signal handler, so the gate and the recursive lock identify threads
//! through a plain integer token instead.

/// Opaque non-zero identifier of the calling thread.
///
/// Tokens are only compared for equality and are only unique among live
/// threads.
#[cfg(unix)]
#[inline]
pub fn current_token() -> usize {
    // SAFETY: pthread_self has no preconditions and cannot fail.
    let id = unsafe { libc::pthread_self() };
    (id as usize).max(1)
}

#[cfg(not(unix))]
#[inline]
pub fn current_token() -> usize {
    thread_local! {
        static MARKER: u8 = const { 0 };
    }
    MARKER.with(|m| m as *const u8 as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_stable_within_thread() {
        assert_eq!(current_token(), current_token());
        assert_ne!(current_token(), 0);
    }

    #[test]
    fn test_token_differs_across_threads() {
        let here = current_token();
        let there = std::thread::spawn(current_token).join().unwrap();
        assert_ne!(here, there);
    }
}
