//! Synchronization primitives shared between the session and transport threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A thread-safe shutdown flag for stopping background threads.
///
/// Wraps `Arc<AtomicBool>` so the transport reader thread and its owner
/// can share one cancellation signal without repeating the pattern.
#[derive(Clone, Debug, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    /// Create a new flag (initially not set).
    #[must_use]
    pub fn new() -> Self {
        ShutdownFlag(Arc::new(AtomicBool::new(false)))
    }

    /// Check whether shutdown has been requested.
    #[inline]
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Request shutdown.
    #[inline]
    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_flag_lifecycle() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_set());

        flag.set();
        assert!(flag.is_set());
    }

    #[test]
    fn test_shutdown_flag_shared_between_clones() {
        let flag1 = ShutdownFlag::new();
        let flag2 = flag1.clone();

        flag1.set();
        assert!(flag2.is_set());
    }
}
