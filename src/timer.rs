//! Reschedulable one-shot timer driving throttled output flushes.
//!
//! The timer thread sleeps until a single authoritative deadline and then
//! invokes its callback once. Scheduling a new deadline replaces the old
//! one, so at most one flush is pending at any time.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

struct TimerState {
    deadline: Option<Instant>,
    shutdown: bool,
}

struct TimerShared {
    state: Mutex<TimerState>,
    cond: Condvar,
}

/// A one-shot timer that runs a callback at a deadline.
///
/// The callback is invoked on the timer's own thread with no internal
/// locks held, so it may freely schedule the next deadline from inside
/// the callback.
pub struct FlushTimer {
    shared: Arc<TimerShared>,
    handle: Option<JoinHandle<()>>,
}

impl FlushTimer {
    /// Spawn the timer thread. The timer starts with no deadline armed.
    pub fn spawn<F>(callback: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                deadline: None,
                shutdown: false,
            }),
            cond: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("flush-timer".to_string())
            .spawn(move || loop {
                let mut state = thread_shared.state.lock();
                if state.shutdown {
                    break;
                }
                match state.deadline {
                    None => {
                        thread_shared.cond.wait(&mut state);
                    }
                    Some(deadline) => {
                        if Instant::now() >= deadline {
                            state.deadline = None;
                            drop(state);
                            callback();
                        } else {
                            let _ = thread_shared.cond.wait_until(&mut state, deadline);
                        }
                    }
                }
            })
            .expect("failed to spawn timer thread");

        FlushTimer {
            shared,
            handle: Some(handle),
        }
    }

    /// Arm (or re-arm) the timer for the given deadline, replacing any
    /// previously scheduled one.
    pub fn schedule_at(&self, deadline: Instant) {
        let mut state = self.shared.state.lock();
        state.deadline = Some(deadline);
        self.shared.cond.notify_one();
    }

    /// Disarm the timer without firing the callback.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        state.deadline = None;
        self.shared.cond.notify_one();
    }

    /// The currently armed deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.shared.state.lock().deadline
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.cond.notify_one();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_timer_fires_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        let timer = FlushTimer::spawn(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        timer.schedule_at(Instant::now() + Duration::from_millis(20));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(timer.deadline().is_none());
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        let timer = FlushTimer::spawn(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        timer.schedule_at(Instant::now() + Duration::from_millis(50));
        timer.cancel();
        thread::sleep(Duration::from_millis(120));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reschedule_replaces_deadline() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        let timer = FlushTimer::spawn(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        timer.schedule_at(Instant::now() + Duration::from_millis(30));
        timer.schedule_at(Instant::now() + Duration::from_millis(60));
        thread::sleep(Duration::from_millis(40));
        assert_eq!(fired.load(Ordering::SeqCst), 0, "old deadline still fired");
        thread::sleep(Duration::from_millis(60));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
