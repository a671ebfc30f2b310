//! Output throttling for engine stdout.
//!
//! Engines at high depth can emit hundreds of `info` lines per second;
//! forwarding each one individually to a UI-facing consumer causes visible
//! jank. The queue buffers raw lines and releases them in arrival order in
//! batches on a flush cadence.
//!
//! The queue itself never touches the wall clock: callers pass `Instant`s
//! in, which keeps the adaptive-cadence behavior testable without real
//! delays. The live path drives it with a [`FlushTimer`](crate::timer).

use std::time::{Duration, Instant};

/// Default flush interval.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(50);

/// Flush interval while a retained analysis line carries a mate score.
/// Mate-score output arrives in dense bursts that do not need low-latency
/// delivery.
pub const MATE_FLUSH_INTERVAL: Duration = Duration::from_millis(300);

/// Whether an analysis line carries a mate score.
#[must_use]
pub fn contains_mate_score(line: &str) -> bool {
    line.contains("score mate")
}

/// Result of attempting a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The pending buffer, drained in arrival order.
    Batch(Vec<String>),
    /// Flush attempted before the minimum interval elapsed; the caller
    /// should re-arm its timer for the returned deadline.
    Rescheduled(Instant),
    /// Nothing was pending.
    Empty,
}

/// Buffers raw engine lines between flushes.
#[derive(Debug, Default)]
pub struct ThrottleQueue {
    pending: Vec<String>,
    last_flush: Option<Instant>,
    next_flush: Option<Instant>,
}

impl ThrottleQueue {
    #[must_use]
    pub fn new() -> Self {
        ThrottleQueue::default()
    }

    /// The flush interval given whether a mate score is currently retained.
    /// Re-evaluated on every flush, so the cadence narrows again once
    /// mate-score lines age out.
    #[must_use]
    pub fn interval_for(mate_retained: bool) -> Duration {
        if mate_retained {
            MATE_FLUSH_INTERVAL
        } else {
            FLUSH_INTERVAL
        }
    }

    /// Append a raw line. If no flush is scheduled yet, returns the deadline
    /// the caller must arm its timer for.
    pub fn push(&mut self, line: String, now: Instant, mate_retained: bool) -> Option<Instant> {
        self.pending.push(line);
        if self.next_flush.is_some() {
            return None;
        }
        let deadline = match self.last_flush {
            None => now,
            Some(last) => (last + Self::interval_for(mate_retained)).max(now),
        };
        self.next_flush = Some(deadline);
        Some(deadline)
    }

    /// Attempt a flush at `now`.
    ///
    /// Drains the entire pending buffer in arrival order, unless the
    /// minimum interval since the previous flush has not yet elapsed, in
    /// which case the flush is deferred rather than done early.
    pub fn flush(&mut self, now: Instant, mate_retained: bool) -> FlushOutcome {
        if self.pending.is_empty() {
            self.next_flush = None;
            return FlushOutcome::Empty;
        }
        if let Some(last) = self.last_flush {
            let earliest = last + Self::interval_for(mate_retained);
            if now < earliest {
                self.next_flush = Some(earliest);
                return FlushOutcome::Rescheduled(earliest);
            }
        }
        self.last_flush = Some(now);
        self.next_flush = None;
        FlushOutcome::Batch(std::mem::take(&mut self.pending))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The currently scheduled flush deadline, if any.
    #[must_use]
    pub fn next_flush(&self) -> Option<Instant> {
        self.next_flush
    }

    /// Drop all pending lines and scheduling state.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.next_flush = None;
    }
}
