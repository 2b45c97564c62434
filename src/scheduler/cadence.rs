//! Deadline arithmetic for the repeating scheduler.
//!
//! A `Cadence` owns the timing of one periodic task. Deadlines are laid on a
//! grid anchored at the moment the task was started: `origin + n * interval`.
//! Advancing never looks at how long the previous invocation took, so a slow
//! callback cannot push the grid later.

use std::time::{Duration, Instant};

/// Where a periodic task is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the next deadline.
    Armed,
    /// The callback is running; the following deadline is already armed.
    Firing,
    /// No further invocations will begin.
    Stopped,
}

/// Fixed-origin timer state for a periodic task.
#[derive(Debug, Clone)]
pub struct Cadence {
    origin: Instant,
    interval: Duration,
    next_deadline: Instant,
    fired: u64,
}

impl Cadence {
    /// Arms the first deadline one full interval after `origin`.
    ///
    /// Returns `None` if that deadline is past what `Instant` can represent.
    pub fn new(origin: Instant, interval: Duration) -> Option<Self> {
        Some(Self {
            origin,
            interval,
            next_deadline: origin.checked_add(interval)?,
            fired: 0,
        })
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_deadline(&self) -> Instant {
        self.next_deadline
    }

    /// Number of times `advance` has been called.
    pub fn fired(&self) -> u64 {
        self.fired
    }

    /// Whether the armed deadline has been reached.
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_deadline
    }

    /// Time left until the armed deadline, zero if it already passed.
    pub fn delay(&self, now: Instant) -> Duration {
        self.next_deadline.saturating_duration_since(now)
    }

    /// Consumes the due deadline and arms the next one.
    ///
    /// The deadline moves forward by whole intervals until it lies strictly
    /// after `now`. Returns the number of grid slots that were skipped because
    /// the previous invocation overran them, or `None` if the next deadline
    /// cannot be represented. The armed deadline is left unchanged then.
    pub fn advance(&mut self, now: Instant) -> Option<u64> {
        let mut next = self.next_deadline.checked_add(self.interval)?;
        let mut skipped = 0;
        while next <= now {
            next = next.checked_add(self.interval)?;
            skipped += 1;
        }
        self.next_deadline = next;
        self.fired += 1;
        Some(skipped)
    }
}
