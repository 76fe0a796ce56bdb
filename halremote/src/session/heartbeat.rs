//! Deadline-based liveness timer.
//!
//! A session owns two of these, one per channel. Every method takes the
//! caller's notion of now, so the arithmetic is testable without sleeping;
//! the worker loop turns the nearest deadline into its wait bound.

use std::time::{Duration, Instant};

/// One periodic liveness deadline.
#[derive(Debug, Default)]
pub struct Heartbeat {
    period: Option<Duration>,
    deadline: Option<Instant>,
}

impl Heartbeat {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tick period. `None` disables the timer; a zero duration is
    /// treated as disabled too.
    pub fn set_period(&mut self, period: Option<Duration>) {
        self.period = period.filter(|p| !p.is_zero());
        if self.period.is_none() {
            self.deadline = None;
        }
    }

    /// Arms the timer at `now + period`. Disabled timers stay unarmed.
    pub fn start(&mut self, now: Instant) {
        self.deadline = self.period.map(|p| now + p);
    }

    /// Disarms the timer.
    pub fn stop(&mut self) {
        self.deadline = None;
    }

    /// Pushes the next tick out to `now + period`, if the timer is armed.
    pub fn refresh(&mut self, now: Instant) {
        if self.deadline.is_some() {
            self.start(now);
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    /// Next tick time, if armed.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fires the timer if its deadline has passed, re-arming it for the
    /// next period. Returns whether it fired.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.start(now);
                true
            }
            _ => false,
        }
    }
}
