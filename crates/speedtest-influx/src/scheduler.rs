// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-interval schedule.
//!
//! Due times lie on the grid `start + k * interval`. The runner checks
//! [`Schedule::is_due`] once per poll period, so a cycle may start up to one
//! poll period late.

use std::time::{Duration, Instant};

/// Schedule of a recurring measurement.
#[derive(Debug, Clone)]
pub struct Schedule {
    interval: Duration,
    next_due: Instant,
}

impl Schedule {
    /// First due time is one interval after `start`.
    ///
    /// # Panics
    /// Panics if `interval` is zero.
    pub fn new(interval: Duration, start: Instant) -> Self {
        assert!(!interval.is_zero(), "schedule interval must be non-zero");
        Self {
            interval,
            next_due: start + interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    /// Time left until the next due time (zero if already due).
    pub fn time_until_due(&self, now: Instant) -> Duration {
        self.next_due.saturating_duration_since(now)
    }

    /// Move to the first grid tick after `now`.
    ///
    /// Returns the number of ticks that were passed over without a cycle,
    /// which is non-zero only when a cycle overran the interval.
    pub fn advance(&mut self, now: Instant) -> u64 {
        let mut missed = 0;
        self.next_due += self.interval;
        while self.next_due <= now {
            self.next_due += self.interval;
            missed += 1;
        }
        missed
    }
}
