// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A shared cadence gate (§4.5 "throttled at most once per N minutes across
//! all callers"). One [`Throttle`] instance is shared between the Daemon's
//! own timer and any inline caller (e.g. `claimStep`) so the two never race
//! each other into running the same pass twice within its window.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub struct Throttle {
    min_interval: Duration,
    last_run: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last_run: Mutex::new(None) }
    }

    /// Returns `true` and records `now` as the new last-run instant if the
    /// throttle window has elapsed (or this is the first call); otherwise
    /// returns `false` without touching the recorded instant.
    pub fn try_acquire(&self, now: Instant) -> bool {
        let mut last_run = self.last_run.lock();
        let elapsed = last_run.map(|t| now.duration_since(t)).unwrap_or(self.min_interval);
        if elapsed < self.min_interval {
            return false;
        }
        *last_run = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_always_acquires() {
        let throttle = Throttle::new(Duration::from_secs(300));
        assert!(throttle.try_acquire(Instant::now()));
    }

    #[test]
    fn second_call_within_window_is_denied() {
        let throttle = Throttle::new(Duration::from_secs(300));
        let now = Instant::now();
        assert!(throttle.try_acquire(now));
        assert!(!throttle.try_acquire(now + Duration::from_secs(60)));
    }

    #[test]
    fn call_after_window_elapses_is_granted() {
        let throttle = Throttle::new(Duration::from_secs(300));
        let now = Instant::now();
        assert!(throttle.try_acquire(now));
        assert!(throttle.try_acquire(now + Duration::from_secs(301)));
    }
}
