//! Per-connection message rate guard
//!
//! Sliding one-second log of accepted message instants. A message is admitted
//! while fewer than `max_per_window` messages were accepted in the trailing
//! window, so no burst larger than the limit fits in any one-second span.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: usize,
    accepted: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(max_per_window: usize) -> Self {
        Self {
            max_per_window,
            accepted: VecDeque::with_capacity(max_per_window),
        }
    }

    /// Record an attempt at `now`. Returns false when over the limit;
    /// rejected attempts do not consume budget.
    pub fn check(&mut self, now: Instant) -> bool {
        while let Some(&oldest) = self.accepted.front() {
            if now.saturating_duration_since(oldest) >= WINDOW {
                self.accepted.pop_front();
            } else {
                break;
            }
        }

        if self.accepted.len() >= self.max_per_window {
            return false;
        }

        self.accepted.push_back(now);
        true
    }

    /// Messages accepted in the current window
    #[cfg(test)]
    pub(crate) fn in_window(&self) -> usize {
        self.accepted.len()
    }
}
