use chrono::{DateTime, TimeDelta, Utc};
use std::collections::VecDeque;

/// Non-blocking sliding-window token bucket limiting events per interval.
///
/// The caller never waits: [`Throttler::try_send`] answers immediately whether the event may
/// pass, and records it when it does. Forwarded events therefore preserve submission order;
/// refused events are the caller's to deny synchronously.
#[derive(Debug, Clone)]
pub struct Throttler {
    limit: usize,
    interval: TimeDelta,
    sent: VecDeque<DateTime<Utc>>,
}

impl Throttler {
    pub fn new(limit: usize, interval: TimeDelta) -> Self {
        Self {
            limit,
            interval,
            sent: VecDeque::with_capacity(limit),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn interval(&self) -> TimeDelta {
        self.interval
    }

    /// Number of events recorded within the window ending at `now`.
    pub fn used(&self, now: DateTime<Utc>) -> usize {
        let window_start = now - self.interval;
        self.sent
            .iter()
            .filter(|timestamp| **timestamp > window_start)
            .count()
    }

    /// Record and admit the event if the window has capacity at `now`; refuse otherwise.
    pub fn try_send(&mut self, now: DateTime<Utc>) -> bool {
        let window_start = now - self.interval;
        while let Some(front) = self.sent.front() {
            if *front <= window_start {
                self.sent.pop_front();
            } else {
                break;
            }
        }

        if self.sent.len() < self.limit {
            self.sent.push_back(now);
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.sent.clear();
    }
}
