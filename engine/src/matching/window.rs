//! Bounded response window opened when a request is activated.

use chrono::{DateTime, Duration, Utc};

/// Length of the response window in seconds (15 minutes)
pub const RESPONSE_WINDOW_SECS: i64 = 900;

/// Response window starting at a request's activation time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResponseWindow {
    notified_at: DateTime<Utc>,
    duration: Duration,
}

impl ResponseWindow {
    /// Window of `duration` starting at `notified_at`
    #[must_use]
    pub const fn new(notified_at: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            notified_at,
            duration,
        }
    }

    /// Standard 15 minute window
    #[must_use]
    pub fn standard(notified_at: DateTime<Utc>) -> Self {
        Self::new(notified_at, Duration::seconds(RESPONSE_WINDOW_SECS))
    }

    /// Activation time
    #[must_use]
    pub const fn notified_at(&self) -> DateTime<Utc> {
        self.notified_at
    }

    /// Window length
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Time since activation
    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now - self.notified_at
    }

    /// Whole seconds left, clamped to `0..=duration`
    #[must_use]
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        let total = self.duration.num_seconds();
        (total - self.elapsed(now).num_seconds()).clamp(0, total)
    }

    /// Closed once strictly more than `duration` has elapsed; a response at
    /// exactly `duration` is still on time.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.elapsed(now) > self.duration
    }
}
