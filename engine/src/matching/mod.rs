//! Donor matching: geo radius selection, cooldown eligibility, the response
//! window and the activation orchestrator.

pub mod cooldown;
pub mod geo;
pub mod orchestrator;
pub mod window;

pub use cooldown::{COOLDOWN_DAYS, cooldown_until, is_eligible};
pub use geo::{Candidate, EARTH_RADIUS_KM, MATCH_RADIUS_KM, find_candidates, haversine_km};
pub use orchestrator::{Activation, MatchingOrchestrator};
pub use window::{RESPONSE_WINDOW_SECS, ResponseWindow};

use chrono::{DateTime, Duration, Utc};

/// Tunable matching policy. Defaults are the production constants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchingPolicy {
    /// Notification radius, kilometres (inclusive)
    pub radius_km: f64,
    /// Response window length, seconds
    pub response_window_secs: i64,
    /// Days a donor is ineligible after a confirmed donation
    pub cooldown_days: u64,
}

impl MatchingPolicy {
    /// Response window opened at `notified_at`
    #[must_use]
    pub fn window(&self, notified_at: DateTime<Utc>) -> ResponseWindow {
        ResponseWindow::new(notified_at, Duration::seconds(self.response_window_secs))
    }
}

impl Default for MatchingPolicy {
    fn default() -> Self {
        Self {
            radius_km: MATCH_RADIUS_KM,
            response_window_secs: RESPONSE_WINDOW_SECS,
            cooldown_days: COOLDOWN_DAYS,
        }
    }
}
