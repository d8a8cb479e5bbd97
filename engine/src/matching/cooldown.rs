//! Post-donation cooldown policy.

use chrono::{Days, NaiveDate};

/// Days a donor is ineligible after a confirmed donation
pub const COOLDOWN_DAYS: u64 = 90;

/// Whether a donor whose cooldown ends on `cooldown_until` may be matched on
/// `on`. The cooldown has lapsed only once `on` is strictly after it.
#[must_use]
pub fn is_eligible(cooldown_until: Option<NaiveDate>, on: NaiveDate) -> bool {
    cooldown_until.is_none_or(|until| until < on)
}

/// Last ineligible date after donating on `donated_on`.
#[must_use]
pub fn cooldown_until(donated_on: NaiveDate, days: u64) -> NaiveDate {
    donated_on
        .checked_add_days(Days::new(days))
        .unwrap_or(NaiveDate::MAX)
}
