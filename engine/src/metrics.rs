//! Business metrics for the matching engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `bloodbridge_requests_created_total{source}` - Emergency requests created
//! - `bloodbridge_activations_total` - Requests that entered `Active`
//! - `bloodbridge_notifications_total{outcome}` - Alerts delivered or failed
//! - `bloodbridge_responses_total{status}` - Donor accept/decline responses
//! - `bloodbridge_window_rejections_total` - Responses after the window closed
//! - `bloodbridge_donations_confirmed_total{outcome}` - Donated / failed confirmations
//! - `bloodbridge_slots_expired_total` - Ledger slots expired by the sweeper
//!
//! ## Histograms
//! - `bloodbridge_activation_candidates` - Qualifying donors per activation

use crate::types::{RequestSource, ResponseStatus};
use metrics::{describe_counter, describe_histogram};

/// Register all business metric descriptions.
///
/// Call once at startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "bloodbridge_requests_created_total",
        "Emergency requests created, by source (hospital_staff, public)"
    );
    describe_counter!(
        "bloodbridge_activations_total",
        "Emergency requests that entered Active and ran donor matching"
    );
    describe_histogram!(
        "bloodbridge_activation_candidates",
        "Qualifying donors found per activation"
    );
    describe_counter!(
        "bloodbridge_notifications_total",
        "Donor alerts by outcome (delivered, failed)"
    );
    describe_counter!(
        "bloodbridge_responses_total",
        "Donor responses recorded, by status (accepted, declined)"
    );
    describe_counter!(
        "bloodbridge_window_rejections_total",
        "Donor responses rejected because the response window had closed"
    );
    describe_counter!(
        "bloodbridge_donations_confirmed_total",
        "Donation confirmations by outcome (donated, failed)"
    );
    describe_counter!(
        "bloodbridge_slots_expired_total",
        "Unanswered donor slots marked Expired by the sweeper"
    );

    tracing::info!("Business metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a created emergency request.
pub fn record_request_created(source: RequestSource) {
    let source = match source {
        RequestSource::HospitalStaff => "hospital_staff",
        RequestSource::Public => "public",
    };
    metrics::counter!("bloodbridge_requests_created_total", "source" => source).increment(1);
    tracing::debug!(source, "Recorded request_created metric");
}

/// Record a finished activation.
///
/// # Arguments
///
/// * `attempted` - Qualifying donors alerted
/// * `notified` - Alerts delivered
#[allow(clippy::cast_precision_loss)]
pub fn record_activation(attempted: usize, notified: usize) {
    metrics::counter!("bloodbridge_activations_total").increment(1);
    metrics::histogram!("bloodbridge_activation_candidates").record(attempted as f64);
    tracing::debug!(attempted, notified, "Recorded activation metric");
}

/// Record one alert delivery attempt.
pub fn record_notification(delivered: bool) {
    let outcome = if delivered { "delivered" } else { "failed" };
    metrics::counter!("bloodbridge_notifications_total", "outcome" => outcome).increment(1);
}

/// Record a donor response.
pub fn record_response(status: ResponseStatus) {
    metrics::counter!("bloodbridge_responses_total", "status" => status.as_str()).increment(1);
    tracing::debug!(status = status.as_str(), "Recorded response metric");
}

/// Record a response rejected for arriving after the window.
pub fn record_window_rejection() {
    metrics::counter!("bloodbridge_window_rejections_total").increment(1);
    tracing::debug!("Recorded window_rejection metric");
}

/// Record a donation confirmation.
pub fn record_donation_confirmed(success: bool) {
    let outcome = if success { "donated" } else { "failed" };
    metrics::counter!("bloodbridge_donations_confirmed_total", "outcome" => outcome).increment(1);
    tracing::debug!(outcome, "Recorded donation_confirmed metric");
}

/// Record slots expired by one sweep.
pub fn record_slots_expired(count: usize) {
    metrics::counter!("bloodbridge_slots_expired_total").increment(count as u64);
    tracing::debug!(count, "Recorded slots_expired metric");
}
