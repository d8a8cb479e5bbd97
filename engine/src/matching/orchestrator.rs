//! Activation fan-out: match donors, alert each one once, count deliveries.

use super::{MatchingPolicy, find_candidates};
use crate::metrics;
use crate::notify::{AlertVariant, DonorAlert, DonorNotifier};
use crate::types::{Donor, EmergencyRequest, RecordId, RequestSource};
use chrono::NaiveDate;
use futures::future::join_all;
use std::sync::Arc;

/// Outcome of one activation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Activation {
    /// Activated request
    pub request_id: RecordId,
    /// Qualifying donors an alert was attempted for
    pub attempted: usize,
    /// Alerts the notifier reported as delivered
    pub notified: usize,
}

/// Runs matching and notification for a request that just became `Active`.
///
/// Callers invoke [`MatchingOrchestrator::activate`] once per activation edge;
/// calling it twice sends every alert twice.
#[derive(Clone)]
pub struct MatchingOrchestrator {
    notifier: Arc<dyn DonorNotifier>,
    policy: MatchingPolicy,
    base_url: String,
}

impl MatchingOrchestrator {
    /// Create an orchestrator.
    ///
    /// `base_url` is where donors log in to answer admin-approved public
    /// requests.
    #[must_use]
    pub fn new(notifier: Arc<dyn DonorNotifier>, policy: MatchingPolicy, base_url: impl Into<String>) -> Self {
        Self {
            notifier,
            policy,
            base_url: base_url.into(),
        }
    }

    /// Donor login page linked from login-required alerts
    #[must_use]
    pub fn login_url(&self) -> String {
        format!("{}/donor_login.html", self.base_url.trim_end_matches('/'))
    }

    /// Alert every qualifying donor in `donors` about `request`.
    ///
    /// Alerts are sent concurrently. A failed delivery is logged and not
    /// counted; it never affects the other donors.
    #[tracing::instrument(skip_all, fields(request_id = %request.id))]
    pub async fn activate(&self, request: &EmergencyRequest, donors: &[Donor], today: NaiveDate) -> Activation {
        let Some(origin) = request.position() else {
            tracing::warn!("Request has no usable coordinate, no donors notified");
            metrics::record_activation(0, 0);
            return Activation {
                request_id: request.id.clone(),
                attempted: 0,
                notified: 0,
            };
        };

        let variant = match request.source {
            RequestSource::HospitalStaff => AlertVariant::Direct,
            RequestSource::Public => AlertVariant::LoginRequired {
                login_url: self.login_url(),
            },
        };

        let candidates = find_candidates(origin, request.blood_type, donors, self.policy.radius_km, today);
        let attempted = candidates.len();

        let deliveries = candidates.into_iter().map(|candidate| {
            let alert = DonorAlert {
                donor_name: candidate.donor.name.clone(),
                donor_email: candidate.donor.email.clone(),
                hospital_name: request.hospital_name.clone(),
                blood_type: request.blood_type,
                distance_km: candidate.distance_km,
                location_link: request.location.clone(),
                variant: variant.clone(),
            };
            let donor = candidate.donor.email.clone();
            let sending = self.notifier.send(alert);
            async move {
                match sending.await {
                    Ok(()) => {
                        metrics::record_notification(true);
                        true
                    },
                    Err(e) => {
                        tracing::warn!(%donor, kind = ?e.kind(), error = %e, "Donor alert not delivered");
                        metrics::record_notification(false);
                        false
                    },
                }
            }
        });

        let notified = join_all(deliveries).await.into_iter().filter(|delivered| *delivered).count();

        tracing::info!(attempted, notified, "Donors notified");
        metrics::record_activation(attempted, notified);

        Activation {
            request_id: request.id.clone(),
            attempted,
            notified,
        }
    }
}
