//! Read models built from table snapshots.
//!
//! Every function here is pure: callers load the tables, these shape them.

use crate::matching::MatchingPolicy;
use crate::types::{
    ApprovalStatus, BloodType, Donor, Email, EmergencyRequest, RequestStatus, ResponseStatus, StaffMember,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, Serializer};
use std::collections::HashMap;

// ============================================================================
// Responses view
// ============================================================================

/// One donor's answer to a request, joined with the donor record
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Responder {
    /// Ledger key
    pub email: Email,
    /// Donor name, or the email when the donor record is gone
    pub name: String,
    /// Donor blood group, if the donor record still exists
    pub blood_group: Option<BloodType>,
    /// Donor phone, if the donor record still exists
    pub contact: Option<String>,
    /// When the donor answered
    pub responded_at: DateTime<Utc>,
    /// `Donated` or `Failed` once confirmed
    pub donation_status: Option<ResponseStatus>,
}

/// Accepted and declined donors of one request
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsesView {
    /// The request
    pub request: EmergencyRequest,
    /// Donors that accepted (including confirmed outcomes)
    pub accepted_donors: Vec<Responder>,
    /// Donors that declined
    pub declined_donors: Vec<Responder>,
}

/// Split a request's ledger into accepted and declined donors.
///
/// Expired slots appear in neither list.
#[must_use]
pub fn responses(request: EmergencyRequest, donors: &[Donor]) -> ResponsesView {
    let lookup: HashMap<&Email, &Donor> = donors.iter().map(|d| (&d.email, d)).collect();

    let mut accepted_donors = Vec::new();
    let mut declined_donors = Vec::new();
    for (email, entry) in &request.donor_responses {
        let donor = lookup.get(email);
        let responder = Responder {
            email: email.clone(),
            name: donor.map_or_else(|| email.to_string(), |d| d.name.clone()),
            blood_group: donor.map(|d| d.blood_group),
            contact: donor.map(|d| d.contact.clone()),
            responded_at: entry.at,
            donation_status: matches!(entry.status, ResponseStatus::Donated | ResponseStatus::Failed)
                .then_some(entry.status),
        };
        if entry.status.is_acceptance() {
            accepted_donors.push(responder);
        } else if entry.status == ResponseStatus::Declined {
            declined_donors.push(responder);
        }
    }

    ResponsesView {
        request,
        accepted_donors,
        declined_donors,
    }
}

// ============================================================================
// Donor dashboard
// ============================================================================

/// Donation statistics of one donor
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationStats {
    /// Confirmed donations
    pub total_donations: u32,
    /// Lives saved
    pub lives_saved: u32,
    /// Last confirmed donation
    pub last_donation: Option<NaiveDate>,
    /// End of the current cooldown
    pub cooldown_until: Option<NaiveDate>,
}

/// An active request as seen by one donor
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorEmergency {
    /// The request
    #[serde(flatten)]
    pub request: EmergencyRequest,
    /// The donor's ledger status; `None` until they answer
    #[serde(serialize_with = "pending_when_absent")]
    pub my_response: Option<ResponseStatus>,
    /// Seconds left in the response window
    pub seconds_left: i64,
}

fn pending_when_absent<S: Serializer>(status: &Option<ResponseStatus>, serializer: S) -> Result<S::Ok, S::Error> {
    match status {
        Some(status) => status.serialize(serializer),
        None => serializer.serialize_str("Pending"),
    }
}

/// Everything a logged-in donor sees
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorDashboard {
    /// Donor record
    pub profile: Donor,
    /// Donation statistics
    pub stats: DonationStats,
    /// Active requests the donor's blood group can serve
    pub emergencies: Vec<DonorEmergency>,
}

/// Dashboard for `donor` over the current requests.
#[must_use]
pub fn donor_dashboard(
    donor: Donor,
    requests: &[EmergencyRequest],
    policy: &MatchingPolicy,
    now: DateTime<Utc>,
) -> DonorDashboard {
    let emergencies = requests
        .iter()
        .filter(|r| r.status == RequestStatus::Active)
        .filter(|r| r.blood_type.accepts(donor.blood_group))
        .map(|r| DonorEmergency {
            my_response: r.response_of(&donor.email).map(|entry| entry.status),
            seconds_left: r
                .notified_at
                .map_or(0, |at| policy.window(at).remaining_secs(now)),
            request: r.clone(),
        })
        .collect();

    DonorDashboard {
        stats: DonationStats {
            total_donations: donor.total_donations,
            lives_saved: donor.lives_saved,
            last_donation: donor.last_donation,
            cooldown_until: donor.cooldown_until,
        },
        profile: donor,
        emergencies,
    }
}

// ============================================================================
// Hospital dashboard
// ============================================================================

/// Requests raised for one hospital
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HospitalDashboard {
    /// Logged-in staff member
    pub staff: StaffMember,
    /// Requests whose hospital matches, case-insensitively
    pub requests: Vec<EmergencyRequest>,
}

/// Dashboard for `staff`.
#[must_use]
pub fn hospital_dashboard(staff: StaffMember, requests: &[EmergencyRequest]) -> HospitalDashboard {
    let hospital = staff.hospital_name.trim().to_lowercase();
    let requests = requests
        .iter()
        .filter(|r| r.hospital_name.trim().to_lowercase() == hospital)
        .cloned()
        .collect();
    HospitalDashboard { staff, requests }
}

// ============================================================================
// Admin
// ============================================================================

/// Account counts by review status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ApprovalCounts {
    /// All accounts
    pub total: usize,
    /// Awaiting review
    pub pending: usize,
    /// Approved
    pub approved: usize,
    /// Rejected
    pub rejected: usize,
}

impl ApprovalCounts {
    fn count(statuses: impl IntoIterator<Item = ApprovalStatus>) -> Self {
        statuses.into_iter().fold(Self::default(), |mut counts, status| {
            counts.total += 1;
            match status {
                ApprovalStatus::Pending => counts.pending += 1,
                ApprovalStatus::Approved => counts.approved += 1,
                ApprovalStatus::Rejected => counts.rejected += 1,
            }
            counts
        })
    }
}

/// Request counts by lifecycle status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RequestCounts {
    /// All requests
    pub total: usize,
    /// Awaiting admin review
    pub pending_admin: usize,
    /// Window open or donors still being sought
    pub active: usize,
    /// Closed
    pub resolved: usize,
}

/// Admin overview
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    /// Donor accounts
    pub blood_donors: ApprovalCounts,
    /// Staff accounts
    pub hospital_staff: ApprovalCounts,
    /// Emergency requests
    pub emergency_requests: RequestCounts,
}

/// Counts over the three tables.
#[must_use]
pub fn admin_stats(donors: &[Donor], staff: &[StaffMember], requests: &[EmergencyRequest]) -> AdminStats {
    let emergency_requests = requests.iter().fold(RequestCounts::default(), |mut counts, r| {
        counts.total += 1;
        match r.status {
            RequestStatus::PendingAdmin => counts.pending_admin += 1,
            RequestStatus::Active => counts.active += 1,
            RequestStatus::Resolved => counts.resolved += 1,
        }
        counts
    });

    AdminStats {
        blood_donors: ApprovalCounts::count(donors.iter().map(|d| d.status)),
        hospital_staff: ApprovalCounts::count(staff.iter().map(|s| s.status)),
        emergency_requests,
    }
}

/// Snapshot of every table
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Export {
    /// Snapshot time
    pub exported_at: DateTime<Utc>,
    /// Donors
    pub blood_donors: Vec<Donor>,
    /// Staff accounts
    pub hospital_staff: Vec<StaffMember>,
    /// Emergency requests
    pub emergency_requests: Vec<EmergencyRequest>,
}
