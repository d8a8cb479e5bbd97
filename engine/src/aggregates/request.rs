//! Emergency request lifecycle.
//!
//! Owns request status transitions (`Pending_Admin → Active → Resolved`) and
//! each request's donor response ledger. Two transitions reach beyond this
//! table, and both run as effects once the requests table is saved:
//!
//! 1. Activation runs the [`MatchingOrchestrator`] and feeds the delivered
//!    count back as [`EmergencyAction::ActivationRecorded`].
//! 2. A successful donation books the donation on the donor record.
//!
//! When the donors table cannot be read or written the effect feeds back a
//! compensation event (`ActivationCompensated` or `DonationCompensated`)
//! that undoes the request-side change, so the operation can be retried.

use crate::error::{LifecycleError, ServiceError};
use crate::matching::{MatchingOrchestrator, MatchingPolicy};
use crate::types::{
    Actor, ApprovalStatus, BloodRequirement, Donor, DonorReply, Email, EmergencyRequest, LedgerEntry, RecordId,
    RequestSource, RequestStatus, ResponseStatus, StaffMember,
};
use bloodbridge_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};
use bloodbridge_runtime::TableState;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

// ============================================================================
// State
// ============================================================================

/// Emergency requests table state
#[derive(Clone, Debug, Default)]
pub struct EmergencyState {
    /// Requests in stored order
    pub requests: Vec<EmergencyRequest>,
    /// Rejection of the last command, if any
    pub last_error: Option<LifecycleError>,
    /// Ledger slots expired by the last command (not persisted)
    pub expired_slots: usize,
}

impl EmergencyState {
    /// Request by id
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<&EmergencyRequest> {
        self.requests.iter().find(|r| &r.id == id)
    }

    fn get_mut(&mut self, id: &RecordId) -> Option<&mut EmergencyRequest> {
        self.requests.iter_mut().find(|r| &r.id == id)
    }
}

impl TableState for EmergencyState {
    type Record = EmergencyRequest;

    fn from_records(records: Vec<EmergencyRequest>) -> Self {
        Self {
            requests: records,
            last_error: None,
            expired_slots: 0,
        }
    }

    fn to_records(&self) -> Vec<EmergencyRequest> {
        self.requests.clone()
    }
}

/// Emergency request form, shared by the staff and public entry points
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestForm {
    /// Hospital name; staff requests default to the staff member's hospital
    pub hospital_name: String,
    /// Patient name
    pub patient_name: String,
    /// Blood type label or `"Any"`
    pub blood_type: String,
    /// Units needed
    pub units_needed: String,
    /// Patient condition
    pub condition: String,
    /// When the blood is needed
    pub required_time: String,
    /// Requester contact
    pub contact: String,
    /// Location link or address
    pub location: String,
    /// Latitude, 0 when unknown
    pub lat: f64,
    /// Longitude, 0 when unknown
    pub lng: f64,
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the emergency request lifecycle
#[derive(Clone, Debug)]
pub enum EmergencyAction {
    // Commands
    /// Submit a request. Approved staff requests activate immediately; any
    /// other requester creates a `Pending_Admin` public request.
    CreateRequest {
        /// New record id
        id: RecordId,
        /// Submitter
        requester: Actor,
        /// Submitted form
        form: RequestForm,
    },

    /// Admin status change
    SetStatus {
        /// Caller
        actor: Actor,
        /// Request to change
        request_id: RecordId,
        /// Target status
        status: RequestStatus,
    },

    /// Donor accepts or declines inside the response window
    Respond {
        /// Responding donor
        donor: Email,
        /// Request answered
        request_id: RecordId,
        /// Answer
        reply: DonorReply,
    },

    /// Requester confirms whether an accepted donor donated
    ConfirmDonation {
        /// Request
        request_id: RecordId,
        /// Donor whose donation is confirmed
        donor: Email,
        /// Donation happened
        success: bool,
    },

    /// Mark unanswered slots of lapsed windows as `Expired`
    ExpireStaleSlots {
        /// Current donor pool
        donors: Vec<Donor>,
    },

    /// Hard delete (admin only)
    DeleteRequest {
        /// Caller
        actor: Actor,
        /// Request to delete
        request_id: RecordId,
    },

    // Events
    /// Request was created
    RequestCreated {
        /// The new request
        request: Box<EmergencyRequest>,
    },

    /// Plain status write
    StatusChanged {
        /// Request
        request_id: RecordId,
        /// New status
        status: RequestStatus,
    },

    /// `Pending_Admin → Active`; the response window opens
    RequestActivated {
        /// Request
        request_id: RecordId,
        /// Window start
        notified_at: DateTime<Utc>,
    },

    /// Matching finished for an activation (fed back by the activation effect)
    ActivationRecorded {
        /// Request
        request_id: RecordId,
        /// Qualifying donors alerted
        attempted: usize,
        /// Alerts delivered
        notified: usize,
    },

    /// Activation rolled back because the donor pool could not be read.
    /// A public request returns to `Pending_Admin`; a staff request is
    /// withdrawn.
    ActivationCompensated {
        /// Request
        request_id: RecordId,
        /// Compensation reason
        reason: String,
    },

    /// Donor answered
    ResponseRecorded {
        /// Request
        request_id: RecordId,
        /// Donor
        donor: Email,
        /// `Accepted` or `Declined`
        status: ResponseStatus,
        /// Response time
        at: DateTime<Utc>,
    },

    /// Donation outcome confirmed
    DonationConfirmed {
        /// Request
        request_id: RecordId,
        /// Donor
        donor: Email,
        /// Donation happened
        success: bool,
        /// Confirmation time
        at: DateTime<Utc>,
    },

    /// Donation could not be booked on the donor record; the ledger entry
    /// goes back to `Accepted`
    DonationCompensated {
        /// Request
        request_id: RecordId,
        /// Donor
        donor: Email,
        /// Request status before the confirmation
        restore_status: RequestStatus,
        /// Compensation reason
        reason: String,
    },

    /// Unanswered slots expired
    SlotsExpired {
        /// `(request, donor)` pairs that received an `Expired` entry
        expired: Vec<(RecordId, Email)>,
        /// Expiry time
        at: DateTime<Utc>,
    },

    /// Request was deleted
    RequestDeleted {
        /// Request
        request_id: RecordId,
    },

    /// Command validation failed
    ValidationFailed {
        /// Rejection
        error: LifecycleError,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Access to the donors table from request effects.
///
/// Futures are `'static` so they can run inside effects after the requests
/// table lock has been released.
pub trait DonorDirectory: Send + Sync {
    /// Current donor pool
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the donors table cannot be read.
    fn donors(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Donor>, ServiceError>> + Send>>;

    /// Book a confirmed donation for `email` on `on`
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the donor is unknown or the write fails.
    fn record_donation(
        &self,
        email: Email,
        on: NaiveDate,
    ) -> Pin<Box<dyn Future<Output = Result<(), ServiceError>> + Send>>;
}

/// Environment dependencies for the request lifecycle
#[derive(Clone)]
pub struct EmergencyEnvironment {
    /// Clock for timestamps and window checks
    pub clock: Arc<dyn Clock>,
    /// Window length
    pub policy: MatchingPolicy,
    /// Runs matching on activation
    pub orchestrator: Arc<MatchingOrchestrator>,
    /// Donor pool and donation bookkeeping
    pub donors: Arc<dyn DonorDirectory>,
}

impl EmergencyEnvironment {
    /// Creates a new `EmergencyEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        policy: MatchingPolicy,
        orchestrator: Arc<MatchingOrchestrator>,
        donors: Arc<dyn DonorDirectory>,
    ) -> Self {
        Self {
            clock,
            policy,
            orchestrator,
            donors,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the emergency request lifecycle
#[derive(Clone, Debug, Default)]
pub struct EmergencyReducer;

impl EmergencyReducer {
    /// Creates a new `EmergencyReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn missing_fields(fields: &[(&'static str, &str)]) -> Result<(), LifecycleError> {
        let missing: Vec<_> = fields
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| *field)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )))
        }
    }

    fn validate_staff(staff: &StaffMember) -> Result<(), LifecycleError> {
        if staff.status == ApprovalStatus::Approved {
            Ok(())
        } else {
            Err(LifecycleError::Unauthorized(
                "Account not approved. Cannot raise requests.".to_string(),
            ))
        }
    }

    fn parse_requirement(raw: &str) -> Result<BloodRequirement, LifecycleError> {
        raw.parse().map_err(LifecycleError::Validation)
    }

    fn validate_admin(actor: &Actor, action: &str) -> Result<(), LifecycleError> {
        if actor.is_admin() {
            Ok(())
        } else {
            Err(LifecycleError::Unauthorized(format!("only admins may {action}")))
        }
    }

    fn find<'a>(state: &'a EmergencyState, request_id: &RecordId) -> Result<&'a EmergencyRequest, LifecycleError> {
        state
            .get(request_id)
            .ok_or_else(|| LifecycleError::NotFound(format!("Request {request_id}")))
    }

    /// Builds the request a `CreateRequest` command describes
    fn build_request(
        id: RecordId,
        requester: &Actor,
        form: RequestForm,
        now: DateTime<Utc>,
    ) -> Result<EmergencyRequest, LifecycleError> {
        let (source, hospital_name) = match requester {
            Actor::Staff(staff) => {
                Self::validate_staff(staff)?;
                Self::missing_fields(&[
                    ("patient name", &form.patient_name),
                    ("blood type", &form.blood_type),
                    ("contact", &form.contact),
                ])?;
                let hospital = if form.hospital_name.trim().is_empty() {
                    staff.hospital_name.clone()
                } else {
                    form.hospital_name.trim().to_string()
                };
                (RequestSource::HospitalStaff, hospital)
            },
            Actor::Admin | Actor::Donor(_) | Actor::Public => {
                Self::missing_fields(&[
                    ("hospital name", &form.hospital_name),
                    ("patient name", &form.patient_name),
                    ("blood type", &form.blood_type),
                    ("contact", &form.contact),
                ])?;
                (RequestSource::Public, form.hospital_name.trim().to_string())
            },
        };
        let blood_type = Self::parse_requirement(&form.blood_type)?;

        let (status, notified_at) = match source {
            RequestSource::HospitalStaff => (RequestStatus::Active, Some(now)),
            RequestSource::Public => (RequestStatus::PendingAdmin, None),
        };

        Ok(EmergencyRequest {
            id,
            source,
            hospital_name,
            patient_name: form.patient_name.trim().to_string(),
            blood_type,
            units_needed: form.units_needed.trim().to_string(),
            condition: form.condition.trim().to_string(),
            required_time: form.required_time.trim().to_string(),
            contact: form.contact.trim().to_string(),
            location: form.location.trim().to_string(),
            lat: form.lat,
            lng: form.lng,
            status,
            notified_at,
            notified_count: 0,
            donor_responses: BTreeMap::new(),
            created_at: now,
        })
    }

    fn validate_transition(from: RequestStatus, to: RequestStatus) -> Result<(), LifecycleError> {
        if to < from {
            Err(LifecycleError::Validation(format!(
                "Cannot move request from {from} back to {to}"
            )))
        } else {
            Ok(())
        }
    }

    fn validate_response(
        request: &EmergencyRequest,
        donor: &Email,
        policy: &MatchingPolicy,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if request.status != RequestStatus::Active {
            return Err(LifecycleError::Validation(format!(
                "Request {} is not active ({})",
                request.id, request.status
            )));
        }
        let Some(notified_at) = request.notified_at else {
            return Err(LifecycleError::Validation(format!(
                "Request {} has no response window",
                request.id
            )));
        };

        let window = policy.window(notified_at);
        if window.is_expired(now) {
            return Err(LifecycleError::WindowExpired {
                elapsed_secs: window.elapsed(now).num_seconds(),
                window_secs: window.duration().num_seconds(),
            });
        }

        if let Some(entry) = request.response_of(donor) {
            return Err(LifecycleError::AlreadyResponded {
                donor: donor.clone(),
                status: entry.status,
            });
        }
        Ok(())
    }

    fn validate_confirmation(request: &EmergencyRequest, donor: &Email) -> Result<(), LifecycleError> {
        let entry = request
            .response_of(donor)
            .ok_or_else(|| LifecycleError::NotFound(format!("Response of {donor} to request {}", request.id)))?;
        if entry.status == ResponseStatus::Accepted {
            Ok(())
        } else {
            Err(LifecycleError::Validation(format!(
                "Only accepted responses can be confirmed; {donor} is {}",
                entry.status
            )))
        }
    }

    /// Unanswered slots of every `Active` request whose window has lapsed
    fn stale_slots(
        state: &EmergencyState,
        donors: &[Donor],
        policy: &MatchingPolicy,
        now: DateTime<Utc>,
    ) -> Vec<(RecordId, Email)> {
        state
            .requests
            .iter()
            .filter(|r| r.status == RequestStatus::Active)
            .filter(|r| r.notified_at.is_some_and(|at| policy.window(at).is_expired(now)))
            .flat_map(|request| {
                donors
                    .iter()
                    .filter(|d| d.status == ApprovalStatus::Approved)
                    .filter(|d| request.blood_type.accepts(d.blood_group))
                    .filter(|d| !request.donor_responses.contains_key(&d.email))
                    .map(|d| (request.id.clone(), d.email.clone()))
            })
            .collect()
    }

    /// Effect that matches and alerts donors for a freshly activated request
    fn activation_effect(request: &EmergencyRequest, env: &EmergencyEnvironment) -> Effect<EmergencyAction> {
        let request = request.clone();
        let orchestrator = Arc::clone(&env.orchestrator);
        let directory = Arc::clone(&env.donors);
        let today = env.clock.today();

        Effect::future(async move {
            let donors = match directory.donors().await {
                Ok(donors) => donors,
                Err(e) => {
                    tracing::error!(request_id = %request.id, error = %e, "Could not load donors, rolling back activation");
                    return Some(EmergencyAction::ActivationCompensated {
                        request_id: request.id,
                        reason: e.to_string(),
                    });
                },
            };
            let activation = orchestrator.activate(&request, &donors, today).await;
            Some(EmergencyAction::ActivationRecorded {
                request_id: activation.request_id,
                attempted: activation.attempted,
                notified: activation.notified,
            })
        })
    }

    /// Effect that books a confirmed donation on the donor record
    fn donation_effect(
        request_id: RecordId,
        donor: Email,
        restore_status: RequestStatus,
        env: &EmergencyEnvironment,
    ) -> Effect<EmergencyAction> {
        let directory = Arc::clone(&env.donors);
        let on = env.clock.today();
        Effect::future(async move {
            let Err(e) = directory.record_donation(donor.clone(), on).await else {
                return None;
            };
            tracing::error!(%request_id, %donor, error = %e, "Donor record not updated, rolling back confirmation");
            Some(EmergencyAction::DonationCompensated {
                request_id,
                donor,
                restore_status,
                reason: e.to_string(),
            })
        })
    }

    /// Applies an event to state
    fn apply_event(state: &mut EmergencyState, action: &EmergencyAction) {
        match action {
            EmergencyAction::RequestCreated { request } => {
                state.requests.push((**request).clone());
                state.last_error = None;
            },
            EmergencyAction::StatusChanged { request_id, status } => {
                if let Some(request) = state.get_mut(request_id) {
                    request.status = *status;
                }
                state.last_error = None;
            },
            EmergencyAction::RequestActivated {
                request_id,
                notified_at,
            } => {
                if let Some(request) = state.get_mut(request_id) {
                    request.status = RequestStatus::Active;
                    request.notified_at = Some(*notified_at);
                }
                state.last_error = None;
            },
            EmergencyAction::ActivationRecorded {
                request_id, notified, ..
            } => {
                if let Some(request) = state.get_mut(request_id) {
                    request.notified_count = u32::try_from(*notified).unwrap_or(u32::MAX);
                }
                state.last_error = None;
            },
            EmergencyAction::ActivationCompensated { request_id, .. } => {
                match state.get(request_id).map(|r| (r.source, r.status)) {
                    Some((RequestSource::HospitalStaff, _)) => state.requests.retain(|r| &r.id != request_id),
                    Some((RequestSource::Public, RequestStatus::Active)) => {
                        if let Some(request) = state.get_mut(request_id) {
                            request.status = RequestStatus::PendingAdmin;
                            request.notified_at = None;
                            request.notified_count = 0;
                        }
                    },
                    Some((RequestSource::Public, _)) | None => {},
                }
                state.last_error = None;
            },
            EmergencyAction::ResponseRecorded {
                request_id,
                donor,
                status,
                at,
            } => {
                if let Some(request) = state.get_mut(request_id) {
                    request.donor_responses.insert(
                        donor.clone(),
                        LedgerEntry {
                            status: *status,
                            at: *at,
                            confirmed_at: None,
                        },
                    );
                }
                state.last_error = None;
            },
            EmergencyAction::DonationConfirmed {
                request_id,
                donor,
                success,
                at,
            } => {
                if let Some(request) = state.get_mut(request_id) {
                    if let Some(entry) = request.donor_responses.get_mut(donor) {
                        entry.status = if *success {
                            ResponseStatus::Donated
                        } else {
                            ResponseStatus::Failed
                        };
                        entry.confirmed_at = Some(*at);
                    }
                    if *success {
                        request.status = RequestStatus::Resolved;
                    }
                }
                state.last_error = None;
            },
            EmergencyAction::DonationCompensated {
                request_id,
                donor,
                restore_status,
                ..
            } => {
                if let Some(request) = state.get_mut(request_id) {
                    if let Some(entry) = request.donor_responses.get_mut(donor) {
                        if entry.status == ResponseStatus::Donated {
                            entry.status = ResponseStatus::Accepted;
                            entry.confirmed_at = None;
                        }
                    }
                    // Another donor's booked donation keeps the request resolved
                    let donated = request
                        .donor_responses
                        .values()
                        .any(|entry| entry.status == ResponseStatus::Donated);
                    if !donated {
                        request.status = *restore_status;
                    }
                }
                state.last_error = None;
            },
            EmergencyAction::SlotsExpired { expired, at } => {
                state.expired_slots = 0;
                for (request_id, donor) in expired {
                    let Some(request) = state.get_mut(request_id) else {
                        continue;
                    };
                    // First terminal write wins
                    if !request.donor_responses.contains_key(donor) {
                        request.donor_responses.insert(
                            donor.clone(),
                            LedgerEntry {
                                status: ResponseStatus::Expired,
                                at: *at,
                                confirmed_at: None,
                            },
                        );
                        state.expired_slots += 1;
                    }
                }
                state.last_error = None;
            },
            EmergencyAction::RequestDeleted { request_id } => {
                state.requests.retain(|r| &r.id != request_id);
                state.last_error = None;
            },
            EmergencyAction::ValidationFailed { error } => {
                state.last_error = Some(error.clone());
            },
            // Commands don't modify state
            EmergencyAction::CreateRequest { .. }
            | EmergencyAction::SetStatus { .. }
            | EmergencyAction::Respond { .. }
            | EmergencyAction::ConfirmDonation { .. }
            | EmergencyAction::ExpireStaleSlots { .. }
            | EmergencyAction::DeleteRequest { .. } => {},
        }
    }

    fn reject(state: &mut EmergencyState, error: LifecycleError) -> SmallVec<[Effect<EmergencyAction>; 4]> {
        tracing::debug!(%error, "Request command rejected");
        Self::apply_event(state, &EmergencyAction::ValidationFailed { error });
        SmallVec::new()
    }
}

impl Reducer for EmergencyReducer {
    type State = EmergencyState;
    type Action = EmergencyAction;
    type Environment = EmergencyEnvironment;

    #[allow(clippy::too_many_lines)] // one arm per command
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            EmergencyAction::CreateRequest { id, requester, form } => {
                let request = match Self::build_request(id, &requester, form, env.clock.now()) {
                    Ok(request) => request,
                    Err(error) => return Self::reject(state, error),
                };

                tracing::info!(
                    request_id = %request.id,
                    source = ?request.source,
                    status = %request.status,
                    blood_type = %request.blood_type,
                    "Emergency request created"
                );
                let effects = if request.status == RequestStatus::Active {
                    smallvec![Self::activation_effect(&request, env)]
                } else {
                    SmallVec::new()
                };
                Self::apply_event(state, &EmergencyAction::RequestCreated { request: Box::new(request) });
                effects
            },

            EmergencyAction::SetStatus {
                actor,
                request_id,
                status,
            } => {
                let current = match Self::validate_admin(&actor, "change request status")
                    .and_then(|()| Self::find(state, &request_id))
                {
                    Ok(request) => request.status,
                    Err(error) => return Self::reject(state, error),
                };
                if let Err(error) = Self::validate_transition(current, status) {
                    return Self::reject(state, error);
                }

                if current == status {
                    // Re-setting the current status never re-triggers matching
                    state.last_error = None;
                    return SmallVec::new();
                }

                if current == RequestStatus::PendingAdmin && status == RequestStatus::Active {
                    let notified_at = env.clock.now();
                    tracing::info!(%request_id, %notified_at, "Public request approved, notifying donors");
                    Self::apply_event(
                        state,
                        &EmergencyAction::RequestActivated {
                            request_id: request_id.clone(),
                            notified_at,
                        },
                    );
                    return match state.get(&request_id) {
                        Some(request) => smallvec![Self::activation_effect(request, env)],
                        None => SmallVec::new(),
                    };
                }

                tracing::info!(%request_id, from = %current, to = %status, "Request status changed");
                Self::apply_event(state, &EmergencyAction::StatusChanged { request_id, status });
                SmallVec::new()
            },

            EmergencyAction::Respond {
                donor,
                request_id,
                reply,
            } => {
                let now = env.clock.now();
                if let Err(error) = Self::find(state, &request_id)
                    .and_then(|request| Self::validate_response(request, &donor, &env.policy, now))
                {
                    return Self::reject(state, error);
                }

                let status = ResponseStatus::from(reply);
                tracing::info!(%request_id, %donor, %status, "Donor responded");
                Self::apply_event(
                    state,
                    &EmergencyAction::ResponseRecorded {
                        request_id,
                        donor,
                        status,
                        at: now,
                    },
                );
                SmallVec::new()
            },

            EmergencyAction::ConfirmDonation {
                request_id,
                donor,
                success,
            } => {
                let restore_status = match Self::find(state, &request_id)
                    .and_then(|request| Self::validate_confirmation(request, &donor).map(|()| request.status))
                {
                    Ok(status) => status,
                    Err(error) => return Self::reject(state, error),
                };

                let at = env.clock.now();
                tracing::info!(%request_id, %donor, success, "Donation confirmed");
                Self::apply_event(
                    state,
                    &EmergencyAction::DonationConfirmed {
                        request_id: request_id.clone(),
                        donor: donor.clone(),
                        success,
                        at,
                    },
                );
                if success {
                    smallvec![Self::donation_effect(request_id, donor, restore_status, env)]
                } else {
                    SmallVec::new()
                }
            },

            EmergencyAction::ExpireStaleSlots { donors } => {
                let now = env.clock.now();
                let expired = Self::stale_slots(state, &donors, &env.policy, now);
                if expired.is_empty() {
                    state.last_error = None;
                    return SmallVec::new();
                }

                tracing::info!(count = expired.len(), "Expiring unanswered donor slots");
                Self::apply_event(state, &EmergencyAction::SlotsExpired { expired, at: now });
                SmallVec::new()
            },

            EmergencyAction::DeleteRequest { actor, request_id } => {
                if let Err(error) = Self::validate_admin(&actor, "delete requests")
                    .and_then(|()| Self::find(state, &request_id).map(|_| ()))
                {
                    return Self::reject(state, error);
                }

                tracing::info!(%request_id, "Request deleted");
                Self::apply_event(state, &EmergencyAction::RequestDeleted { request_id });
                SmallVec::new()
            },

            // ========== Events ==========
            event => {
                Self::apply_event(state, &event);
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mocks::RecordingNotifier;
    use crate::types::BloodType;
    use bloodbridge_testing::{FixedClock, ReducerTest, Rejecting, assertions, test_clock};
    use chrono::Duration;

    impl Rejecting for EmergencyState {
        type Rejection = LifecycleError;

        fn rejection(&self) -> Option<&LifecycleError> {
            self.last_error.as_ref()
        }
    }

    struct NoDonors;

    impl DonorDirectory for NoDonors {
        fn donors(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Donor>, ServiceError>> + Send>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn record_donation(
            &self,
            _email: Email,
            _on: NaiveDate,
        ) -> Pin<Box<dyn Future<Output = Result<(), ServiceError>> + Send>> {
            Box::pin(async { Ok(()) })
        }
    }

    /// Donors table that can be neither read nor written
    struct UnavailableDonors;

    impl DonorDirectory for UnavailableDonors {
        fn donors(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Donor>, ServiceError>> + Send>> {
            Box::pin(async { Err(LifecycleError::NotFound("Donors table".to_string()).into()) })
        }

        fn record_donation(
            &self,
            email: Email,
            _on: NaiveDate,
        ) -> Pin<Box<dyn Future<Output = Result<(), ServiceError>> + Send>> {
            Box::pin(async move { Err(LifecycleError::NotFound(format!("Donor {email}")).into()) })
        }
    }

    fn env_over(clock: FixedClock, directory: Arc<dyn DonorDirectory>) -> EmergencyEnvironment {
        let orchestrator = MatchingOrchestrator::new(
            Arc::new(RecordingNotifier::new()),
            MatchingPolicy::default(),
            "http://bb.test",
        );
        EmergencyEnvironment::new(Arc::new(clock), MatchingPolicy::default(), Arc::new(orchestrator), directory)
    }

    fn env_with(clock: FixedClock) -> EmergencyEnvironment {
        env_over(clock, Arc::new(NoDonors))
    }

    async fn feedback_of(effects: SmallVec<[Effect<EmergencyAction>; 4]>) -> Vec<EmergencyAction> {
        let mut produced = Vec::new();
        for effect in effects {
            if let Effect::Future(fut) = effect {
                produced.extend(fut.await);
            }
        }
        produced
    }

    fn env() -> EmergencyEnvironment {
        env_with(test_clock())
    }

    fn staff(status: ApprovalStatus) -> StaffMember {
        StaffMember {
            id: RecordId::new("s1"),
            staff_email: Email::from("nurse@citygeneral.org"),
            hospital_name: "City General".to_string(),
            status,
        }
    }

    fn form() -> RequestForm {
        RequestForm {
            hospital_name: "City General".to_string(),
            patient_name: "R. Iyer".to_string(),
            blood_type: "O+".to_string(),
            units_needed: "2".to_string(),
            contact: "555-0199".to_string(),
            lat: 12.97,
            lng: 77.59,
            ..RequestForm::default()
        }
    }

    fn create_public(id: &str) -> EmergencyAction {
        EmergencyAction::CreateRequest {
            id: RecordId::new(id),
            requester: Actor::Public,
            form: form(),
        }
    }

    fn create_staff(id: &str) -> EmergencyAction {
        EmergencyAction::CreateRequest {
            id: RecordId::new(id),
            requester: Actor::Staff(staff(ApprovalStatus::Approved)),
            form: form(),
        }
    }

    fn respond(donor: &str, reply: DonorReply) -> EmergencyAction {
        EmergencyAction::Respond {
            donor: Email::from(donor),
            request_id: RecordId::new("r1"),
            reply,
        }
    }

    #[test]
    fn public_request_waits_for_admin() {
        ReducerTest::new(EmergencyReducer::new(), env())
            .when(create_public("r1"))
            .then_state(|state| {
                let request = &state.requests[0];
                assert_eq!(request.status, RequestStatus::PendingAdmin);
                assert_eq!(request.source, RequestSource::Public);
                assert!(request.notified_at.is_none());
            })
            .then_effects(assertions::no_follow_up)
            .run();
    }

    #[test]
    fn staff_request_activates_immediately() {
        let mut staff_form = form();
        staff_form.hospital_name = String::new();

        ReducerTest::new(EmergencyReducer::new(), env())
            .when(EmergencyAction::CreateRequest {
                id: RecordId::new("r1"),
                requester: Actor::Staff(staff(ApprovalStatus::Approved)),
                form: staff_form,
            })
            .then_state(|state| {
                let request = &state.requests[0];
                assert_eq!(request.status, RequestStatus::Active);
                assert_eq!(request.hospital_name, "City General");
                assert_eq!(request.notified_at, Some(test_clock().now()));
            })
            .then_effects(assertions::follow_ups(1))
            .run();
    }

    #[test]
    fn unapproved_staff_cannot_raise_requests() {
        ReducerTest::new(EmergencyReducer::new(), env())
            .when(EmergencyAction::CreateRequest {
                id: RecordId::new("r1"),
                requester: Actor::Staff(staff(ApprovalStatus::Pending)),
                form: form(),
            })
            .then_rejected(|error| assert_eq!(error.kind(), ErrorKind::Unauthorized))
            .then_state(|state| assert!(state.requests.is_empty()))
            .then_effects(assertions::no_follow_up)
            .run();
    }

    #[test]
    fn public_request_requires_hospital_and_valid_blood_type() {
        let mut no_hospital = form();
        no_hospital.hospital_name = " ".to_string();

        ReducerTest::new(EmergencyReducer::new(), env())
            .when(EmergencyAction::CreateRequest {
                id: RecordId::new("r1"),
                requester: Actor::Public,
                form: no_hospital,
            })
            .then_rejected(|error| {
                assert_eq!(
                    *error,
                    LifecycleError::Validation("Missing required fields: hospital name".to_string())
                );
            })
            .run();

        let mut bad_type = form();
        bad_type.blood_type = "Q".to_string();

        ReducerTest::new(EmergencyReducer::new(), env())
            .when(EmergencyAction::CreateRequest {
                id: RecordId::new("r1"),
                requester: Actor::Public,
                form: bad_type,
            })
            .then_rejected(|error| assert_eq!(error.kind(), ErrorKind::Validation))
            .run();
    }

    #[test]
    fn admin_approval_stamps_notified_at_and_triggers_matching() {
        ReducerTest::new(EmergencyReducer::new(), env())
            .given([create_public("r1")])
            .when(EmergencyAction::SetStatus {
                actor: Actor::Admin,
                request_id: RecordId::new("r1"),
                status: RequestStatus::Active,
            })
            .then_state(|state| {
                assert_eq!(state.requests[0].status, RequestStatus::Active);
                assert_eq!(state.requests[0].notified_at, Some(test_clock().now()));
            })
            .then_effects(assertions::follow_ups(1))
            .run();
    }

    #[test]
    fn reactivating_an_active_request_does_not_rematch() {
        ReducerTest::new(EmergencyReducer::new(), env())
            .given([create_staff("r1")])
            .when(EmergencyAction::SetStatus {
                actor: Actor::Admin,
                request_id: RecordId::new("r1"),
                status: RequestStatus::Active,
            })
            .then_accepted()
            .then_effects(assertions::no_follow_up)
            .run();
    }

    #[test]
    fn status_changes_are_admin_only_and_monotonic() {
        ReducerTest::new(EmergencyReducer::new(), env())
            .given([create_public("r1")])
            .when(EmergencyAction::SetStatus {
                actor: Actor::Public,
                request_id: RecordId::new("r1"),
                status: RequestStatus::Active,
            })
            .then_rejected(|error| assert_eq!(error.kind(), ErrorKind::Unauthorized))
            .then_state(|state| assert_eq!(state.requests[0].status, RequestStatus::PendingAdmin))
            .then_effects(assertions::no_follow_up)
            .run();

        ReducerTest::new(EmergencyReducer::new(), env())
            .given([create_staff("r1")])
            .when(EmergencyAction::SetStatus {
                actor: Actor::Admin,
                request_id: RecordId::new("r1"),
                status: RequestStatus::PendingAdmin,
            })
            .then_rejected(|error| assert_eq!(error.kind(), ErrorKind::Validation))
            .then_state(|state| assert_eq!(state.requests[0].status, RequestStatus::Active))
            .run();

        ReducerTest::new(EmergencyReducer::new(), env())
            .given([create_public("r1")])
            .when(EmergencyAction::SetStatus {
                actor: Actor::Admin,
                request_id: RecordId::new("r1"),
                status: RequestStatus::Resolved,
            })
            .then_state(|state| {
                assert_eq!(state.requests[0].status, RequestStatus::Resolved);
                assert!(state.requests[0].notified_at.is_none());
            })
            .then_effects(assertions::no_follow_up)
            .run();
    }

    #[test]
    fn response_at_window_boundary_is_on_time() {
        let clock = test_clock();
        let env = env_with(clock.clone());
        let reducer = EmergencyReducer::new();
        let mut state = EmergencyState::default();

        let _ = reducer.reduce(&mut state, create_staff("r1"), &env);
        clock.advance(Duration::seconds(900));
        let _ = reducer.reduce(&mut state, respond("a@x.org", DonorReply::Accepted), &env);
        assert!(state.last_error.is_none());

        clock.advance(Duration::seconds(1));
        let _ = reducer.reduce(&mut state, respond("b@x.org", DonorReply::Declined), &env);
        assert_eq!(
            state.last_error,
            Some(LifecycleError::WindowExpired {
                elapsed_secs: 901,
                window_secs: 900
            })
        );

        let ledger = &state.requests[0].donor_responses;
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[&Email::from("a@x.org")].status, ResponseStatus::Accepted);
    }

    #[test]
    fn donors_respond_at_most_once() {
        ReducerTest::new(EmergencyReducer::new(), env())
            .given([create_staff("r1"), respond("a@x.org", DonorReply::Declined)])
            .when(respond("A@X.org", DonorReply::Accepted))
            .then_rejected(|error| {
                assert_eq!(
                    *error,
                    LifecycleError::AlreadyResponded {
                        donor: Email::from("a@x.org"),
                        status: ResponseStatus::Declined,
                    }
                );
            })
            .then_state(|state| {
                let entry = state.requests[0].response_of(&Email::from("a@x.org")).unwrap();
                assert_eq!(entry.status, ResponseStatus::Declined);
            })
            .run();
    }

    #[test]
    fn responses_need_an_active_request() {
        ReducerTest::new(EmergencyReducer::new(), env())
            .given([create_public("r1")])
            .when(respond("a@x.org", DonorReply::Accepted))
            .then_rejected(|error| assert_eq!(error.kind(), ErrorKind::Validation))
            .then_state(|state| assert!(state.requests[0].donor_responses.is_empty()))
            .run();

        ReducerTest::new(EmergencyReducer::new(), env())
            .when(respond("a@x.org", DonorReply::Accepted))
            .then_rejected(|error| assert_eq!(error.kind(), ErrorKind::NotFound))
            .run();
    }

    #[test]
    fn successful_confirmation_resolves_and_books_donation() {
        ReducerTest::new(EmergencyReducer::new(), env())
            .given([create_staff("r1"), respond("a@x.org", DonorReply::Accepted)])
            .when(EmergencyAction::ConfirmDonation {
                request_id: RecordId::new("r1"),
                donor: Email::from("A@x.org"),
                success: true,
            })
            .then_state(|state| {
                let request = &state.requests[0];
                assert_eq!(request.status, RequestStatus::Resolved);
                let entry = request.response_of(&Email::from("a@x.org")).unwrap();
                assert_eq!(entry.status, ResponseStatus::Donated);
                assert_eq!(entry.confirmed_at, Some(test_clock().now()));
            })
            .then_effects(assertions::follow_ups(1))
            .run();
    }

    #[test]
    fn failed_confirmation_leaves_request_active() {
        ReducerTest::new(EmergencyReducer::new(), env())
            .given([create_staff("r1"), respond("a@x.org", DonorReply::Accepted)])
            .when(EmergencyAction::ConfirmDonation {
                request_id: RecordId::new("r1"),
                donor: Email::from("a@x.org"),
                success: false,
            })
            .then_state(|state| {
                let request = &state.requests[0];
                assert_eq!(request.status, RequestStatus::Active);
                assert_eq!(request.donor_responses[&Email::from("a@x.org")].status, ResponseStatus::Failed);
            })
            .then_effects(assertions::no_follow_up)
            .run();
    }

    #[test]
    fn confirmation_requires_an_accepted_entry() {
        ReducerTest::new(EmergencyReducer::new(), env())
            .given([create_staff("r1")])
            .when(EmergencyAction::ConfirmDonation {
                request_id: RecordId::new("r1"),
                donor: Email::from("nobody@x.org"),
                success: true,
            })
            .then_rejected(|error| assert_eq!(error.kind(), ErrorKind::NotFound))
            .then_state(|state| assert_eq!(state.requests[0].status, RequestStatus::Active))
            .then_effects(assertions::no_follow_up)
            .run();

        ReducerTest::new(EmergencyReducer::new(), env())
            .given([create_staff("r1"), respond("a@x.org", DonorReply::Declined)])
            .when(EmergencyAction::ConfirmDonation {
                request_id: RecordId::new("r1"),
                donor: Email::from("a@x.org"),
                success: true,
            })
            .then_rejected(|error| assert_eq!(error.kind(), ErrorKind::Validation))
            .run();
    }

    fn pool_donor(email: &str, blood_group: BloodType, status: ApprovalStatus) -> Donor {
        Donor {
            id: RecordId::new(email),
            name: email.to_string(),
            contact: "555".to_string(),
            email: Email::from(email),
            blood_group,
            location: String::new(),
            lat: 12.97,
            lng: 77.59,
            age_confirmed: true,
            status,
            total_donations: 0,
            lives_saved: 0,
            last_donation: None,
            cooldown_until: None,
            created_at: DateTime::<Utc>::default(),
        }
    }

    #[test]
    fn sweep_expires_only_unanswered_matching_donors_after_the_window() {
        let clock = test_clock();
        let env = env_with(clock.clone());
        let reducer = EmergencyReducer::new();
        let mut state = EmergencyState::default();
        let pool = vec![
            pool_donor("silent@x.org", BloodType::OPositive, ApprovalStatus::Approved),
            pool_donor("answered@x.org", BloodType::OPositive, ApprovalStatus::Approved),
            pool_donor("other@x.org", BloodType::BNegative, ApprovalStatus::Approved),
            pool_donor("pending@x.org", BloodType::OPositive, ApprovalStatus::Pending),
        ];

        let _ = reducer.reduce(&mut state, create_staff("r1"), &env);
        let _ = reducer.reduce(&mut state, create_public("r2"), &env);
        let _ = reducer.reduce(&mut state, respond("answered@x.org", DonorReply::Accepted), &env);

        clock.advance(Duration::seconds(900));
        let _ = reducer.reduce(&mut state, EmergencyAction::ExpireStaleSlots { donors: pool.clone() }, &env);
        assert!(state.requests[0].response_of(&Email::from("silent@x.org")).is_none());

        clock.advance(Duration::seconds(1));
        let _ = reducer.reduce(&mut state, EmergencyAction::ExpireStaleSlots { donors: pool }, &env);

        let active = &state.requests[0];
        assert_eq!(active.status, RequestStatus::Active);
        assert_eq!(active.donor_responses.len(), 2);
        assert_eq!(active.donor_responses[&Email::from("silent@x.org")].status, ResponseStatus::Expired);
        assert_eq!(active.donor_responses[&Email::from("answered@x.org")].status, ResponseStatus::Accepted);
        assert!(state.requests[1].donor_responses.is_empty());
        assert_eq!(state.expired_slots, 1);
    }

    #[test]
    fn activation_outcome_updates_notified_count() {
        ReducerTest::new(EmergencyReducer::new(), env())
            .given([create_staff("r1")])
            .when(EmergencyAction::ActivationRecorded {
                request_id: RecordId::new("r1"),
                attempted: 4,
                notified: 3,
            })
            .then_state(|state| assert_eq!(state.requests[0].notified_count, 3))
            .then_effects(assertions::no_follow_up)
            .run();
    }

    #[tokio::test]
    async fn unbookable_donation_feeds_back_a_compensation() {
        let env = env_over(test_clock(), Arc::new(UnavailableDonors));
        let reducer = EmergencyReducer::new();
        let mut state = EmergencyState::default();
        let _ = reducer.reduce(&mut state, create_staff("r1"), &env);
        let _ = reducer.reduce(&mut state, respond("a@x.org", DonorReply::Accepted), &env);

        let effects = reducer.reduce(
            &mut state,
            EmergencyAction::ConfirmDonation {
                request_id: RecordId::new("r1"),
                donor: Email::from("a@x.org"),
                success: true,
            },
            &env,
        );
        assert_eq!(state.requests[0].status, RequestStatus::Resolved);

        let feedback = feedback_of(effects).await;
        assert!(matches!(
            feedback.as_slice(),
            [EmergencyAction::DonationCompensated {
                restore_status: RequestStatus::Active,
                reason,
                ..
            }] if reason == "Donor a@x.org not found"
        ));

        for action in feedback {
            let _ = reducer.reduce(&mut state, action, &env);
        }
        let request = &state.requests[0];
        assert_eq!(request.status, RequestStatus::Active);
        let entry = request.response_of(&Email::from("a@x.org")).unwrap();
        assert_eq!(entry.status, ResponseStatus::Accepted);
        assert!(entry.confirmed_at.is_none());
    }

    #[test]
    fn compensation_keeps_a_request_resolved_by_another_donation() {
        ReducerTest::new(EmergencyReducer::new(), env())
            .given([
                create_staff("r1"),
                respond("a@x.org", DonorReply::Accepted),
                respond("b@x.org", DonorReply::Accepted),
                EmergencyAction::ConfirmDonation {
                    request_id: RecordId::new("r1"),
                    donor: Email::from("a@x.org"),
                    success: true,
                },
                EmergencyAction::ConfirmDonation {
                    request_id: RecordId::new("r1"),
                    donor: Email::from("b@x.org"),
                    success: true,
                },
            ])
            .when(EmergencyAction::DonationCompensated {
                request_id: RecordId::new("r1"),
                donor: Email::from("b@x.org"),
                restore_status: RequestStatus::Resolved,
                reason: "write failed".to_string(),
            })
            .then_state(|state| {
                let request = &state.requests[0];
                assert_eq!(request.status, RequestStatus::Resolved);
                assert_eq!(request.donor_responses[&Email::from("a@x.org")].status, ResponseStatus::Donated);
                assert_eq!(request.donor_responses[&Email::from("b@x.org")].status, ResponseStatus::Accepted);
            })
            .then_effects(assertions::no_follow_up)
            .run();
    }

    #[tokio::test]
    async fn unreadable_donor_pool_rolls_back_activation() {
        let env = env_over(test_clock(), Arc::new(UnavailableDonors));
        let reducer = EmergencyReducer::new();
        let mut state = EmergencyState::default();

        let _ = reducer.reduce(&mut state, create_public("r1"), &env);
        let effects = reducer.reduce(
            &mut state,
            EmergencyAction::SetStatus {
                actor: Actor::Admin,
                request_id: RecordId::new("r1"),
                status: RequestStatus::Active,
            },
            &env,
        );
        for action in feedback_of(effects).await {
            assert!(matches!(action, EmergencyAction::ActivationCompensated { .. }));
            let _ = reducer.reduce(&mut state, action, &env);
        }
        let request = &state.requests[0];
        assert_eq!(request.status, RequestStatus::PendingAdmin);
        assert!(request.notified_at.is_none());

        let effects = reducer.reduce(&mut state, create_staff("r2"), &env);
        assert_eq!(state.requests.len(), 2);
        for action in feedback_of(effects).await {
            let _ = reducer.reduce(&mut state, action, &env);
        }
        assert_eq!(state.requests.len(), 1);
        assert_eq!(state.requests[0].id, RecordId::new("r1"));
    }

    #[test]
    fn only_admins_delete_requests() {
        ReducerTest::new(EmergencyReducer::new(), env())
            .given([create_public("r1")])
            .when(EmergencyAction::DeleteRequest {
                actor: Actor::Donor(Email::from("a@x.org")),
                request_id: RecordId::new("r1"),
            })
            .then_rejected(|error| assert_eq!(error.kind(), ErrorKind::Unauthorized))
            .then_state(|state| assert_eq!(state.requests.len(), 1))
            .run();

        ReducerTest::new(EmergencyReducer::new(), env())
            .given([create_public("r1")])
            .when(EmergencyAction::DeleteRequest {
                actor: Actor::Admin,
                request_id: RecordId::new("r1"),
            })
            .then_state(|state| assert!(state.requests.is_empty()))
            .run();
    }
}
