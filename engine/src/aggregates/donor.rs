//! Donor registry aggregate.
//!
//! Registration, admin review, removal and donation bookkeeping for the
//! donors table. Cooldown dates are only ever written here, always as
//! donation date + cooldown period.

use crate::error::LifecycleError;
use crate::matching::{MatchingPolicy, cooldown_until};
use crate::types::{Actor, ApprovalStatus, BloodType, Donor, Email, RecordId};
use bloodbridge_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer};
use bloodbridge_runtime::TableState;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// State
// ============================================================================

/// Donors table state
#[derive(Clone, Debug, Default)]
pub struct DonorState {
    /// Donors in stored order
    pub donors: Vec<Donor>,
    /// Rejection of the last command, if any
    pub last_error: Option<LifecycleError>,
}

impl DonorState {
    /// Donor by record id
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<&Donor> {
        self.donors.iter().find(|d| &d.id == id)
    }

    /// Donor by (normalized) email
    #[must_use]
    pub fn by_email(&self, email: &Email) -> Option<&Donor> {
        self.donors.iter().find(|d| &d.email == email)
    }

    fn get_mut(&mut self, id: &RecordId) -> Option<&mut Donor> {
        self.donors.iter_mut().find(|d| &d.id == id)
    }
}

impl TableState for DonorState {
    type Record = Donor;

    fn from_records(records: Vec<Donor>) -> Self {
        Self {
            donors: records,
            last_error: None,
        }
    }

    fn to_records(&self) -> Vec<Donor> {
        self.donors.clone()
    }
}

/// Donor registration form
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorRegistration {
    /// Full name
    pub name: String,
    /// Phone number
    pub contact: String,
    /// Email
    pub email: String,
    /// Blood group label, e.g. `"O+"`
    pub blood_group: String,
    /// Free-form address
    pub location: String,
    /// Latitude, 0 when unknown
    #[serde(default)]
    pub lat: f64,
    /// Longitude, 0 when unknown
    #[serde(default)]
    pub lng: f64,
    /// Donor confirmed the minimum age
    #[serde(default)]
    pub age_confirmed: bool,
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the donor registry
#[derive(Clone, Debug)]
pub enum DonorAction {
    // Commands
    /// Register a new donor (starts `Pending`)
    RegisterDonor {
        /// New record id
        id: RecordId,
        /// Submitted form
        registration: DonorRegistration,
    },

    /// Approve, reject or reset a donor (admin only)
    SetApproval {
        /// Caller
        actor: Actor,
        /// Donor to review
        donor_id: RecordId,
        /// New review status
        status: ApprovalStatus,
    },

    /// Remove a donor (admin only)
    RemoveDonor {
        /// Caller
        actor: Actor,
        /// Donor to remove
        donor_id: RecordId,
    },

    /// Book a confirmed donation
    RecordDonation {
        /// Donor identity
        email: Email,
        /// Donation date
        on: NaiveDate,
    },

    // Events
    /// Donor was registered
    DonorRegistered {
        /// The new donor
        donor: Box<Donor>,
    },

    /// Review status changed
    ApprovalChanged {
        /// Reviewed donor
        donor_id: RecordId,
        /// New status
        status: ApprovalStatus,
    },

    /// Donor was removed
    DonorRemoved {
        /// Removed donor
        donor_id: RecordId,
    },

    /// Donation was booked and the cooldown started
    DonationRecorded {
        /// Donor
        donor_id: RecordId,
        /// Donation date
        on: NaiveDate,
        /// Last ineligible date
        cooldown_until: NaiveDate,
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

/// Environment dependencies for the donor registry
#[derive(Clone)]
pub struct DonorEnvironment {
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
    /// Cooldown period source
    pub policy: MatchingPolicy,
}

impl DonorEnvironment {
    /// Creates a new `DonorEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, policy: MatchingPolicy) -> Self {
        Self { clock, policy }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the donor registry
#[derive(Clone, Debug, Default)]
pub struct DonorReducer;

impl DonorReducer {
    /// Creates a new `DonorReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_registration(
        state: &DonorState,
        registration: &DonorRegistration,
    ) -> Result<(Email, BloodType), LifecycleError> {
        let required = [
            ("name", &registration.name),
            ("contact", &registration.contact),
            ("email", &registration.email),
            ("blood group", &registration.blood_group),
            ("location", &registration.location),
        ];
        let missing: Vec<_> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| *field)
            .collect();
        if !missing.is_empty() {
            return Err(LifecycleError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let email = Email::parse(&registration.email)
            .ok_or_else(|| LifecycleError::Validation("Missing required fields: email".to_string()))?;
        let blood_group = registration
            .blood_group
            .parse::<BloodType>()
            .map_err(LifecycleError::Validation)?;

        if state.by_email(&email).is_some() {
            return Err(LifecycleError::Validation(format!(
                "A donor with email {email} is already registered"
            )));
        }

        Ok((email, blood_group))
    }

    fn validate_admin(actor: &Actor, action: &str) -> Result<(), LifecycleError> {
        if actor.is_admin() {
            Ok(())
        } else {
            Err(LifecycleError::Unauthorized(format!("only admins may {action}")))
        }
    }

    fn validate_exists(state: &DonorState, donor_id: &RecordId) -> Result<(), LifecycleError> {
        state
            .get(donor_id)
            .map(|_| ())
            .ok_or_else(|| LifecycleError::NotFound(format!("Donor {donor_id}")))
    }

    /// Applies an event to state
    fn apply_event(state: &mut DonorState, action: &DonorAction) {
        match action {
            DonorAction::DonorRegistered { donor } => {
                state.donors.push((**donor).clone());
                state.last_error = None;
            },
            DonorAction::ApprovalChanged { donor_id, status } => {
                if let Some(donor) = state.get_mut(donor_id) {
                    donor.status = *status;
                }
                state.last_error = None;
            },
            DonorAction::DonorRemoved { donor_id } => {
                state.donors.retain(|d| &d.id != donor_id);
                state.last_error = None;
            },
            DonorAction::DonationRecorded {
                donor_id,
                on,
                cooldown_until,
            } => {
                if let Some(donor) = state.get_mut(donor_id) {
                    donor.total_donations += 1;
                    donor.lives_saved += 1;
                    donor.last_donation = Some(*on);
                    donor.cooldown_until = Some(*cooldown_until);
                }
                state.last_error = None;
            },
            DonorAction::ValidationFailed { error } => {
                state.last_error = Some(error.clone());
            },
            // Commands don't modify state
            DonorAction::RegisterDonor { .. }
            | DonorAction::SetApproval { .. }
            | DonorAction::RemoveDonor { .. }
            | DonorAction::RecordDonation { .. } => {},
        }
    }

    fn reject(state: &mut DonorState, error: LifecycleError) -> SmallVec<[Effect<DonorAction>; 4]> {
        tracing::debug!(%error, "Donor command rejected");
        Self::apply_event(state, &DonorAction::ValidationFailed { error });
        SmallVec::new()
    }
}

impl Reducer for DonorReducer {
    type State = DonorState;
    type Action = DonorAction;
    type Environment = DonorEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            DonorAction::RegisterDonor { id, registration } => {
                let (email, blood_group) = match Self::validate_registration(state, &registration) {
                    Ok(valid) => valid,
                    Err(error) => return Self::reject(state, error),
                };

                let donor = Donor {
                    id,
                    name: registration.name.trim().to_string(),
                    contact: registration.contact.trim().to_string(),
                    email,
                    blood_group,
                    location: registration.location.trim().to_string(),
                    lat: registration.lat,
                    lng: registration.lng,
                    age_confirmed: registration.age_confirmed,
                    status: ApprovalStatus::Pending,
                    total_donations: 0,
                    lives_saved: 0,
                    last_donation: None,
                    cooldown_until: None,
                    created_at: env.clock.now(),
                };
                tracing::info!(donor_id = %donor.id, email = %donor.email, "Donor registered");
                Self::apply_event(state, &DonorAction::DonorRegistered { donor: Box::new(donor) });
                SmallVec::new()
            },

            DonorAction::SetApproval {
                actor,
                donor_id,
                status,
            } => {
                if let Err(error) = Self::validate_admin(&actor, "review donors")
                    .and_then(|()| Self::validate_exists(state, &donor_id))
                {
                    return Self::reject(state, error);
                }

                tracing::info!(%donor_id, ?status, "Donor review status changed");
                Self::apply_event(state, &DonorAction::ApprovalChanged { donor_id, status });
                SmallVec::new()
            },

            DonorAction::RemoveDonor { actor, donor_id } => {
                if let Err(error) = Self::validate_admin(&actor, "remove donors")
                    .and_then(|()| Self::validate_exists(state, &donor_id))
                {
                    return Self::reject(state, error);
                }

                tracing::info!(%donor_id, "Donor removed");
                Self::apply_event(state, &DonorAction::DonorRemoved { donor_id });
                SmallVec::new()
            },

            DonorAction::RecordDonation { email, on } => {
                let Some(donor_id) = state.by_email(&email).map(|d| d.id.clone()) else {
                    return Self::reject(state, LifecycleError::NotFound(format!("Donor {email}")));
                };

                let until = cooldown_until(on, env.policy.cooldown_days);
                tracing::info!(%donor_id, %on, cooldown_until = %until, "Donation recorded");
                Self::apply_event(
                    state,
                    &DonorAction::DonationRecorded {
                        donor_id,
                        on,
                        cooldown_until: until,
                    },
                );
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
    use bloodbridge_testing::{ReducerTest, Rejecting, assertions, test_clock};

    impl Rejecting for DonorState {
        type Rejection = LifecycleError;

        fn rejection(&self) -> Option<&LifecycleError> {
            self.last_error.as_ref()
        }
    }

    fn env() -> DonorEnvironment {
        DonorEnvironment::new(Arc::new(test_clock()), MatchingPolicy::default())
    }

    fn registration(email: &str) -> DonorRegistration {
        DonorRegistration {
            name: "Asha Rao".to_string(),
            contact: "555-0101".to_string(),
            email: email.to_string(),
            blood_group: "O+".to_string(),
            location: "Indiranagar".to_string(),
            lat: 12.97,
            lng: 77.64,
            age_confirmed: true,
        }
    }

    fn register(id: &str, email: &str) -> DonorAction {
        DonorAction::RegisterDonor {
            id: RecordId::new(id),
            registration: registration(email),
        }
    }

    #[test]
    fn registration_starts_pending_with_normalized_email() {
        ReducerTest::new(DonorReducer::new(), env())
            .when(register("d1", "  Asha@Example.com "))
            .then_accepted()
            .then_state(|state| {
                let donor = &state.donors[0];
                assert_eq!(donor.status, ApprovalStatus::Pending);
                assert_eq!(donor.email.as_str(), "asha@example.com");
                assert_eq!(donor.blood_group, BloodType::OPositive);
                assert_eq!(donor.created_at.to_rfc3339(), "2025-01-01T00:00:00+00:00");
            })
            .then_effects(assertions::no_follow_up)
            .run();
    }

    #[test]
    fn registration_requires_every_field() {
        let mut incomplete = registration("a@x.org");
        incomplete.contact = "  ".to_string();
        incomplete.location = String::new();

        ReducerTest::new(DonorReducer::new(), env())
            .when(DonorAction::RegisterDonor {
                id: RecordId::new("d1"),
                registration: incomplete,
            })
            .then_rejected(|error| {
                assert_eq!(
                    *error,
                    LifecycleError::Validation("Missing required fields: contact, location".to_string())
                );
            })
            .then_state(|state| assert!(state.donors.is_empty()))
            .run();
    }

    #[test]
    fn registration_rejects_unknown_blood_group_and_duplicates() {
        let mut bad_group = registration("b@x.org");
        bad_group.blood_group = "Z+".to_string();

        ReducerTest::new(DonorReducer::new(), env())
            .when(DonorAction::RegisterDonor {
                id: RecordId::new("d1"),
                registration: bad_group,
            })
            .then_rejected(|error| assert_eq!(error.kind(), ErrorKind::Validation))
            .run();

        ReducerTest::new(DonorReducer::new(), env())
            .given([register("d1", "dup@x.org")])
            .when(register("d2", "DUP@x.org"))
            .then_rejected(|error| assert_eq!(error.kind(), ErrorKind::Validation))
            .then_state(|state| assert_eq!(state.donors.len(), 1))
            .run();
    }

    #[test]
    fn only_admins_review_donors() {
        ReducerTest::new(DonorReducer::new(), env())
            .given([register("d1", "a@x.org")])
            .when(DonorAction::SetApproval {
                actor: Actor::Donor(Email::from("a@x.org")),
                donor_id: RecordId::new("d1"),
                status: ApprovalStatus::Approved,
            })
            .then_rejected(|error| assert_eq!(error.kind(), ErrorKind::Unauthorized))
            .then_state(|state| assert_eq!(state.donors[0].status, ApprovalStatus::Pending))
            .run();

        ReducerTest::new(DonorReducer::new(), env())
            .given([register("d1", "a@x.org")])
            .when(DonorAction::SetApproval {
                actor: Actor::Admin,
                donor_id: RecordId::new("d1"),
                status: ApprovalStatus::Approved,
            })
            .then_state(|state| assert_eq!(state.donors[0].status, ApprovalStatus::Approved))
            .run();
    }

    #[test]
    fn removing_a_missing_donor_is_not_found() {
        ReducerTest::new(DonorReducer::new(), env())
            .when(DonorAction::RemoveDonor {
                actor: Actor::Admin,
                donor_id: RecordId::new("ghost"),
            })
            .then_rejected(|error| assert_eq!(error.kind(), ErrorKind::NotFound))
            .run();

        ReducerTest::new(DonorReducer::new(), env())
            .given([register("d1", "a@x.org")])
            .when(DonorAction::RemoveDonor {
                actor: Actor::Admin,
                donor_id: RecordId::new("d1"),
            })
            .then_accepted()
            .then_state(|state| assert!(state.donors.is_empty()))
            .run();
    }

    #[test]
    fn donation_increments_stats_and_starts_cooldown() {
        let on: NaiveDate = "2025-01-01".parse().unwrap();

        ReducerTest::new(DonorReducer::new(), env())
            .given([register("d1", "a@x.org")])
            .when(DonorAction::RecordDonation {
                email: Email::from("A@X.org"),
                on,
            })
            .then_state(move |state| {
                let donor = &state.donors[0];
                assert_eq!(donor.total_donations, 1);
                assert_eq!(donor.lives_saved, 1);
                assert_eq!(donor.last_donation, Some(on));
                assert_eq!(donor.cooldown_until, Some("2025-04-01".parse().unwrap()));
            })
            .run();
    }
}
