//! The `BloodBridge` facade.
//!
//! One [`Store`] per mutable table, so every read-modify-write of a table is
//! serialized. Operations return the canonical updated record or a
//! [`ServiceError`](crate::error::ServiceError); a rejected operation writes nothing and sends nothing.

use super::views::{self, AdminStats, DonorDashboard, Export, HospitalDashboard, ResponsesView};
use crate::aggregates::{
    DonorAction, DonorDirectory, DonorEnvironment, DonorReducer, DonorRegistration, DonorState, EmergencyAction,
    EmergencyEnvironment, EmergencyReducer, EmergencyState, RequestForm,
};
use crate::error::{LifecycleError, Result, ServiceError};
use crate::matching::{Activation, MatchingOrchestrator, MatchingPolicy};
use crate::metrics;
use crate::notify::{ConsoleNotifier, DonorNotifier};
use crate::types::{
    Actor, ApprovalStatus, Donor, DonorReply, Email, EmergencyRequest, LedgerEntry, RecordId, RequestStatus,
    ResponseStatus, StaffMember,
};
use bloodbridge_core::environment::{Clock, IdGenerator, ShortIdGenerator, SystemClock};
use bloodbridge_core::record_store::{RecordStore, Table};
use bloodbridge_runtime::{Store, StoreError};
use chrono::NaiveDate;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Donor registry store
pub type DonorStore = Store<DonorState, DonorAction, DonorEnvironment, DonorReducer>;

/// Emergency request store
pub type RequestStore = Store<EmergencyState, EmergencyAction, EmergencyEnvironment, EmergencyReducer>;

/// Default base URL for donor login links
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// A request after a lifecycle operation, with the matching outcome when the
/// operation activated it
#[derive(Clone, Debug, PartialEq)]
pub struct LifecycleOutcome {
    /// The request as stored
    pub request: EmergencyRequest,
    /// Matching outcome, present only on the activation edge
    pub activation: Option<Activation>,
}

/// Lets request effects read the donor pool and book donations through the
/// donor store.
struct StoreDirectory {
    donors: Arc<DonorStore>,
}

impl DonorDirectory for StoreDirectory {
    fn donors(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Donor>>> + Send>> {
        let store = Arc::clone(&self.donors);
        Box::pin(async move { Ok(store.state().await?.donors) })
    }

    fn record_donation(&self, email: Email, on: NaiveDate) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        let store = Arc::clone(&self.donors);
        Box::pin(async move {
            let state = store.send(DonorAction::RecordDonation { email, on }).await?.state;
            settle(state.last_error.as_ref())
        })
    }
}

fn settle(error: Option<&LifecycleError>) -> Result<()> {
    error.map_or(Ok(()), |error| Err(error.clone().into()))
}

fn found<T>(value: Option<T>, what: impl Display) -> Result<T> {
    value.ok_or_else(|| LifecycleError::NotFound(what.to_string()).into())
}

fn require_admin(actor: &Actor) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(LifecycleError::Unauthorized("admin login required".to_string()).into())
    }
}

/// Compensation fed back by a request effect, as the error the operation
/// reports
fn rolled_back(feedback: &[EmergencyAction]) -> Result<()> {
    feedback.iter().try_for_each(|action| match action {
        EmergencyAction::ActivationCompensated { reason, .. } => Err(ServiceError::RolledBack {
            operation: "request activation",
            reason: reason.clone(),
        }),
        EmergencyAction::DonationCompensated { reason, .. } => Err(ServiceError::RolledBack {
            operation: "donation confirmation",
            reason: reason.clone(),
        }),
        _ => Ok(()),
    })
}

fn activation_of(feedback: &[EmergencyAction]) -> Option<Activation> {
    feedback.iter().find_map(|action| match action {
        EmergencyAction::ActivationRecorded {
            request_id,
            attempted,
            notified,
        } => Some(Activation {
            request_id: request_id.clone(),
            attempted: *attempted,
            notified: *notified,
        }),
        _ => None,
    })
}

/// Builder for [`BloodBridge`]
pub struct BloodBridgeBuilder {
    records: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    notifier: Arc<dyn DonorNotifier>,
    policy: MatchingPolicy,
    base_url: String,
}

impl BloodBridgeBuilder {
    /// Clock (defaults to the system clock)
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Record id generator (defaults to short random ids)
    #[must_use]
    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Alert delivery (defaults to the console notifier)
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn DonorNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Radius, window and cooldown
    #[must_use]
    pub const fn policy(mut self, policy: MatchingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Base URL of the donor login page
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Wire the stores together
    #[must_use]
    pub fn build(self) -> BloodBridge {
        let donors = Arc::new(Store::new(
            Table::Donors,
            Arc::clone(&self.records),
            DonorReducer::new(),
            DonorEnvironment::new(Arc::clone(&self.clock), self.policy),
        ));

        let orchestrator = Arc::new(MatchingOrchestrator::new(self.notifier, self.policy, self.base_url));
        let directory: Arc<dyn DonorDirectory> = Arc::new(StoreDirectory {
            donors: Arc::clone(&donors),
        });
        let requests = Store::new(
            Table::EmergencyRequests,
            Arc::clone(&self.records),
            EmergencyReducer::new(),
            EmergencyEnvironment::new(Arc::clone(&self.clock), self.policy, orchestrator, directory),
        );

        BloodBridge {
            records: self.records,
            donors,
            requests,
            clock: self.clock,
            ids: self.ids,
            policy: self.policy,
        }
    }
}

/// Emergency request lifecycle and donor matching service
pub struct BloodBridge {
    records: Arc<dyn RecordStore>,
    donors: Arc<DonorStore>,
    requests: RequestStore,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    policy: MatchingPolicy,
}

impl BloodBridge {
    /// Start building a service over `records`
    #[must_use]
    pub fn builder(records: Arc<dyn RecordStore>) -> BloodBridgeBuilder {
        BloodBridgeBuilder {
            records,
            clock: Arc::new(SystemClock),
            ids: Arc::new(ShortIdGenerator),
            notifier: Arc::new(ConsoleNotifier),
            policy: MatchingPolicy::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Active matching policy
    #[must_use]
    pub const fn policy(&self) -> &MatchingPolicy {
        &self.policy
    }

    // ========== Donors ==========

    /// Register a donor; the account starts `Pending`.
    ///
    /// # Errors
    ///
    /// `Validation` for missing fields, an unknown blood group or an email
    /// that is already registered.
    pub async fn register_donor(&self, registration: DonorRegistration) -> Result<Donor> {
        let id = RecordId::new(self.ids.next_id());
        let state = self
            .donors
            .send(DonorAction::RegisterDonor {
                id: id.clone(),
                registration,
            })
            .await?
            .state;
        settle(state.last_error.as_ref())?;
        found(state.get(&id).cloned(), format_args!("Donor {id}"))
    }

    /// Approve, reject or reset a donor.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless `actor` is an admin, `NotFound` for an unknown donor.
    pub async fn set_donor_approval(&self, actor: Actor, donor_id: &RecordId, status: ApprovalStatus) -> Result<Donor> {
        let state = self
            .donors
            .send(DonorAction::SetApproval {
                actor,
                donor_id: donor_id.clone(),
                status,
            })
            .await?
            .state;
        settle(state.last_error.as_ref())?;
        found(state.get(donor_id).cloned(), format_args!("Donor {donor_id}"))
    }

    /// Hard-delete a donor.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless `actor` is an admin, `NotFound` for an unknown donor.
    pub async fn remove_donor(&self, actor: Actor, donor_id: &RecordId) -> Result<()> {
        let state = self
            .donors
            .send(DonorAction::RemoveDonor {
                actor,
                donor_id: donor_id.clone(),
            })
            .await?
            .state;
        settle(state.last_error.as_ref())
    }

    /// Every donor (admin only).
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless `actor` is an admin.
    pub async fn donors(&self, actor: &Actor) -> Result<Vec<Donor>> {
        require_admin(actor)?;
        Ok(self.donors.state().await?.donors)
    }

    // ========== Staff ==========

    async fn staff(&self) -> Result<Vec<StaffMember>> {
        let records = self.records.load(Table::Staff).await.map_err(StoreError::from)?;
        records
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|source| {
                StoreError::Decode {
                    table: Table::Staff,
                    source,
                }
                .into()
            })
    }

    /// Staff account by login email.
    ///
    /// # Errors
    ///
    /// `NotFound` when no staff account uses `email`.
    pub async fn staff_member(&self, email: &Email) -> Result<StaffMember> {
        let staff = self.staff().await?;
        found(
            staff.into_iter().find(|s| &s.staff_email == email),
            format_args!("Staff member {email}"),
        )
    }

    // ========== Requests ==========

    /// Raise a request as logged-in hospital staff. The request is `Active`
    /// at once and qualifying donors are alerted before this returns.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown staff login, `Unauthorized` for a staff
    /// account that is not approved, `Validation` for missing fields,
    /// `RolledBack` when the donor pool could not be read (the request is
    /// withdrawn).
    pub async fn create_staff_request(&self, staff_email: &Email, form: RequestForm) -> Result<LifecycleOutcome> {
        let staff = self.staff_member(staff_email).await?;
        self.create_request(Actor::Staff(staff), form).await
    }

    /// Submit a public request; it waits in `Pending_Admin` for review.
    ///
    /// # Errors
    ///
    /// `Validation` for missing fields.
    pub async fn create_public_request(&self, form: RequestForm) -> Result<LifecycleOutcome> {
        self.create_request(Actor::Public, form).await
    }

    async fn create_request(&self, requester: Actor, form: RequestForm) -> Result<LifecycleOutcome> {
        let id = RecordId::new(self.ids.next_id());
        let dispatch = self
            .requests
            .send(EmergencyAction::CreateRequest {
                id: id.clone(),
                requester,
                form,
            })
            .await?;
        settle(dispatch.state.last_error.as_ref())?;
        rolled_back(&dispatch.feedback)?;

        let request = self.request(&id).await?;
        metrics::record_request_created(request.source);
        Ok(LifecycleOutcome {
            request,
            activation: activation_of(&dispatch.feedback),
        })
    }

    /// Request by id.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown request.
    pub async fn request(&self, id: &RecordId) -> Result<EmergencyRequest> {
        let state = self.requests.state().await?;
        found(state.get(id).cloned(), format_args!("Request {id}"))
    }

    /// Every request (admin only).
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless `actor` is an admin.
    pub async fn requests(&self, actor: &Actor) -> Result<Vec<EmergencyRequest>> {
        require_admin(actor)?;
        Ok(self.requests.state().await?.requests)
    }

    /// Admin status change. Only `Pending_Admin → Active` runs matching;
    /// setting the current status again is a no-op.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless `actor` is an admin, `NotFound` for an unknown
    /// request, `Validation` for a backwards transition, `RolledBack` when
    /// the donor pool could not be read (the request is back in `Pending_Admin`).
    pub async fn set_request_status(
        &self,
        actor: Actor,
        request_id: &RecordId,
        status: RequestStatus,
    ) -> Result<LifecycleOutcome> {
        let dispatch = self
            .requests
            .send(EmergencyAction::SetStatus {
                actor,
                request_id: request_id.clone(),
                status,
            })
            .await?;
        settle(dispatch.state.last_error.as_ref())?;
        rolled_back(&dispatch.feedback)?;

        Ok(LifecycleOutcome {
            request: self.request(request_id).await?,
            activation: activation_of(&dispatch.feedback),
        })
    }

    /// Record a donor's answer.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown request, `WindowExpired` after the window,
    /// `Validation` when the request is not `Active` or the donor already
    /// answered.
    pub async fn respond(&self, donor: &Email, request_id: &RecordId, reply: DonorReply) -> Result<LedgerEntry> {
        let state = self
            .requests
            .send(EmergencyAction::Respond {
                donor: donor.clone(),
                request_id: request_id.clone(),
                reply,
            })
            .await?
            .state;

        if let Some(error) = &state.last_error {
            if matches!(error, LifecycleError::WindowExpired { .. }) {
                metrics::record_window_rejection();
            }
            return Err(error.clone().into());
        }
        metrics::record_response(reply.into());

        found(
            state.get(request_id).and_then(|r| r.response_of(donor)).cloned(),
            format_args!("Response of {donor} to request {request_id}"),
        )
    }

    /// Confirm whether an accepted donor donated. Success resolves the request
    /// and starts the donor's cooldown before this returns.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown request or a donor without a ledger entry,
    /// `Validation` when the entry is not `Accepted`, `RolledBack` when the
    /// donation could not be booked on the donor record (the entry stays
    /// `Accepted`).
    pub async fn confirm_donation(&self, request_id: &RecordId, donor: &Email, success: bool) -> Result<ResponseStatus> {
        let dispatch = self
            .requests
            .send(EmergencyAction::ConfirmDonation {
                request_id: request_id.clone(),
                donor: donor.clone(),
                success,
            })
            .await?;
        settle(dispatch.state.last_error.as_ref())?;
        rolled_back(&dispatch.feedback)?;
        metrics::record_donation_confirmed(success);

        Ok(if success {
            ResponseStatus::Donated
        } else {
            ResponseStatus::Failed
        })
    }

    /// Hard-delete a request.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless `actor` is an admin, `NotFound` for an unknown request.
    pub async fn delete_request(&self, actor: Actor, request_id: &RecordId) -> Result<()> {
        let state = self
            .requests
            .send(EmergencyAction::DeleteRequest {
                actor,
                request_id: request_id.clone(),
            })
            .await?
            .state;
        settle(state.last_error.as_ref())
    }

    /// Expire unanswered slots of every lapsed window. Returns the number of
    /// slots expired; the table is only written when that is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`](crate::error::ServiceError::Store) if a table cannot be read or written.
    pub async fn sweep(&self) -> Result<usize> {
        let donors = self.donors.state().await?.donors;
        let expired = self
            .requests
            .send(EmergencyAction::ExpireStaleSlots { donors })
            .await?
            .state
            .expired_slots;
        if expired > 0 {
            metrics::record_slots_expired(expired);
        }
        Ok(expired)
    }

    // ========== Views ==========

    /// Accepted and declined donors of a request.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown request.
    pub async fn responses(&self, request_id: &RecordId) -> Result<ResponsesView> {
        let request = self.request(request_id).await?;
        let donors = self.donors.state().await?.donors;
        Ok(views::responses(request, &donors))
    }

    /// Dashboard of a logged-in donor. Lapsed windows are swept first.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown donor email.
    pub async fn donor_dashboard(&self, email: &Email) -> Result<DonorDashboard> {
        self.sweep().await?;

        let donor = found(
            self.donors.state().await?.by_email(email).cloned(),
            format_args!("Donor {email}"),
        )?;
        let requests = self.requests.state().await?.requests;
        Ok(views::donor_dashboard(donor, &requests, &self.policy, self.clock.now()))
    }

    /// Dashboard of a logged-in staff member.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown staff login.
    pub async fn hospital_dashboard(&self, staff_email: &Email) -> Result<HospitalDashboard> {
        let staff = self.staff_member(staff_email).await?;
        let requests = self.requests.state().await?.requests;
        Ok(views::hospital_dashboard(staff, &requests))
    }

    /// Counts by status (admin only).
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless `actor` is an admin.
    pub async fn admin_stats(&self, actor: &Actor) -> Result<AdminStats> {
        require_admin(actor)?;
        let donors = self.donors.state().await?.donors;
        let staff = self.staff().await?;
        let requests = self.requests.state().await?.requests;
        Ok(views::admin_stats(&donors, &staff, &requests))
    }

    /// Snapshot of every table (admin only).
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless `actor` is an admin.
    pub async fn export(&self, actor: &Actor) -> Result<Export> {
        require_admin(actor)?;
        Ok(Export {
            exported_at: self.clock.now(),
            blood_donors: self.donors.state().await?.donors,
            hospital_staff: self.staff().await?,
            emergency_requests: self.requests.state().await?.requests,
        })
    }
}

impl std::fmt::Debug for BloodBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloodBridge").field("policy", &self.policy).finish_non_exhaustive()
    }
}
