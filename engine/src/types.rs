//! Domain types for the BloodBridge matching engine.
//!
//! Value objects (identifiers, blood types, coordinates), the persisted
//! records (donors, staff, emergency requests) and the closed status
//! enumerations that replace free-form status strings.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identifiers
// ============================================================================

/// Short opaque record identifier
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap an identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Contact email, the identity of a donor inside response ledgers.
///
/// Always stored trimmed and lower-cased, so comparisons are
/// case-insensitive everywhere.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Normalize `raw`; `None` when it is blank
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        (!normalized.is_empty()).then_some(Self(normalized))
    }

    /// Normalized address
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Email {
    fn from(raw: String) -> Self {
        Self(raw.trim().to_lowercase())
    }
}

impl From<&str> for Email {
    fn from(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Blood types
// ============================================================================

/// ABO/Rh blood type
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BloodType {
    /// A positive
    #[serde(rename = "A+")]
    APositive,
    /// A negative
    #[serde(rename = "A-")]
    ANegative,
    /// B positive
    #[serde(rename = "B+")]
    BPositive,
    /// B negative
    #[serde(rename = "B-")]
    BNegative,
    /// AB positive
    #[serde(rename = "AB+")]
    AbPositive,
    /// AB negative
    #[serde(rename = "AB-")]
    AbNegative,
    /// O positive
    #[serde(rename = "O+")]
    OPositive,
    /// O negative
    #[serde(rename = "O-")]
    ONegative,
}

impl BloodType {
    /// Every blood type
    pub const ALL: [Self; 8] = [
        Self::APositive,
        Self::ANegative,
        Self::BPositive,
        Self::BNegative,
        Self::AbPositive,
        Self::AbNegative,
        Self::OPositive,
        Self::ONegative,
    ];

    /// Conventional label, e.g. `"O+"`
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::APositive => "A+",
            Self::ANegative => "A-",
            Self::BPositive => "B+",
            Self::BNegative => "B-",
            Self::AbPositive => "AB+",
            Self::AbNegative => "AB-",
            Self::OPositive => "O+",
            Self::ONegative => "O-",
        }
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BloodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|t| t.label() == wanted)
            .ok_or_else(|| format!("Unknown blood type: {s:?}"))
    }
}

/// Blood type needed by a request: one exact type, or the `"Any"` wildcard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BloodRequirement {
    /// Any donor blood type
    Any,
    /// Exactly this blood type
    Exact(BloodType),
}

impl BloodRequirement {
    /// Whether a donor of `blood_group` satisfies this requirement
    #[must_use]
    pub fn accepts(self, blood_group: BloodType) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(wanted) => wanted == blood_group,
        }
    }
}

impl fmt::Display for BloodRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::Exact(t) => t.fmt(f),
        }
    }
}

impl FromStr for BloodRequirement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("any") {
            Ok(Self::Any)
        } else {
            s.parse().map(Self::Exact)
        }
    }
}

impl TryFrom<String> for BloodRequirement {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BloodRequirement> for String {
    fn from(requirement: BloodRequirement) -> Self {
        requirement.to_string()
    }
}

// ============================================================================
// Geography
// ============================================================================

/// Coordinate in decimal degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude, degrees
    pub lat: f64,
    /// Longitude, degrees
    pub lng: f64,
}

impl GeoPoint {
    /// Create a coordinate
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// A zero on either axis means "no location", never 0°N 0°E.
    #[must_use]
    pub fn located(lat: f64, lng: f64) -> Option<Self> {
        let usable = |v: f64| v.is_finite() && v != 0.0;
        (usable(lat) && usable(lng)).then_some(Self { lat, lng })
    }
}

// ============================================================================
// Statuses
// ============================================================================

/// Admin review status of a donor or staff account
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalStatus {
    /// Awaiting review
    #[default]
    Pending,
    /// Approved by an admin
    Approved,
    /// Rejected by an admin
    Rejected,
}

/// Who submitted an emergency request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSource {
    /// Logged-in, approved hospital staff; activated on creation
    HospitalStaff,
    /// Anonymous public form; gated by admin approval
    Public,
}

/// Emergency request status. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Public request awaiting admin review
    #[serde(rename = "Pending_Admin")]
    PendingAdmin,
    /// Donors notified; response window running
    Active,
    /// Closed (donation confirmed or closed by an admin)
    Resolved,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PendingAdmin => "Pending_Admin",
            Self::Active => "Active",
            Self::Resolved => "Resolved",
        })
    }
}

/// A donor's entry in a request's response ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseStatus {
    /// Donor will donate; awaiting confirmation
    Accepted,
    /// Donor declined
    Declined,
    /// Window lapsed without an answer
    Expired,
    /// Donation confirmed
    Donated,
    /// Donation did not happen
    Failed,
}

impl ResponseStatus {
    /// Label used in logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Expired => "expired",
            Self::Donated => "donated",
            Self::Failed => "failed",
        }
    }

    /// Donor said yes at some point (`Accepted`, `Donated` or `Failed`)
    #[must_use]
    pub const fn is_acceptance(self) -> bool {
        matches!(self, Self::Accepted | Self::Donated | Self::Failed)
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Answer a donor can give inside the response window
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DonorReply {
    /// Accept the request
    Accepted,
    /// Decline the request
    Declined,
}

impl From<DonorReply> for ResponseStatus {
    fn from(reply: DonorReply) -> Self {
        match reply {
            DonorReply::Accepted => Self::Accepted,
            DonorReply::Declined => Self::Declined,
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// One donor's response ledger entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Current outcome
    pub status: ResponseStatus,
    /// When the response (or expiry) was recorded
    pub at: DateTime<Utc>,
    /// When the donation outcome was confirmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// Registered blood donor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donor {
    /// Record id
    pub id: RecordId,
    /// Full name
    pub name: String,
    /// Phone number
    pub contact: String,
    /// Email, the donor's identity in ledgers
    pub email: Email,
    /// Donor blood group
    pub blood_group: BloodType,
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
    /// Admin review status
    pub status: ApprovalStatus,
    /// Confirmed donations
    #[serde(default)]
    pub total_donations: u32,
    /// Lives saved (one per confirmed donation)
    #[serde(default)]
    pub lives_saved: u32,
    /// Date of the last confirmed donation
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_date"
    )]
    pub last_donation: Option<NaiveDate>,
    /// Not eligible for matching on or before this date
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_date"
    )]
    pub cooldown_until: Option<NaiveDate>,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

impl Donor {
    /// Usable coordinate, if any
    #[must_use]
    pub fn position(&self) -> Option<GeoPoint> {
        GeoPoint::located(self.lat, self.lng)
    }
}

/// Accept any JSON value for an optional date. A `YYYY-MM-DD` string or an
/// RFC 3339 timestamp yields its date; anything else means "none".
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    let date = match &raw {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::String(text) => {
            let text = text.trim();
            NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().or_else(|| {
                DateTime::parse_from_rfc3339(text)
                    .ok()
                    .map(|at| at.with_timezone(&Utc).date_naive())
            })
        },
        _ => None,
    };
    if date.is_none() {
        tracing::warn!(value = %raw, "Ignoring malformed donor date");
    }
    Ok(date)
}

/// Hospital staff account, owned by the authentication collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffMember {
    /// Record id
    pub id: RecordId,
    /// Login email
    pub staff_email: Email,
    /// Hospital the staff member works for
    pub hospital_name: String,
    /// Admin review status
    pub status: ApprovalStatus,
}

/// Emergency blood request with its donor response ledger
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyRequest {
    /// Record id
    pub id: RecordId,
    /// Who submitted the request
    pub source: RequestSource,
    /// Hospital where blood is needed
    pub hospital_name: String,
    /// Patient name
    pub patient_name: String,
    /// Required blood type
    pub blood_type: BloodRequirement,
    /// Units needed, free-form
    #[serde(default)]
    pub units_needed: String,
    /// Patient condition, free-form
    #[serde(default)]
    pub condition: String,
    /// When the blood is needed, free-form
    #[serde(default)]
    pub required_time: String,
    /// Requester contact
    pub contact: String,
    /// Location link or address
    #[serde(default)]
    pub location: String,
    /// Latitude, 0 when unknown
    #[serde(default)]
    pub lat: f64,
    /// Longitude, 0 when unknown
    #[serde(default)]
    pub lng: f64,
    /// Lifecycle status
    pub status: RequestStatus,
    /// Activation time; set exactly once
    #[serde(default)]
    pub notified_at: Option<DateTime<Utc>>,
    /// Donors successfully notified on activation
    #[serde(default)]
    pub notified_count: u32,
    /// Donor email → response
    #[serde(default)]
    pub donor_responses: BTreeMap<Email, LedgerEntry>,
    /// Submission time
    pub created_at: DateTime<Utc>,
}

impl EmergencyRequest {
    /// Usable coordinate, if any
    #[must_use]
    pub fn position(&self) -> Option<GeoPoint> {
        GeoPoint::located(self.lat, self.lng)
    }

    /// Ledger entry of `donor`
    #[must_use]
    pub fn response_of(&self, donor: &Email) -> Option<&LedgerEntry> {
        self.donor_responses.get(donor)
    }
}

// ============================================================================
// Actors
// ============================================================================

/// Caller identity as established by the authentication collaborator
#[derive(Clone, Debug, PartialEq)]
pub enum Actor {
    /// Logged-in administrator
    Admin,
    /// Logged-in hospital staff member
    Staff(StaffMember),
    /// Logged-in donor
    Donor(Email),
    /// Anonymous caller
    Public,
}

impl Actor {
    /// Whether the caller is an administrator
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(Email::from("  Jane.Doe@Example.COM ").as_str(), "jane.doe@example.com");
        assert_eq!(Email::parse("   "), None);

        let email: Email = serde_json::from_value(json!("ME@X.ORG")).unwrap();
        assert_eq!(email, Email::from("me@x.org"));
    }

    #[test]
    fn blood_types_use_conventional_labels() {
        assert_eq!(serde_json::to_value(BloodType::AbNegative).unwrap(), json!("AB-"));
        assert_eq!("o+".parse::<BloodType>().unwrap(), BloodType::OPositive);
        assert!("C+".parse::<BloodType>().is_err());
    }

    #[test]
    fn requirement_wildcard_accepts_every_type() {
        let any: BloodRequirement = serde_json::from_value(json!("Any")).unwrap();
        assert!(BloodType::ALL.into_iter().all(|t| any.accepts(t)));

        let exact: BloodRequirement = serde_json::from_value(json!("B-")).unwrap();
        assert!(exact.accepts(BloodType::BNegative));
        assert!(!exact.accepts(BloodType::BPositive));
        assert_eq!(serde_json::to_value(exact).unwrap(), json!("B-"));
    }

    #[test]
    fn zero_coordinates_mean_no_location() {
        assert!(GeoPoint::located(0.0, 0.0).is_none());
        assert!(GeoPoint::located(12.9, 0.0).is_none());
        assert!(GeoPoint::located(f64::NAN, 77.5).is_none());
        assert!(GeoPoint::located(12.9, 77.5).is_some());
    }

    #[test]
    fn request_status_keeps_persisted_spelling() {
        assert_eq!(serde_json::to_value(RequestStatus::PendingAdmin).unwrap(), json!("Pending_Admin"));
        assert_eq!(serde_json::to_value(RequestSource::HospitalStaff).unwrap(), json!("hospital_staff"));
    }

    #[test]
    fn malformed_cooldown_date_fails_open() {
        let donor: Donor = serde_json::from_value(json!({
            "id": "d1",
            "name": "Asha",
            "contact": "555",
            "email": "asha@example.com",
            "bloodGroup": "O+",
            "location": "Pune",
            "status": "Approved",
            "cooldownUntil": "next spring",
            "createdAt": "2025-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(donor.cooldown_until, None);
        assert_eq!(donor.total_donations, 0);
        assert!(donor.position().is_none());
    }

    #[test]
    fn donor_dates_of_any_shape_do_not_break_the_table() {
        let donor = |cooldown: serde_json::Value, last: serde_json::Value| {
            json!({
                "id": "d1",
                "name": "Asha",
                "contact": "555",
                "email": "asha@example.com",
                "bloodGroup": "O+",
                "location": "Pune",
                "status": "Approved",
                "lastDonation": last,
                "cooldownUntil": cooldown,
                "createdAt": "2025-01-01T00:00:00Z"
            })
        };
        let table: Vec<Donor> = serde_json::from_value(json!([
            donor(json!(20_250_401), json!(true)),
            donor(json!({"date": "2025-04-01"}), json!("yesterday")),
            donor(json!("2025-04-01T10:30:00Z"), json!(" 2025-01-01 ")),
            donor(json!(null), json!(null)),
        ]))
        .unwrap();

        assert_eq!(table.len(), 4);
        assert_eq!(table[0].cooldown_until, None);
        assert_eq!(table[0].last_donation, None);
        assert_eq!(table[1].cooldown_until, None);
        assert_eq!(table[1].last_donation, None);
        assert_eq!(table[2].cooldown_until, NaiveDate::from_ymd_opt(2025, 4, 1));
        assert_eq!(table[2].last_donation, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(table[3].cooldown_until, None);
    }
}
