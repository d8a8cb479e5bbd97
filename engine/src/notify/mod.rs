//! Outbound donor notifications.
//!
//! The engine only needs `send(alert) → delivered or not`. Delivery is best
//! effort: one attempt per donor per activation, failures are logged by the
//! orchestrator and never retried.

pub mod console;
pub mod content;
pub mod smtp;

pub use console::ConsoleNotifier;
pub use content::AlertContent;
pub use smtp::SmtpNotifier;

use crate::error::ErrorKind;
use crate::types::{BloodRequirement, Email};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Why a single alert was not delivered
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Donor or sender address is not a valid mailbox
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The message could not be built
    #[error("Failed to build message: {0}")]
    Message(String),

    /// The transport refused or failed to deliver
    #[error("Transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    /// Always [`ErrorKind::DeliveryFailure`]
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAddress(_) | Self::Message(_) | Self::Transport(_) => ErrorKind::DeliveryFailure,
        }
    }
}

/// Content variant of an alert
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlertVariant {
    /// Staff-raised request: direct alert with directions, no login
    Direct,
    /// Admin-approved public request: donor must log in to answer
    LoginRequired {
        /// Donor login page
        login_url: String,
    },
}

/// Everything needed to alert one qualifying donor
#[derive(Clone, Debug, PartialEq)]
pub struct DonorAlert {
    /// Donor display name
    pub donor_name: String,
    /// Donor email (recipient)
    pub donor_email: Email,
    /// Hospital or requester name
    pub hospital_name: String,
    /// Blood type needed
    pub blood_type: BloodRequirement,
    /// Distance from the donor to the request, kilometres
    pub distance_km: f64,
    /// Location link or address of the request
    pub location_link: String,
    /// Content variant
    pub variant: AlertVariant,
}

/// Notification capability
///
/// Implementations must be cheap to call concurrently; the orchestrator fans
/// out one `send` per qualifying donor.
pub trait DonorNotifier: Send + Sync {
    /// Deliver one alert
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if the alert was not delivered.
    fn send(
        &self,
        alert: DonorAlert,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send>>;
}
