//! Console notifier for development and testing.

use super::{AlertContent, DeliveryError, DonorAlert, DonorNotifier};
use std::future::Future;
use std::pin::Pin;
use tracing::info;

/// Console notifier.
///
/// Logs alerts instead of sending them. Used when no SMTP server is
/// configured. Every alert counts as delivered.
#[derive(Clone, Debug, Default)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    /// Create a new console notifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DonorNotifier for ConsoleNotifier {
    fn send(
        &self,
        alert: DonorAlert,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send>> {
        Box::pin(async move {
            let content = AlertContent::render(&alert);
            info!(
                to = %alert.donor_email,
                subject = %content.subject,
                distance_km = alert.distance_km,
                "Donor alert (console delivery)"
            );
            println!("\n──── Donor alert to {} ────", alert.donor_email);
            println!("Subject: {}", content.subject);
            println!("{}", content.text);
            Ok(())
        })
    }
}
