//! SMTP notifier using Lettre.

use super::{AlertContent, DeliveryError, DonorAlert, DonorNotifier};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::future::Future;
use std::pin::Pin;

/// SMTP notifier.
///
/// Sends each alert as a `multipart/alternative` email (plain text and HTML)
/// through a STARTTLS relay.
///
/// # Configuration
///
/// - `smtp_server`: SMTP server address (e.g., "smtp.gmail.com")
/// - `smtp_port`: SMTP server port (usually 587)
/// - `smtp_username` / `smtp_password`: relay credentials
/// - `from_email` / `from_name`: sender mailbox
#[derive(Clone)]
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    /// Create a new SMTP notifier.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if the relay or the sender address is invalid.
    pub fn new(
        smtp_server: &str,
        smtp_port: u16,
        smtp_username: String,
        smtp_password: String,
        from_email: &str,
        from_name: &str,
    ) -> Result<Self, DeliveryError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_server)
            .map_err(|e| DeliveryError::Transport(format!("SMTP relay error: {e}")))?
            .port(smtp_port)
            .credentials(Credentials::new(smtp_username, smtp_password))
            .build();

        let from = format!("{from_name} <{from_email}>")
            .parse::<Mailbox>()
            .map_err(|e| DeliveryError::InvalidAddress(format!("from address: {e}")))?;

        Ok(Self { transport, from })
    }

    fn build_message(&self, alert: &DonorAlert) -> Result<Message, DeliveryError> {
        let to = alert
            .donor_email
            .as_str()
            .parse::<Mailbox>()
            .map_err(|e| DeliveryError::InvalidAddress(format!("{}: {e}", alert.donor_email)))?;
        let content = AlertContent::render(alert);

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(content.subject)
            .multipart(MultiPart::alternative_plain_html(content.text, content.html))
            .map_err(|e| DeliveryError::Message(e.to_string()))
    }
}

impl DonorNotifier for SmtpNotifier {
    fn send(
        &self,
        alert: DonorAlert,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send>> {
        let message = self.build_message(&alert);
        let transport = self.transport.clone();

        Box::pin(async move {
            transport
                .send(message?)
                .await
                .map_err(|e| DeliveryError::Transport(e.to_string()))?;
            tracing::info!(to = %alert.donor_email, "Donor alert sent");
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::notify::AlertVariant;
    use crate::types::{BloodRequirement, BloodType, Email};

    fn notifier() -> SmtpNotifier {
        SmtpNotifier::new(
            "smtp.example.com",
            587,
            "user".to_string(),
            "secret".to_string(),
            "alerts@example.com",
            "BloodBridge",
        )
        .unwrap()
    }

    fn alert(email: &str) -> DonorAlert {
        DonorAlert {
            donor_name: "Tom".to_string(),
            donor_email: Email::from(email),
            hospital_name: "Mercy".to_string(),
            blood_type: BloodRequirement::Exact(BloodType::ANegative),
            distance_km: 2.0,
            location_link: "https://maps.example.com".to_string(),
            variant: AlertVariant::Direct,
        }
    }

    #[test]
    fn rejects_invalid_sender() {
        let result = SmtpNotifier::new(
            "smtp.example.com",
            587,
            "user".to_string(),
            "secret".to_string(),
            "not an address",
            "BloodBridge",
        );
        assert!(matches!(result, Err(DeliveryError::InvalidAddress(_))));
    }

    #[test]
    fn builds_message_for_valid_donor() {
        let message = notifier().build_message(&alert("tom@example.com")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: tom@example.com"));
        assert!(raw.contains("multipart/alternative"));
    }

    #[tokio::test]
    async fn invalid_donor_address_fails_without_network() {
        let result = notifier().send(alert("no-at-sign")).await;
        assert!(matches!(result, Err(DeliveryError::InvalidAddress(_))));
    }
}
