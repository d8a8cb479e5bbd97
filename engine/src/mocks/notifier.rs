use crate::notify::{DeliveryError, DonorAlert, DonorNotifier};
use crate::types::Email;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct Recorded {
    alerts: Vec<DonorAlert>,
    failing: HashSet<Email>,
}

/// Notifier that records every alert it is asked to send.
///
/// Clones share the same record. Deliveries to addresses registered with
/// [`RecordingNotifier::fail_for`] are recorded and then reported as failed.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingNotifier {
    /// Notifier that delivers everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make deliveries to `email` fail
    pub fn fail_for(&self, email: &Email) {
        self.lock().failing.insert(email.clone());
    }

    /// Every alert attempted so far, in send order
    #[must_use]
    pub fn alerts(&self) -> Vec<DonorAlert> {
        self.lock().alerts.clone()
    }

    /// Number of alerts attempted
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.lock().alerts.len()
    }

    /// Alerts attempted for `email`
    #[must_use]
    pub fn sent_to(&self, email: &Email) -> usize {
        self.lock().alerts.iter().filter(|a| &a.donor_email == email).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DonorNotifier for RecordingNotifier {
    fn send(
        &self,
        alert: DonorAlert,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send>> {
        let result = {
            let mut recorded = self.lock();
            let fails = recorded.failing.contains(&alert.donor_email);
            let to = alert.donor_email.to_string();
            recorded.alerts.push(alert);
            if fails {
                Err(DeliveryError::Transport(format!("mailbox unavailable: {to}")))
            } else {
                Ok(())
            }
        };
        Box::pin(async move { result })
    }
}
