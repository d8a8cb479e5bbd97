//! Alert text rendering.

use super::{AlertVariant, DonorAlert};

/// Average urban travel speed used for the time estimate, km/h
const TRAVEL_SPEED_KMH: f64 = 40.0;

/// Rendered alert
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertContent {
    /// Subject line
    pub subject: String,
    /// Plain text body
    pub text: String,
    /// HTML body
    pub html: String,
}

/// Distance with one decimal, e.g. `"4.2 km"`
#[must_use]
pub fn distance_label(distance_km: f64) -> String {
    format!("{distance_km:.1} km")
}

/// Estimated travel time in whole minutes
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn travel_minutes(distance_km: f64) -> i64 {
    (distance_km / TRAVEL_SPEED_KMH * 60.0).round() as i64
}

impl AlertContent {
    /// Render `alert` for delivery
    #[must_use]
    pub fn render(alert: &DonorAlert) -> Self {
        let distance = distance_label(alert.distance_km);
        let minutes = travel_minutes(alert.distance_km);
        let blood_type = alert.blood_type;
        let hospital = &alert.hospital_name;
        let location = &alert.location_link;

        match &alert.variant {
            AlertVariant::Direct => Self {
                subject: format!("Urgent Blood Request: {blood_type} Needed Nearby"),
                text: format!(
                    "A hospital near you urgently needs blood.\n\n\
                     Blood type: {blood_type}\n\
                     Hospital: {hospital}\n\
                     Distance: {distance} away\n\
                     Est. time: ~{minutes} mins\n\
                     Directions: {location}\n\n\
                     You are a registered BloodBridge donor near this request.\n"
                ),
                html: format!(
                    r#"<div style="font-family:Arial,sans-serif;max-width:520px;margin:auto;">
  <h2 style="color:#dc2626;">BloodBridge Emergency Alert</h2>
  <p>A hospital near you urgently needs blood.</p>
  <table width="100%">
    <tr><td>Blood Type</td><td align="right"><strong>{blood_type}</strong></td></tr>
    <tr><td>Hospital</td><td align="right">{hospital}</td></tr>
    <tr><td>Distance</td><td align="right">{distance} away</td></tr>
    <tr><td>Est. Time</td><td align="right">~{minutes} mins</td></tr>
  </table>
  <p><a href="{location}">Get Directions</a></p>
  <p style="color:#64748b;font-size:12px;">You are a registered BloodBridge donor near this request.</p>
</div>"#
                ),
            },
            AlertVariant::LoginRequired { login_url } => Self {
                subject: format!("URGENT: {blood_type} Blood Needed, 15 Min to Respond"),
                text: format!(
                    "This request was approved by a BloodBridge admin.\n\
                     You have 15 minutes to accept or decline.\n\n\
                     Blood type: {blood_type}\n\
                     Hospital: {hospital}\n\
                     Distance: {distance} away\n\
                     Est. travel: ~{minutes} mins\n\n\
                     Log in to accept or decline: {login_url}\n\
                     Hospital location: {location}\n\n\
                     If you do not respond within 15 minutes, this request expires for you.\n"
                ),
                html: format!(
                    r#"<div style="font-family:Arial,sans-serif;max-width:540px;margin:auto;">
  <h2 style="color:#dc2626;">Emergency Blood Request</h2>
  <p>This request was approved by a BloodBridge admin.</p>
  <p><strong>You have 15 minutes to Accept or Decline</strong></p>
  <table width="100%">
    <tr><td>Blood Type</td><td align="right"><strong>{blood_type}</strong></td></tr>
    <tr><td>Hospital</td><td align="right">{hospital}</td></tr>
    <tr><td>Distance</td><td align="right">{distance} away</td></tr>
    <tr><td>Est. Travel</td><td align="right">~{minutes} mins</td></tr>
  </table>
  <p><a href="{login_url}">Login to Accept / Decline</a></p>
  <p><a href="{location}">View Hospital Location</a></p>
  <p style="color:#64748b;font-size:12px;">If you do not respond within 15 minutes, this request expires for you.</p>
</div>"#
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BloodRequirement, BloodType, Email};

    fn alert(variant: AlertVariant) -> DonorAlert {
        DonorAlert {
            donor_name: "Ravi".to_string(),
            donor_email: Email::from("ravi@example.com"),
            hospital_name: "City General".to_string(),
            blood_type: BloodRequirement::Exact(BloodType::OPositive),
            distance_km: 4.24,
            location_link: "https://maps.example.com/?q=city+general".to_string(),
            variant,
        }
    }

    #[test]
    fn distance_and_eta_formatting() {
        assert_eq!(distance_label(4.24), "4.2 km");
        assert_eq!(distance_label(30.0), "30.0 km");
        assert_eq!(travel_minutes(4.24), 6);
        assert_eq!(travel_minutes(30.0), 45);
    }

    #[test]
    fn direct_alert_links_to_location() {
        let content = AlertContent::render(&alert(AlertVariant::Direct));
        assert_eq!(content.subject, "Urgent Blood Request: O+ Needed Nearby");
        assert!(content.text.contains("4.2 km away"));
        assert!(content.text.contains("~6 mins"));
        assert!(content.html.contains("https://maps.example.com/?q=city+general"));
        assert!(!content.text.contains("donor_login"));
    }

    #[test]
    fn login_alert_links_to_login_page() {
        let content = AlertContent::render(&alert(AlertVariant::LoginRequired {
            login_url: "http://localhost:5000/donor_login.html".to_string(),
        }));
        assert!(content.subject.contains("15 Min to Respond"));
        assert!(content.text.contains("http://localhost:5000/donor_login.html"));
        assert!(content.html.contains("View Hospital Location"));
    }
}
