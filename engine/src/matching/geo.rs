//! Great-circle donor selection.

use crate::matching::cooldown::is_eligible;
use crate::types::{ApprovalStatus, BloodRequirement, Donor, GeoPoint};
use chrono::NaiveDate;

/// Mean Earth radius, kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Notification radius, kilometres
pub const MATCH_RADIUS_KM: f64 = 30.0;

/// Haversine distance in kilometres between two points given in degrees.
#[must_use]
pub fn haversine_km(from: GeoPoint, to: GeoPoint) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let d_phi = (to.lat - from.lat).to_radians();
    let d_lambda = (to.lng - from.lng).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// A qualifying donor and its distance from the request
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate<'a> {
    /// The donor
    pub donor: &'a Donor,
    /// Great-circle distance from the request, kilometres
    pub distance_km: f64,
}

/// Donors that qualify for a request at `origin`.
///
/// A donor qualifies when it is approved, has a usable coordinate, its blood
/// group satisfies `requirement`, it is not cooling down on `today` and it
/// lies within `radius_km` (inclusive). Each donor appears at most once; the
/// order follows `donors`.
#[must_use]
pub fn find_candidates<'a>(
    origin: GeoPoint,
    requirement: BloodRequirement,
    donors: &'a [Donor],
    radius_km: f64,
    today: NaiveDate,
) -> Vec<Candidate<'a>> {
    let Some(origin) = GeoPoint::located(origin.lat, origin.lng) else {
        tracing::debug!("Request has no usable coordinate, no donors matched");
        return Vec::new();
    };

    donors
        .iter()
        .filter(|donor| donor.status == ApprovalStatus::Approved)
        .filter(|donor| requirement.accepts(donor.blood_group))
        .filter(|donor| {
            let eligible = is_eligible(donor.cooldown_until, today);
            if !eligible {
                tracing::debug!(donor = %donor.email, cooldown_until = ?donor.cooldown_until, "Skipping donor on cooldown");
            }
            eligible
        })
        .filter_map(|donor| {
            let position = donor.position()?;
            let distance_km = haversine_km(origin, position);
            (distance_km <= radius_km).then_some(Candidate { donor, distance_km })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{BloodType, Email, RecordId};
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;

    fn today() -> NaiveDate {
        "2025-01-01".parse().unwrap()
    }

    fn donor_at(email: &str, blood_group: BloodType, lat: f64, lng: f64) -> Donor {
        Donor {
            id: RecordId::new(email),
            name: email.to_string(),
            contact: "555-0100".to_string(),
            email: Email::from(email),
            blood_group,
            location: String::new(),
            lat,
            lng,
            age_confirmed: true,
            status: ApprovalStatus::Approved,
            total_donations: 0,
            lives_saved: 0,
            last_donation: None,
            cooldown_until: None,
            created_at: DateTime::<Utc>::default(),
        }
    }

    /// Point `distance_km` from `origin` along `bearing_deg`.
    fn destination(origin: GeoPoint, bearing_deg: f64, distance_km: f64) -> GeoPoint {
        let delta = distance_km / EARTH_RADIUS_KM;
        let theta = bearing_deg.to_radians();
        let phi1 = origin.lat.to_radians();
        let lambda1 = origin.lng.to_radians();
        let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
        let lambda2 = lambda1
            + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());
        GeoPoint::new(phi2.to_degrees(), lambda2.to_degrees())
    }

    #[test]
    fn known_city_distance() {
        // Bengaluru to Chennai, roughly 290 km
        let d = haversine_km(GeoPoint::new(12.9716, 77.5946), GeoPoint::new(13.0827, 80.2707));
        assert!((d - 290.2).abs() < 1.0, "got {d}");
        assert!(haversine_km(GeoPoint::new(10.0, 10.0), GeoPoint::new(10.0, 10.0)).abs() < 1e-9);
    }

    #[test]
    fn filters_on_approval_blood_type_cooldown_and_location() {
        let origin = GeoPoint::new(12.9716, 77.5946);
        let near = destination(origin, 45.0, 5.0);

        let mut pending = donor_at("pending@x.org", BloodType::OPositive, near.lat, near.lng);
        pending.status = ApprovalStatus::Pending;
        let mut cooling = donor_at("cooling@x.org", BloodType::OPositive, near.lat, near.lng);
        cooling.cooldown_until = Some(today());
        let donors = vec![
            donor_at("match@x.org", BloodType::OPositive, near.lat, near.lng),
            donor_at("wrongtype@x.org", BloodType::AbNegative, near.lat, near.lng),
            donor_at("nolocation@x.org", BloodType::OPositive, 0.0, 0.0),
            pending,
            cooling,
        ];

        let found = find_candidates(
            origin,
            BloodRequirement::Exact(BloodType::OPositive),
            &donors,
            MATCH_RADIUS_KM,
            today(),
        );
        let emails: Vec<_> = found.iter().map(|c| c.donor.email.as_str()).collect();
        assert_eq!(emails, vec!["match@x.org"]);
        assert!((found[0].distance_km - 5.0).abs() < 0.01);
    }

    #[test]
    fn wildcard_matches_any_blood_group() {
        let origin = GeoPoint::new(40.0, -74.0);
        let near = destination(origin, 180.0, 10.0);
        let donors = vec![
            donor_at("a@x.org", BloodType::APositive, near.lat, near.lng),
            donor_at("b@x.org", BloodType::ONegative, near.lat, near.lng),
        ];

        let found = find_candidates(origin, BloodRequirement::Any, &donors, MATCH_RADIUS_KM, today());
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn request_without_location_matches_nobody() {
        let donors = vec![donor_at("a@x.org", BloodType::APositive, 1.0, 1.0)];
        let found = find_candidates(
            GeoPoint::new(0.0, 0.0),
            BloodRequirement::Any,
            &donors,
            MATCH_RADIUS_KM,
            today(),
        );
        assert!(found.is_empty());
    }

    #[test]
    fn radius_boundary_is_inclusive() {
        let origin = GeoPoint::new(51.5, -0.12);
        let edge = destination(origin, 90.0, 30.0);
        let donors = vec![donor_at("edge@x.org", BloodType::BPositive, edge.lat, edge.lng)];
        let exact = haversine_km(origin, edge);

        let found = find_candidates(origin, BloodRequirement::Any, &donors, exact, today());
        assert_eq!(found.len(), 1);

        let found = find_candidates(origin, BloodRequirement::Any, &donors, exact - 1e-9, today());
        assert!(found.is_empty());
    }

    proptest! {
        #[test]
        fn inside_radius_included_outside_excluded(
            lat in 5.0f64..60.0,
            lng in 5.0f64..170.0,
            bearing in 0.0f64..360.0,
            inside in 0.01f64..29.9,
            outside in 30.1f64..200.0,
        ) {
            let origin = GeoPoint::new(lat, lng);
            let near = destination(origin, bearing, inside);
            let far = destination(origin, bearing, outside);
            let donors = vec![
                donor_at("near@x.org", BloodType::OPositive, near.lat, near.lng),
                donor_at("far@x.org", BloodType::OPositive, far.lat, far.lng),
            ];

            let found = find_candidates(
                origin,
                BloodRequirement::Exact(BloodType::OPositive),
                &donors,
                MATCH_RADIUS_KM,
                today(),
            );
            prop_assert_eq!(found.len(), 1);
            prop_assert_eq!(found[0].donor.email.as_str(), "near@x.org");
        }
    }
}
