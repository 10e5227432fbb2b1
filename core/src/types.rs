//! Shared primitive types used across the engine.

use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// A stable, unique identifier for a platform user.
pub type UserId = String;

/// A stable, unique identifier for a partner business.
pub type PartnerId = String;

/// A stable, unique identifier for a catalog opportunity.
pub type OpportunityId = String;

/// A parking-session handle owned by the host platform.
pub type SessionId = String;

/// A stable, unique identifier for a ledger row.
pub type InteractionId = String;

/// Meters per degree of latitude (and of longitude at the equator).
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Mean earth radius in meters, for great-circle distance.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS-84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle (haversine) distance to `other`, in meters.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let lat_a = self.lat.to_radians();
        let lat_b = other.lat.to_radians();
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();

        let h = (d_lat / 2.0).sin().powi(2)
            + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * h.sqrt().asin()
    }

    /// Axis-aligned box of `radius_m` around this point. Coarse pre-filter
    /// only; precise distance always goes through `distance_m`.
    pub fn bounding_box(&self, radius_m: f64) -> BoundingBox {
        let d_lat = radius_m / METERS_PER_DEGREE;
        // Longitude degrees shrink with latitude; clamp so the box stays
        // finite near the poles.
        let lat_cos = self.lat.to_radians().cos().max(0.01);
        let d_lon = radius_m / (METERS_PER_DEGREE * lat_cos);
        BoundingBox {
            min_lat: self.lat - d_lat,
            max_lat: self.lat + d_lat,
            min_lon: self.lon - d_lon,
            max_lon: self.lon + d_lon,
        }
    }
}

/// Latitude/longitude box used by the candidate filter's geo pre-pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, p: &GeoPoint) -> bool {
        p.lat >= self.min_lat
            && p.lat <= self.max_lat
            && p.lon >= self.min_lon
            && p.lon <= self.max_lon
    }
}

/// Canonical three-letter weekday code ("mon".."sun") used in trigger
/// rules, preference rows and their JSON storage.
pub fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

pub fn weekday_from_code(code: &str) -> Option<Weekday> {
    match code {
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_known_distance() {
        // Ferry Building to Coit Tower, San Francisco: ~1.3 km.
        let a = GeoPoint::new(37.7955, -122.3937);
        let b = GeoPoint::new(37.8024, -122.4058);
        let d = a.distance_m(&b);
        assert!(
            (d - 1300.0).abs() < 200.0,
            "Expected roughly 1.3km, got {d}m"
        );
    }

    #[test]
    fn distance_to_self_is_zero() {
        let p = GeoPoint::new(51.5, -0.12);
        assert!(p.distance_m(&p) < 1e-6);
    }

    #[test]
    fn bounding_box_contains_points_within_radius() {
        let center = GeoPoint::new(40.0, -74.0);
        let bbox = center.bounding_box(500.0);
        // 300m north of center.
        let near = GeoPoint::new(40.0 + 300.0 / 111_320.0, -74.0);
        // ~2km east of center.
        let far = GeoPoint::new(40.0, -74.0 + 0.025);
        assert!(bbox.contains(&near));
        assert!(!bbox.contains(&far));
    }

    #[test]
    fn weekday_codes_round_trip() {
        for day in [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ] {
            assert_eq!(weekday_from_code(weekday_code(day)), Some(day));
        }
        assert_eq!(weekday_from_code("noday"), None);
    }
}
