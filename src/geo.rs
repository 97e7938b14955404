// Great-circle distance and ETA heuristics

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Builds coordinates only when both halves are present
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Self { latitude, longitude }),
            _ => None,
        }
    }
}

/// Haversine distance between two points, in kilometres
pub fn haversine_km(from: Coordinates, to: Coordinates) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Straight-line travel estimate
///
/// This is a heuristic (`ceil(distance / speed * 60)`) and knows nothing
/// about roads or traffic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EtaEstimate {
    pub distance_km: f64,
    pub estimated_minutes: i64,
}

pub fn estimate_minutes(distance_km: f64, average_speed_kmh: f64) -> i64 {
    if distance_km <= 0.0 || average_speed_kmh <= 0.0 {
        return 0;
    }
    // multiply first so round distances divide exactly
    (distance_km * 60.0 / average_speed_kmh).ceil() as i64
}

pub fn estimate_eta(from: Coordinates, to: Coordinates, average_speed_kmh: f64) -> EtaEstimate {
    let distance_km = haversine_km(from, to);
    EtaEstimate {
        distance_km,
        estimated_minutes: estimate_minutes(distance_km, average_speed_kmh),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_km_at_thirty_kmh_is_twenty_minutes() {
        assert_eq!(estimate_minutes(10.0, 30.0), 20);
    }

    #[test]
    fn test_partial_minutes_round_up() {
        assert_eq!(estimate_minutes(10.1, 30.0), 21);
        assert_eq!(estimate_minutes(0.01, 30.0), 1);
    }

    #[test]
    fn test_zero_distance() {
        let here = Coordinates::new(6.5244, 3.3792);
        assert_eq!(haversine_km(here, here), 0.0);
        assert_eq!(estimate_eta(here, here, 30.0).estimated_minutes, 0);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let a = Coordinates::new(0.0, 0.0);
        let b = Coordinates::new(1.0, 0.0);
        let km = haversine_km(a, b);
        assert!((km - 111.195).abs() < 0.01, "got {}", km);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let lagos = Coordinates::new(6.5244, 3.3792);
        let abuja = Coordinates::new(9.0765, 7.3986);
        let there = haversine_km(lagos, abuja);
        let back = haversine_km(abuja, lagos);
        assert!((there - back).abs() < 1e-9);
        assert!(there > 500.0 && there < 550.0, "got {}", there);
    }

    #[test]
    fn test_from_parts_requires_both() {
        assert!(Coordinates::from_parts(Some(1.0), None).is_none());
        assert_eq!(
            Coordinates::from_parts(Some(1.0), Some(2.0)),
            Some(Coordinates::new(1.0, 2.0))
        );
    }
}
