//! Great-circle distance helper.
//!
//! Kept from the teacher crate's `HaversineMatrix` fallback provider and
//! generalized into a free function: the planner core itself never treats
//! haversine distance as a substitute for a real walking-time lookup (the
//! Distance Cache's contract, §4.2, is to leave unknown pairs unknown), but
//! proximity checks that only need straight-line distance — the Sequencer's
//! closest-to-start/end hinting (§4.5) and the static test `GeoProvider`'s
//! distance-matrix synthesis — use it directly.

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two (lat, lng) points, in kilometers.
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lng1) = from;
    let (lat2, lng2) = to;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_is_zero() {
        let dist = haversine_km((36.1, -115.1), (36.1, -115.1));
        assert!(dist < 0.001, "same point should have ~0 distance");
    }

    #[test]
    fn known_distance_is_in_range() {
        // Las Vegas to Los Angeles, actual distance ~370 km.
        let dist = haversine_km((36.17, -115.14), (34.05, -118.24));
        assert!(dist > 350.0 && dist < 400.0, "LV to LA should be ~370km, got {dist}");
    }

    #[test]
    fn is_symmetric() {
        let a = (36.1, -115.1);
        let b = (36.2, -115.2);
        assert_eq!(haversine_km(a, b), haversine_km(b, a));
    }
}
