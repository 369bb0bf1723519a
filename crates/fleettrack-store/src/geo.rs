//! Great-circle distance for the in-memory radius query.

use fleettrack_core::types::GeoPoint;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance between two WGS84 points, in meters.
pub fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint {
            latitude,
            longitude,
        }
    }

    #[test]
    fn test_zero_distance() {
        let p = point(40.7128, -74.0060);
        assert_eq!(haversine_meters(p, p), 0.0);
    }

    #[test]
    fn test_known_distance() {
        // Empire State Building to Times Square, roughly 1.1 km.
        let esb = point(40.7484, -73.9857);
        let ts = point(40.7580, -73.9855);
        let d = haversine_meters(esb, ts);
        assert!((d - 1068.0).abs() < 20.0, "got {d}");
    }

    #[test]
    fn test_symmetry() {
        let a = point(51.5007, -0.1246);
        let b = point(48.8584, 2.2945);
        assert!((haversine_meters(a, b) - haversine_meters(b, a)).abs() < 1e-6);
    }
}
