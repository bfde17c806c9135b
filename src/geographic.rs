//! Great-circle distance on a spherical Earth
//!
//! Route matching only needs distances on the scale of a city, so a
//! spherical model is precise enough and much cheaper than a full geodesic
//! solution on the WGS84 ellipsoid.

use dimensioned::si::{M, Meter};

use crate::types::Point;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Degrees to radians.
pub const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

/// Calculate the haversine distance between two points.
///
/// Points are interpreted as `(latitude, longitude)` in decimal degrees. The
/// result is symmetric in its arguments and exactly zero for equal points.
pub fn distance(p1: &Point, p2: &Point) -> Meter<f64> {
    let lat1 = p1.lat() * DEG_TO_RAD;
    let lat2 = p2.lat() * DEG_TO_RAD;
    let del_lat = (p2.lat() - p1.lat()) * DEG_TO_RAD;
    let del_lon = (p2.lon() - p1.lon()) * DEG_TO_RAD;

    let h = (del_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (del_lon / 2.0).sin().powi(2);
    // Rounding can push h slightly outside of [0, 1] for antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS * c * M
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use dimensioned::si::M;

    use super::distance;
    use crate::point;

    #[test]
    fn test_known_distance() {
        let d = distance(
            &point!(50.06638889, 5.71472222),
            &point!(58.64388889, 3.07000000),
        );
        assert_relative_eq!(d.value_unsafe, 968_900.0, max_relative = 0.01);
    }

    #[test]
    fn test_zero_distance() {
        assert_eq!(distance(&point!(0, 0), &point!(0, 0)), 0.0 * M);
        assert_eq!(
            distance(&point!(47.6, -122.3), &point!(47.6, -122.3)),
            0.0 * M
        );
    }

    #[test]
    fn test_one_degree_on_equator() {
        // 2 * pi * R / 360
        let d = distance(&point!(0, 0), &point!(0, 1));
        assert_relative_eq!(d.value_unsafe, 111_194.93, max_relative = 0.000_001);
    }

    #[test]
    fn test_antipodal_points() {
        let d = distance(&point!(0, 0), &point!(0, 180));
        assert!(d.value_unsafe.is_finite());
        assert_relative_eq!(
            d.value_unsafe,
            std::f64::consts::PI * super::EARTH_RADIUS,
            max_relative = 0.000_001
        );

        let d = distance(&point!(90, 0), &point!(-90, 0));
        assert_relative_eq!(
            d.value_unsafe,
            std::f64::consts::PI * super::EARTH_RADIUS,
            max_relative = 0.000_001
        );
    }

    #[cfg(not(target_arch = "wasm32"))]
    mod properties {
        use quickcheck_macros::quickcheck;

        use super::super::distance;
        use crate::types::Point;

        fn valid(lat: f64, lon: f64) -> bool {
            lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0
        }

        #[quickcheck]
        fn qc_distance_to_self_is_zero(lat: f64, lon: f64) -> bool {
            if !valid(lat, lon) {
                return true;
            }
            let p = Point::new(lat, lon);
            distance(&p, &p).value_unsafe == 0.0
        }

        #[quickcheck]
        fn qc_distance_is_symmetric(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> bool {
            if !valid(lat1, lon1) || !valid(lat2, lon2) {
                return true;
            }
            let p1 = Point::new(lat1, lon1);
            let p2 = Point::new(lat2, lon2);
            distance(&p1, &p2) == distance(&p2, &p1)
        }
    }
}
