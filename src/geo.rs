//! Great-circle distance between stations.
//!
//! Positions are (latitude, longitude) in degrees.

use std::f64::consts::PI;

/// Mean Earth radius in statute miles.
const EARTH_RADIUS_MI: f64 = 3958.8;

const DEG_TO_RAD: f64 = PI / 180.0;

/// Distance in statute miles using the haversine formula.
///
/// The Earth is taken as a sphere of mean radius, so results differ from an
/// ellipsoidal (WGS84) geodesic by around 0.5%. North-south legs come out
/// long near the equator and short near the poles.
///
/// # Example
///
/// ```
/// use rbn_filter::geo::distance_miles;
///
/// // One degree of latitude is roughly 69 miles
/// let d = distance_miles((0.0, 0.0), (1.0, 0.0));
/// assert!((d - 69.1).abs() < 0.5);
/// ```
pub fn distance_miles(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = from;
    let (lat2, lon2) = to;

    let lat1_rad = lat1 * DEG_TO_RAD;
    let lat2_rad = lat2 * DEG_TO_RAD;
    let delta_lat = (lat2 - lat1) * DEG_TO_RAD;
    let delta_lon = (lon2 - lon1) * DEG_TO_RAD;

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_MI * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_zero() {
        assert_eq!(distance_miles((41.7, -72.7), (41.7, -72.7)), 0.0);
    }

    #[test]
    fn test_distance_symmetry() {
        let a = (41.7, -72.7);
        let b = (35.7, 139.7);
        assert!((distance_miles(a, b) - distance_miles(b, a)).abs() < 1e-9);
    }

    #[test]
    fn test_distance_newington_to_tokyo() {
        // About 6,700 statute miles
        let d = distance_miles((41.71, -72.73), (35.68, 139.69));
        assert!((6500.0..6900.0).contains(&d), "got {}", d);
    }

    #[test]
    fn test_distance_antipodes() {
        let d = distance_miles((0.0, 0.0), (0.0, 180.0));
        assert!((d - PI * EARTH_RADIUS_MI).abs() < 1.0);
    }

    #[test]
    fn test_distance_within_spherical_error_of_geodesic() {
        // WGS84 length of one degree of latitude at the equator and the pole
        let equator = distance_miles((0.0, 0.0), (1.0, 0.0));
        let pole = distance_miles((89.0, 0.0), (90.0, 0.0));
        assert!(((equator - 68.71) / 68.71).abs() < 0.006, "got {}", equator);
        assert!(((pole - 69.40) / 69.40).abs() < 0.006, "got {}", pole);
    }
}
