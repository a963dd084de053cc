//! Haversine distance helpers.
//!
//! Ported from the platform's `calculate_distance`/`calculate_distance_3d`
//! pair: surface distance via haversine on the WGS84 mean radius, with an
//! optional altitude delta folded in as the third leg of a right triangle.
//! Never panics on malformed input; a missing latitude just means "no
//! distance", not an error.

/// WGS84 mean earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Surface (2D) distance in meters between two WGS84 points.
/// Returns 0.0 if either latitude is absent.
pub fn distance_2d(lat1: Option<f64>, lon1: Option<f64>, lat2: Option<f64>, lon2: Option<f64>) -> f64 {
    let (Some(lat1), Some(lon1), Some(lat2), Some(lon2)) = (lat1, lon1, lat2, lon2) else {
        return 0.0;
    };

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// 3D distance in meters, folding in the altitude delta as `sqrt(surface^2 + dalt^2)`.
/// Returns 0.0 if either latitude is absent.
pub fn distance_3d(
    lat1: Option<f64>,
    lon1: Option<f64>,
    alt1: Option<f64>,
    lat2: Option<f64>,
    lon2: Option<f64>,
    alt2: Option<f64>,
) -> f64 {
    if lat1.is_none() || lat2.is_none() {
        return 0.0;
    }
    let surface = distance_2d(lat1, lon1, lat2, lon2);
    let dalt = alt2.unwrap_or(0.0) - alt1.unwrap_or(0.0);
    (surface * surface + dalt * dalt).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_latitude_returns_zero() {
        assert_eq!(distance_2d(None, Some(1.0), Some(2.0), Some(2.0)), 0.0);
        assert_eq!(
            distance_3d(Some(1.0), Some(1.0), Some(0.0), None, Some(1.0), Some(0.0)),
            0.0
        );
    }

    #[test]
    fn same_point_is_zero() {
        assert_eq!(distance_2d(Some(60.3), Some(24.8), Some(60.3), Some(24.8)), 0.0);
    }

    #[test]
    fn one_degree_latitude_is_about_111km() {
        let d = distance_2d(Some(60.0), Some(24.0), Some(61.0), Some(24.0));
        assert!((d - 111_000.0).abs() < 2_000.0, "got {d}");
    }

    #[test]
    fn altitude_delta_extends_3d_distance() {
        let surface = distance_2d(Some(60.0), Some(24.0), Some(60.0), Some(24.001));
        let d3 = distance_3d(
            Some(60.0),
            Some(24.0),
            Some(0.0),
            Some(60.0),
            Some(24.001),
            Some(100.0),
        );
        assert!(d3 > surface);
        let expected = (surface * surface + 100.0 * 100.0).sqrt();
        assert!((d3 - expected).abs() < 1e-6);
    }
}
