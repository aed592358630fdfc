//! Great-circle distance and bearing between coordinates

use crate::domain::types::LatLng;
use geo::{Distance, Haversine, Point};

const METERS_PER_KM: f64 = 1000.0;

#[inline]
fn to_point(loc: LatLng) -> Point<f64> {
    Point::new(loc.lng, loc.lat)
}

/// Haversine distance between two coordinates in kilometers
#[inline]
pub fn distance_km(a: LatLng, b: LatLng) -> f64 {
    Haversine.distance(to_point(a), to_point(b)) / METERS_PER_KM
}

/// Initial bearing from `from` towards `to`, in degrees within `[0, 360)`
///
/// Identical points yield 0.
pub fn initial_bearing_deg(from: LatLng, to: LatLng) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlng = (to.lng - from.lng).to_radians();

    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();

    let bearing = y.atan2(x).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if bearing >= 360.0 {
        0.0
    } else {
        bearing
    }
}
