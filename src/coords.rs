//! Geodetic to geocentric conversion for field evaluation.

use crate::config::Ellipsoid;

/// Closest a point may get to either pole, in degrees (~300 ft).
pub const POLE_MARGIN_DEG: f64 = 0.001;

/// Geocentric spherical position plus the rotation back to the geodetic frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeocentricCoordinates {
    pub colatitude_deg: f64,
    pub radius_km: f64,
    /// Cosine of the geodetic minus geocentric latitude.
    pub cos_delta: f64,
    /// Sine of the geodetic minus geocentric latitude.
    pub sin_delta: f64,
    /// Sine of geocentric latitude (cosine of colatitude).
    pub sin_lat: f64,
    /// Cosine of geocentric latitude (sine of colatitude).
    pub cos_lat: f64,
}

impl GeocentricCoordinates {
    /// A point already given in geocentric coordinates; no frame rotation.
    pub fn spherical(colatitude_deg: f64, radius_km: f64) -> Self {
        let lat = clamp_latitude(90.0 - colatitude_deg).to_radians();
        let (sin_lat, cos_lat) = lat.sin_cos();
        Self {
            colatitude_deg: 90.0 - lat.to_degrees(),
            radius_km,
            cos_delta: 1.0,
            sin_delta: 0.0,
            sin_lat,
            cos_lat,
        }
    }
}

fn clamp_latitude(lat_deg: f64) -> f64 {
    lat_deg.clamp(-90.0 + POLE_MARGIN_DEG, 90.0 - POLE_MARGIN_DEG)
}

/// Convert a geodetic colatitude and altitude above the ellipsoid to
/// geocentric colatitude and radius. Closed form, no iteration.
pub fn geodetic_to_geocentric(
    colatitude_deg: f64,
    altitude_km: f64,
    ellipsoid: &Ellipsoid,
) -> GeocentricCoordinates {
    let Ellipsoid { a2, b2 } = *ellipsoid;
    let gd_lat_rad = clamp_latitude(90.0 - colatitude_deg).to_radians();
    let (slat, clat) = gd_lat_rad.sin_cos();

    let aa = a2 * clat * clat;
    let bb = b2 * slat * slat;
    let cc = aa + bb;
    let dd = cc.sqrt();
    let radius_km = (altitude_km * (altitude_km + 2.0 * dd) + (a2 * aa + b2 * bb) / cc).sqrt();
    let cos_delta = (altitude_km + dd) / radius_km;
    let sin_delta = (a2 - b2) / dd * slat * clat / radius_km;

    let sin_lat = slat * cos_delta - clat * sin_delta;
    let cos_lat = clat * cos_delta + slat * sin_delta;

    GeocentricCoordinates {
        colatitude_deg: 90.0 - sin_lat.atan2(cos_lat).to_degrees(),
        radius_km,
        cos_delta,
        sin_delta,
        sin_lat,
        cos_lat,
    }
}
