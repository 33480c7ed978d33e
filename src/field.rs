//! Spherical-harmonic synthesis of the field vector.

use serde::{Deserialize, Serialize};

use crate::config::Ellipsoid;
use crate::coords::{geodetic_to_geocentric, GeocentricCoordinates};
use crate::model::ResolvedCoefficients;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateSystem {
    #[default]
    Geodetic,
    Geocentric,
}

/// Evaluation point. Elevation is signed km, positive above the reference
/// surface (ellipsoid for geodetic points, reference sphere for geocentric).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_km: f64,
    pub coordinate_system: CoordinateSystem,
}

impl GeoPoint {
    pub fn geodetic(latitude: f64, longitude: f64, elevation_km: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation_km,
            coordinate_system: CoordinateSystem::Geodetic,
        }
    }

    pub fn geocentric(latitude: f64, longitude: f64, elevation_km: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation_km,
            coordinate_system: CoordinateSystem::Geocentric,
        }
    }
}

/// North (`x`), east (`y`) and down (`z`) components in nT. Horizontal and
/// total intensity are always derived from these, never stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl FieldVector {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn horizontal_intensity(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn total_intensity(&self) -> f64 {
        self.horizontal_intensity().hypot(self.z)
    }
}

impl std::ops::Sub for FieldVector {
    type Output = FieldVector;

    fn sub(self, rhs: FieldVector) -> FieldVector {
        FieldVector::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Schmidt quasi-normalised Legendre terms, flat and 1-indexed by
/// `k = n(n+1)/2 + m`. `p[k]` holds `(n+1)·P(n,m)` and `q[k]` holds `dP(n,m)/dθ`.
struct LegendreTable {
    p: Vec<f64>,
    q: Vec<f64>,
}

impl LegendreTable {
    /// `sin_lat`/`cos_lat` are of geocentric latitude, i.e. cos/sin of colatitude.
    fn new(max_n: usize, sin_lat: f64, cos_lat: f64) -> Self {
        let npq = max_n * (max_n + 3) / 2;
        let mut p = vec![0.0; npq.max(4) + 1];
        let mut q = vec![0.0; npq.max(4) + 1];

        let root3 = 3f64.sqrt();
        p[1] = 2.0 * sin_lat;
        p[2] = 2.0 * cos_lat;
        p[3] = 4.5 * sin_lat * sin_lat - 1.5;
        p[4] = 3.0 * root3 * cos_lat * sin_lat;
        q[1] = -cos_lat;
        q[2] = sin_lat;
        q[3] = -3.0 * cos_lat * sin_lat;
        q[4] = root3 * (sin_lat * sin_lat - cos_lat * cos_lat);

        let mut k = 0;
        for n in 1..=max_n {
            let fn_ = n as f64;
            for m in 0..=n {
                k += 1;
                if k < 5 {
                    continue;
                }
                let fm = m as f64;
                if m == n {
                    let aa = (1.0 - 0.5 / fm).sqrt();
                    let j = k - n - 1;
                    p[k] = (1.0 + 1.0 / fm) * aa * cos_lat * p[j];
                    q[k] = aa * (cos_lat * q[j] + sin_lat / fm * p[j]);
                } else {
                    let aa = (fn_ * fn_ - fm * fm).sqrt();
                    let bb = ((fn_ - 1.0) * (fn_ - 1.0) - fm * fm).sqrt() / aa;
                    let cc = (2.0 * fn_ - 1.0) / aa;
                    let ii = k - n;
                    let j = k + 1 - 2 * n;
                    p[k] = (fn_ + 1.0) * (cc * sin_lat / fn_ * p[ii] - bb / (fn_ - 1.0) * p[j]);
                    q[k] = cc * (sin_lat * q[ii] - cos_lat / fn_ * p[ii]) - bb * q[j];
                }
            }
        }
        Self { p, q }
    }
}

/// cos(mλ), sin(mλ) for m in 0..=max_m. Only m = 1 calls into trig.
fn longitude_harmonics(max_m: usize, lon_rad: f64) -> (Vec<f64>, Vec<f64>) {
    let mut cos_lon = vec![0.0; max_m.max(1) + 1];
    let mut sin_lon = vec![0.0; max_m.max(1) + 1];
    cos_lon[0] = 1.0;
    sin_lon[0] = 0.0;
    sin_lon[1] = lon_rad.sin();
    cos_lon[1] = lon_rad.cos();
    for m in 2..=max_m {
        sin_lon[m] = sin_lon[m - 1] * cos_lon[1] + cos_lon[m - 1] * sin_lon[1];
        cos_lon[m] = cos_lon[m - 1] * cos_lon[1] - sin_lon[m - 1] * sin_lon[1];
    }
    (cos_lon, sin_lon)
}

/// Highest degree whose full coefficient set fits in `len` values.
fn degree_held(len: usize) -> usize {
    let mut n = 0;
    while (n + 1) * (n + 3) <= len {
        n += 1;
    }
    n
}

#[derive(Clone, Copy)]
enum Source {
    Internal,
    External,
}

struct Synthesis<'a> {
    table: &'a LegendreTable,
    cos_lon: &'a [f64],
    sin_lon: &'a [f64],
    geo: &'a GeocentricCoordinates,
    ratio: f64,
}

impl Synthesis<'_> {
    /// Accumulate north/east/down (geocentric frame) for one coefficient set.
    fn accumulate(&self, coeffs: &[f64], max_n: usize, source: Source, out: &mut FieldVector) {
        let LegendreTable { p, q } = self.table;
        // latitude is clamped off the poles, so cos_lat > 0
        let cos_lat = self.geo.cos_lat;
        let max_n = max_n.min(degree_held(coeffs.len()));
        let mut l = 0;
        let mut k = 0;
        for n in 1..=max_n {
            let fn_ = n as f64;
            let rr = match source {
                Source::Internal => self.ratio.powi(n as i32 + 2),
                Source::External => self.ratio.recip().powi(n as i32 - 1),
            };
            let radial = match source {
                Source::Internal => -1.0,
                Source::External => fn_ / (fn_ + 1.0),
            };
            for m in 0..=n {
                k += 1;
                let aa = rr * coeffs[l];
                if m == 0 {
                    out.x += aa * q[k];
                    out.z += radial * aa * p[k];
                    l += 1;
                    continue;
                }
                let bb = rr * coeffs[l + 1];
                let cc = aa * self.cos_lon[m] + bb * self.sin_lon[m];
                out.x += cc * q[k];
                out.z += radial * cc * p[k];
                let east = aa * self.sin_lon[m] - bb * self.cos_lon[m];
                out.y += east * m as f64 * p[k] / ((fn_ + 1.0) * cos_lat);
                l += 2;
            }
        }
    }
}

/// Field vector at `point` on the WGS84 ellipsoid.
pub fn evaluate(
    resolved: &ResolvedCoefficients,
    point: &GeoPoint,
    reference_radius_km: f64,
) -> FieldVector {
    evaluate_with(resolved, point, reference_radius_km, &Ellipsoid::WGS84)
}

/// Field vector at `point`, in the point's own frame (geodetic points are
/// rotated back from geocentric).
pub fn evaluate_with(
    resolved: &ResolvedCoefficients,
    point: &GeoPoint,
    reference_radius_km: f64,
    ellipsoid: &Ellipsoid,
) -> FieldVector {
    let colatitude = 90.0 - point.latitude;
    let geo = match point.coordinate_system {
        CoordinateSystem::Geodetic => {
            geodetic_to_geocentric(colatitude, point.elevation_km, ellipsoid)
        }
        CoordinateSystem::Geocentric => {
            GeocentricCoordinates::spherical(colatitude, reference_radius_km + point.elevation_km)
        }
    };

    let max_n = resolved.max_degree.max(resolved.external_degree);
    let table = LegendreTable::new(max_n, geo.sin_lat, geo.cos_lat);
    let (cos_lon, sin_lon) = longitude_harmonics(max_n, point.longitude.to_radians());
    let synthesis = Synthesis {
        table: &table,
        cos_lon: &cos_lon,
        sin_lon: &sin_lon,
        geo: &geo,
        ratio: reference_radius_km / geo.radius_km,
    };

    let mut field = FieldVector::default();
    synthesis.accumulate(
        &resolved.internal,
        resolved.max_degree,
        Source::Internal,
        &mut field,
    );
    synthesis.accumulate(
        &resolved.external,
        resolved.external_degree,
        Source::External,
        &mut field,
    );

    let x = field.x;
    field.x = x * geo.cos_delta + field.z * geo.sin_delta;
    field.z = field.z * geo.cos_delta - x * geo.sin_delta;
    field
}
