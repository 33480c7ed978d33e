//! Declination, inclination and intensities derived from the field vector,
//! and their annual rates of change.

use serde::{Deserialize, Serialize};

use crate::field::FieldVector;
use crate::utils::normalize_degrees;

/// Below this intensity (nT) the field direction is indeterminate.
pub const MIN_INTENSITY: f64 = 1e-4;

/// Angles in degrees, intensities in nT.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldElements {
    pub declination: f64,
    pub inclination: f64,
    pub horizontal_intensity: f64,
    pub total_intensity: f64,
}

/// Declination uses the half-angle form `2·atan2(y, h + x)`, which stays
/// well conditioned when the field points nearly due south.
pub fn to_declination_inclination(v: &FieldVector) -> FieldElements {
    let h = v.horizontal_intensity();
    let f = v.total_intensity();
    if f < MIN_INTENSITY {
        return FieldElements {
            declination: f64::NAN,
            inclination: f64::NAN,
            horizontal_intensity: h,
            total_intensity: f,
        };
    }

    let inclination = v.z.atan2(h).to_degrees();
    let declination = if h < MIN_INTENSITY {
        f64::NAN
    } else if h + v.x < MIN_INTENSITY {
        180.0
    } else {
        (2.0 * v.y.atan2(h + v.x)).to_degrees()
    };

    FieldElements {
        declination,
        inclination,
        horizontal_intensity: h,
        total_intensity: f,
    }
}

/// Change per year of every field quantity. Angles in degrees/yr.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub declination: f64,
    pub inclination: f64,
    pub horizontal_intensity: f64,
    pub north: f64,
    pub east: f64,
    pub vertical: f64,
    pub total_intensity: f64,
}

/// Finite difference of two evaluations `years` apart.
pub fn change_by_difference(from: &FieldVector, to: &FieldVector, years: f64) -> FieldChange {
    let a = to_declination_inclination(from);
    let b = to_declination_inclination(to);
    FieldChange {
        declination: normalize_degrees(b.declination - a.declination) / years,
        inclination: (b.inclination - a.inclination) / years,
        horizontal_intensity: (b.horizontal_intensity - a.horizontal_intensity) / years,
        north: (to.x - from.x) / years,
        east: (to.y - from.y) / years,
        vertical: (to.z - from.z) / years,
        total_intensity: (b.total_intensity - a.total_intensity) / years,
    }
}

/// Rates from the component change `delta` (nT/yr) at `v`, using the
/// derivatives of D, I, H and F with respect to X, Y and Z.
pub fn change_by_derivative(v: &FieldVector, delta: &FieldVector) -> FieldChange {
    let FieldVector { x, y, z } = *v;
    let h = v.horizontal_intensity();
    let f = v.total_intensity();
    let dh = (x * delta.x + y * delta.y) / h;
    FieldChange {
        declination: ((x * delta.y - y * delta.x) / (h * h)).to_degrees(),
        inclination: ((h * delta.z - z * dh) / (f * f)).to_degrees(),
        horizontal_intensity: dh,
        north: delta.x,
        east: delta.y,
        vertical: delta.z,
        total_intensity: (x * delta.x + y * delta.y + z * delta.z) / f,
    }
}
