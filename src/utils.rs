use serde::{Deserialize, Serialize};
use time::Date;

use crate::error::{Error, Result};

// Convert from calendar date to year in decimal form (2020-07-02 -> 2020.5)
pub fn decimal_year(date: Date) -> f64 {
    let days = time::util::days_in_year(date.year()) as f64;
    date.year() as f64 + (date.ordinal() - 1) as f64 / days
}

// Convert from year in decimal form to the nearest calendar day
pub fn date_from_decimal_year(decimal_year: f64) -> Result<Date> {
    if !decimal_year.is_finite() {
        return Err(Error::InvalidOptions(format!(
            "decimal year {decimal_year} is not finite"
        )));
    }
    let mut year = decimal_year.floor() as i32;
    let days = time::util::days_in_year(year);
    let mut day = (decimal_year.fract() * days as f64).round() as u16;
    if day >= days {
        year += 1;
        day = 0;
    }
    Date::from_ordinal_date(year, day + 1)
        .map_err(|e| Error::InvalidOptions(format!("decimal year {decimal_year}: {e}")))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElevationUnit {
    #[default]
    Meter,
    Kilometer,
    Foot,
    Mile,
}

impl ElevationUnit {
    pub fn km_per_unit(self) -> f64 {
        match self {
            ElevationUnit::Meter => 1e-3,
            ElevationUnit::Kilometer => 1.0,
            ElevationUnit::Foot => 0.3048e-3,
            ElevationUnit::Mile => 1.609344,
        }
    }
}

/// Whether an elevation is measured up (altitude) or down (depth) from the
/// reference surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElevationReference {
    #[default]
    Altitude,
    Depth,
}

/// Signed elevation in km, positive above the reference surface.
pub fn elevation_to_km(value: f64, unit: ElevationUnit, reference: ElevationReference) -> f64 {
    let km = value * unit.km_per_unit();
    match reference {
        ElevationReference::Altitude => km,
        ElevationReference::Depth => -km,
    }
}

/// Wrap an angle difference in degrees into (-180, 180].
pub fn normalize_degrees(delta: f64) -> f64 {
    let mut d = delta % 360.0;
    if d > 180.0 {
        d -= 360.0;
    } else if d <= -180.0 {
        d += 360.0;
    }
    d
}
