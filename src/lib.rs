//! Geomagnetic field from spherical-harmonic models (WMM, IGRF, BGGM-class).
//!
//! ```no_run
//! use geomag_rs::{compute_spot, load_model, CalculationOptions};
//! use time::{Date, Month};
//!
//! let model = load_model("WMM.COF")?;
//! let date = Date::from_calendar_date(2026, Month::March, 1).unwrap();
//! let options = CalculationOptions::at(45.0, -75.0, date);
//! let row = compute_spot(&options, date, &model)?;
//! let rate = row.declination.change_per_year.unwrap();
//! println!("D = {:.2}° ({rate:+.2}°/yr)", row.declination.value);
//! # Ok::<(), geomag_rs::Error>(())
//! ```

pub mod calc;
pub mod config;
pub mod coords;
pub mod derived;
pub mod error;
pub mod field;
pub mod format;
pub mod model;
pub mod parser;
pub mod progress;
pub mod utils;

pub use calc::{
    compute_range, compute_range_with, compute_spot, field_at, Algorithm, CalculationOptions,
    CalculationResult, Calculator, CalculatorState, ComponentValue, RowKind, StepInterval,
};
pub use config::{Ellipsoid, EngineConfig};
pub use coords::{geodetic_to_geocentric, GeocentricCoordinates};
pub use derived::{to_declination_inclination, FieldChange, FieldElements};
pub use error::{Error, Result};
pub use field::{evaluate, evaluate_with, CoordinateSystem, FieldVector, GeoPoint};
pub use format::{ModelFamily, ModelFormat};
pub use model::{CoefficientEpoch, EpochKind, ModelCollection, ResolvedCoefficients};
pub use parser::{load_model, load_model_with, parse_str};
pub use progress::{CancelToken, Progress};
