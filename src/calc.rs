//! Spot and date-range calculations over a loaded model.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Date, Duration, Month};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::derived::{
    change_by_derivative, change_by_difference, to_declination_inclination, FieldChange,
};
use crate::error::{Error, Result};
use crate::field::{evaluate_with, CoordinateSystem, FieldVector, GeoPoint};
use crate::model::ModelCollection;
use crate::parser::load_model_with;
use crate::progress::{CancelToken, Monitor, Progress};
use crate::utils::{
    decimal_year, elevation_to_km, normalize_degrees, ElevationReference, ElevationUnit,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepInterval {
    Days(u32),
    Months(u32),
    Years(u32),
}

/// How annual change is derived. All variants share one field evaluator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    /// Difference of every derived quantity over the following year.
    #[default]
    Bgs,
    /// Component difference over the following year, angle and intensity
    /// rates by their derivatives.
    Noaa,
    /// Central difference over half a year either side.
    Magvar,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalculationOptions {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub elevation_unit: ElevationUnit,
    pub elevation_reference: ElevationReference,
    pub coordinate_system: CoordinateSystem,
    pub start_date: Date,
    pub end_date: Date,
    pub step: StepInterval,
    pub secular_variation: bool,
    pub algorithm: Algorithm,
}

impl CalculationOptions {
    /// Sea-level geodetic point on a single date, with secular variation.
    pub fn at(latitude: f64, longitude: f64, date: Date) -> Self {
        Self {
            latitude,
            longitude,
            elevation: 0.0,
            elevation_unit: ElevationUnit::Meter,
            elevation_reference: ElevationReference::Altitude,
            coordinate_system: CoordinateSystem::Geodetic,
            start_date: date,
            end_date: date,
            step: StepInterval::Years(1),
            secular_variation: true,
            algorithm: Algorithm::Bgs,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
            elevation_km: elevation_to_km(
                self.elevation,
                self.elevation_unit,
                self.elevation_reference,
            ),
            coordinate_system: self.coordinate_system,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::InvalidOptions(format!(
                "latitude {} outside [-90, 90]",
                self.latitude
            )));
        }
        if !(-360.0..=360.0).contains(&self.longitude) {
            return Err(Error::InvalidOptions(format!(
                "longitude {} outside [-360, 360]",
                self.longitude
            )));
        }
        if !self.elevation.is_finite() {
            return Err(Error::InvalidOptions("elevation is not finite".into()));
        }
        if self.end_date < self.start_date {
            return Err(Error::InvalidOptions(format!(
                "end date {} precedes start date {}",
                self.end_date, self.start_date
            )));
        }
        if matches!(
            self.step,
            StepInterval::Days(0) | StepInterval::Months(0) | StepInterval::Years(0)
        ) {
            return Err(Error::InvalidOptions("step interval must be positive".into()));
        }
        Ok(())
    }

    /// Every date from start to end (inclusive) at the step interval.
    pub fn dates(&self) -> Result<Vec<Date>> {
        self.validate()?;
        let mut dates = Vec::new();
        for k in 0u32.. {
            let date = match self.step {
                StepInterval::Days(n) => self
                    .start_date
                    .checked_add(Duration::days(i64::from(k) * i64::from(n))),
                StepInterval::Months(n) => k
                    .checked_mul(n)
                    .and_then(|months| add_months(self.start_date, months)),
                StepInterval::Years(n) => k
                    .checked_mul(n)
                    .and_then(|years| years.checked_mul(12))
                    .and_then(|months| add_months(self.start_date, months)),
            };
            match date {
                Some(date) if date <= self.end_date => dates.push(date),
                _ => break,
            }
        }
        Ok(dates)
    }
}

/// Months offset from `date`, clamping the day to the target month's length.
fn add_months(date: Date, months: u32) -> Option<Date> {
    let index = date.year() as i64 * 12 + (date.month() as i64 - 1) + i64::from(months);
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = Month::try_from((index.rem_euclid(12) + 1) as u8).ok()?;
    let day = date.day().min(time::util::days_in_year_month(year, month));
    Date::from_calendar_date(year, month, day).ok()
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentValue {
    pub value: f64,
    /// `None` when secular variation was not requested.
    pub change_per_year: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowKind {
    Value,
    /// Synthesised after a multi-date range: net change per year over the range.
    ChangePerYear,
}

/// One row of output. Angles in degrees, components in nT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub date: Date,
    pub kind: RowKind,
    pub declination: ComponentValue,
    pub inclination: ComponentValue,
    pub horizontal_intensity: ComponentValue,
    pub north: ComponentValue,
    pub east: ComponentValue,
    pub vertical: ComponentValue,
    pub total_intensity: ComponentValue,
}

impl CalculationResult {
    fn from_field(date: Date, v: &FieldVector, change: Option<&FieldChange>) -> Self {
        let e = to_declination_inclination(v);
        let cv = |value: f64, rate: fn(&FieldChange) -> f64| ComponentValue {
            value,
            change_per_year: change.map(rate),
        };
        Self {
            date,
            kind: RowKind::Value,
            declination: cv(e.declination, |c| c.declination),
            inclination: cv(e.inclination, |c| c.inclination),
            horizontal_intensity: cv(e.horizontal_intensity, |c| c.horizontal_intensity),
            north: cv(v.x, |c| c.north),
            east: cv(v.y, |c| c.east),
            vertical: cv(v.z, |c| c.vertical),
            total_intensity: cv(e.total_intensity, |c| c.total_intensity),
        }
    }

    fn change_per_year(first: &Self, last: &Self) -> Self {
        let years = decimal_year(last.date) - decimal_year(first.date);
        let rate = |a: &ComponentValue, b: &ComponentValue| ComponentValue {
            value: (b.value - a.value) / years,
            change_per_year: None,
        };
        Self {
            date: last.date,
            kind: RowKind::ChangePerYear,
            declination: ComponentValue {
                value: normalize_degrees(last.declination.value - first.declination.value) / years,
                change_per_year: None,
            },
            inclination: rate(&first.inclination, &last.inclination),
            horizontal_intensity: rate(&first.horizontal_intensity, &last.horizontal_intensity),
            north: rate(&first.north, &last.north),
            east: rate(&first.east, &last.east),
            vertical: rate(&first.vertical, &last.vertical),
            total_intensity: rate(&first.total_intensity, &last.total_intensity),
        }
    }
}

/// Resolve and evaluate in one go.
pub fn field_at(collection: &ModelCollection, date: f64, point: &GeoPoint) -> Result<FieldVector> {
    let resolved = collection.resolve(date)?;
    Ok(evaluate_with(
        &resolved,
        point,
        collection.earth_radius_km(),
        collection.ellipsoid(),
    ))
}

/// Differencing window `[date - before, date + after]`, slid back inside the
/// model's validity window when it overhangs either end.
fn rate_window(collection: &ModelCollection, date: f64, before: f64, after: f64) -> (f64, f64) {
    let (min, max) = (collection.min_date(), collection.max_date());
    let mut t0 = date - before;
    let mut t1 = date + after;
    if t1 > max {
        t0 -= t1 - max;
        t1 = max;
    }
    if t0 < min {
        t1 = (t1 + (min - t0)).min(max);
        t0 = min;
    }
    (t0, t1)
}

fn annual_change(
    collection: &ModelCollection,
    date: f64,
    point: &GeoPoint,
    at_date: &FieldVector,
    algorithm: Algorithm,
) -> Result<Option<FieldChange>> {
    let (before, after) = match algorithm {
        Algorithm::Bgs | Algorithm::Noaa => (0.0, 1.0),
        Algorithm::Magvar => (0.5, 0.5),
    };
    let (t0, t1) = rate_window(collection, date, before, after);
    let years = t1 - t0;
    if years <= 0.0 {
        return Ok(None);
    }
    let from = field_at(collection, t0, point)?;
    let to = field_at(collection, t1, point)?;
    let change = match algorithm {
        Algorithm::Bgs | Algorithm::Magvar => change_by_difference(&from, &to, years),
        Algorithm::Noaa => {
            let d = to - from;
            let delta = FieldVector::new(d.x / years, d.y / years, d.z / years);
            change_by_derivative(at_date, &delta)
        }
    };
    Ok(Some(change))
}

fn warn_outside_altitude(collection: &ModelCollection, point: &GeoPoint) {
    if point.coordinate_system != CoordinateSystem::Geodetic {
        return;
    }
    if let Some((lo, hi)) = collection.altitude_range_km() {
        if point.elevation_km < lo || point.elevation_km > hi {
            warn!(
                elevation_km = point.elevation_km,
                min_km = lo,
                max_km = hi,
                "elevation outside the model's altitude range"
            );
        }
    }
}

fn spot(
    options: &CalculationOptions,
    date: Date,
    collection: &ModelCollection,
) -> Result<CalculationResult> {
    let t = decimal_year(date);
    let point = options.point();
    let v = field_at(collection, t, &point)?;
    let change = if options.secular_variation {
        annual_change(collection, t, &point, &v, options.algorithm)?
    } else {
        None
    };
    Ok(CalculationResult::from_field(date, &v, change.as_ref()))
}

/// Field and (optionally) its annual change at one date.
pub fn compute_spot(
    options: &CalculationOptions,
    date: Date,
    collection: &ModelCollection,
) -> Result<CalculationResult> {
    options.validate()?;
    collection.check_date(decimal_year(date))?;
    warn_outside_altitude(collection, &options.point());
    spot(options, date, collection)
}

pub fn compute_range(
    options: &CalculationOptions,
    collection: &ModelCollection,
) -> Result<Vec<CalculationResult>> {
    compute_range_with(options, collection, &CancelToken::new(), |_| {})
}

/// One row per date from start to end, plus a change-per-year row when more
/// than one date was computed. Any date outside the model window fails the
/// whole range before anything is computed.
pub fn compute_range_with(
    options: &CalculationOptions,
    collection: &ModelCollection,
    cancel: &CancelToken,
    mut on_progress: impl FnMut(Progress),
) -> Result<Vec<CalculationResult>> {
    let dates = options.dates()?;
    let mut monitor = Monitor::new(cancel, &mut on_progress, Some(dates.len()));
    monitor.check()?;
    for date in &dates {
        collection.check_date(decimal_year(*date))?;
    }
    warn_outside_altitude(collection, &options.point());

    info!(
        steps = dates.len(),
        start = %options.start_date,
        end = %options.end_date,
        "range calculation started"
    );
    let mut rows = Vec::with_capacity(dates.len() + 1);
    for date in dates {
        monitor.step()?;
        rows.push(spot(options, date, collection)?);
    }
    if let [first, .., last] = rows.as_slice() {
        let summary = CalculationResult::change_per_year(first, last);
        rows.push(summary);
    }
    debug!(rows = rows.len(), "range calculation finished");
    Ok(rows)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalculatorState {
    Idle,
    ModelLoaded,
    SpotCalculating,
    RangeCalculating,
    ResultsReady,
    Error,
}

/// Holds the loaded model and the last results, tracking where a calculation
/// stands.
#[derive(Debug)]
pub struct Calculator {
    config: EngineConfig,
    model: Option<Arc<ModelCollection>>,
    state: CalculatorState,
    results: Vec<CalculationResult>,
}

impl Calculator {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            model: None,
            state: CalculatorState::Idle,
            results: Vec::new(),
        }
    }

    pub fn state(&self) -> CalculatorState {
        self.state
    }

    pub fn model(&self) -> Option<&Arc<ModelCollection>> {
        self.model.as_ref()
    }

    pub fn results(&self) -> &[CalculationResult] {
        &self.results
    }

    fn transition(&mut self, next: CalculatorState) {
        debug!(from = ?self.state, to = ?next, "calculator state");
        self.state = next;
    }

    fn settle<T>(&mut self, result: Result<T>, fallback: CalculatorState) -> Result<T> {
        match &result {
            Err(e) if e.is_cancelled() => self.transition(fallback),
            Err(_) => self.transition(CalculatorState::Error),
            Ok(_) => {}
        }
        result
    }

    /// Load a coefficient file, replacing any model already held.
    pub fn load_model(
        &mut self,
        path: impl AsRef<Path>,
        cancel: &CancelToken,
        on_progress: impl FnMut(Progress),
    ) -> Result<Arc<ModelCollection>> {
        let fallback = self.state;
        let loaded = load_model_with(path, &self.config, cancel, on_progress);
        let collection = Arc::new(self.settle(loaded, fallback)?);
        self.set_model(collection.clone());
        Ok(collection)
    }

    pub fn set_model(&mut self, collection: Arc<ModelCollection>) {
        if let Some(old) = &self.model {
            if old.source_file_names() == collection.source_file_names() {
                info!(files = ?collection.source_file_names(), "model replaced");
            }
        }
        self.model = Some(collection);
        self.results.clear();
        self.transition(CalculatorState::ModelLoaded);
    }

    fn loaded_model(&mut self) -> Result<Arc<ModelCollection>> {
        let model = self.model.clone().ok_or(Error::ModelNotLoaded);
        self.settle(model, CalculatorState::Idle)
    }

    pub fn compute_spot(
        &mut self,
        options: &CalculationOptions,
        date: Date,
    ) -> Result<&CalculationResult> {
        let model = self.loaded_model()?;
        let fallback = self.state;
        self.transition(CalculatorState::SpotCalculating);
        let row = compute_spot(options, date, &model);
        let row = self.settle(row, fallback)?;
        self.results = vec![row];
        self.transition(CalculatorState::ResultsReady);
        Ok(&self.results[0])
    }

    pub fn compute_range(
        &mut self,
        options: &CalculationOptions,
        cancel: &CancelToken,
        on_progress: impl FnMut(Progress),
    ) -> Result<&[CalculationResult]> {
        let model = self.loaded_model()?;
        let fallback = self.state;
        self.transition(CalculatorState::RangeCalculating);
        let rows = compute_range_with(options, &model, cancel, on_progress);
        self.results = self.settle(rows, fallback)?;
        self.transition(CalculatorState::ResultsReady);
        Ok(&self.results)
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ModelFormat;
    use crate::model::{CoefficientEpoch, EpochKind};
    use float_eq::assert_float_eq;

    fn dipole_model() -> ModelCollection {
        let mut c = ModelCollection::new(ModelFormat::ModernDelimited, 6371.2);
        let main = vec![-29000.0, -1500.0, 4600.0];
        let sv = vec![10.0, 8.0, -25.0];
        c.push_epoch(CoefficientEpoch::new(EpochKind::Main, 2020.0, main).unwrap());
        c.push_epoch(CoefficientEpoch::new(EpochKind::SecularVariation, 2020.0, sv).unwrap());
        c.widen_window(2020.0, 2025.0);
        c
    }

    fn date(y: i32, m: Month, d: u8) -> Date {
        Date::from_calendar_date(y, m, d).unwrap()
    }

    #[test]
    fn test_dates_by_month_clamp_day() {
        let mut options = CalculationOptions::at(0.0, 0.0, date(2021, Month::January, 31));
        options.end_date = date(2021, Month::May, 1);
        options.step = StepInterval::Months(1);
        let dates = options.dates().unwrap();
        assert_eq!(
            dates,
            vec![
                date(2021, Month::January, 31),
                date(2021, Month::February, 28),
                date(2021, Month::March, 31),
                date(2021, Month::April, 30),
            ]
        );
    }

    #[test]
    fn test_dates_by_days_and_years() {
        let mut options = CalculationOptions::at(0.0, 0.0, date(2020, Month::December, 30));
        options.end_date = date(2021, Month::January, 3);
        options.step = StepInterval::Days(2);
        assert_eq!(options.dates().unwrap().len(), 3);

        options.end_date = date(2024, Month::December, 30);
        options.step = StepInterval::Years(2);
        assert_eq!(
            options.dates().unwrap(),
            vec![
                date(2020, Month::December, 30),
                date(2022, Month::December, 30),
                date(2024, Month::December, 30)
            ]
        );
    }

    #[test]
    fn test_huge_steps_end_the_sequence() {
        let start = date(2025, Month::January, 1);
        let mut options = CalculationOptions::at(0.0, 0.0, start);
        options.end_date = date(2026, Month::January, 1);
        for step in [
            StepInterval::Years(400_000_000),
            StepInterval::Years(u32::MAX),
            StepInterval::Months(u32::MAX),
            StepInterval::Days(u32::MAX),
        ] {
            options.step = step;
            assert_eq!(options.dates().unwrap(), vec![start], "{step:?}");
        }
    }

    #[test]
    fn test_invalid_options() {
        let mut options = CalculationOptions::at(91.0, 0.0, date(2021, Month::January, 1));
        assert!(matches!(options.validate(), Err(Error::InvalidOptions(_))));
        options.latitude = 10.0;
        options.step = StepInterval::Days(0);
        assert!(matches!(options.validate(), Err(Error::InvalidOptions(_))));
        options.step = StepInterval::Days(1);
        options.end_date = date(2020, Month::January, 1);
        assert!(matches!(options.validate(), Err(Error::InvalidOptions(_))));
    }

    #[test]
    fn test_rate_window_stays_inside_model() {
        let model = dipole_model();
        let check = |(t0, t1): (f64, f64), (e0, e1): (f64, f64)| {
            assert_float_eq!(t0, e0, abs <= 1e-9);
            assert_float_eq!(t1, e1, abs <= 1e-9);
        };
        check(rate_window(&model, 2021.0, 0.0, 1.0), (2021.0, 2022.0));
        check(rate_window(&model, 2024.5, 0.0, 1.0), (2024.0, 2025.0));
        check(rate_window(&model, 2020.2, 0.5, 0.5), (2020.0, 2021.0));
    }

    #[test]
    fn test_spot_without_secular_variation() {
        let model = dipole_model();
        let mut options = CalculationOptions::at(30.0, 20.0, date(2021, Month::July, 1));
        options.secular_variation = false;
        let row = compute_spot(&options, options.start_date, &model).unwrap();
        assert_eq!(row.kind, RowKind::Value);
        assert!(row.declination.change_per_year.is_none());
        let h = row.north.value.hypot(row.east.value);
        assert_float_eq!(row.horizontal_intensity.value, h, rmax <= 1e-12);
        assert_float_eq!(row.total_intensity.value, h.hypot(row.vertical.value), rmax <= 1e-12);
    }

    #[test]
    fn test_algorithms_agree() {
        let model = dipole_model();
        let mut options = CalculationOptions::at(50.0, -30.0, date(2022, Month::March, 15));
        let mut rows = Vec::new();
        for algorithm in [Algorithm::Bgs, Algorithm::Noaa, Algorithm::Magvar] {
            options.algorithm = algorithm;
            rows.push(compute_spot(&options, options.start_date, &model).unwrap());
        }
        for row in &rows[1..] {
            let (a, b) = (&rows[0], row);
            assert_float_eq!(
                a.declination.change_per_year.unwrap(),
                b.declination.change_per_year.unwrap(),
                abs <= 0.05
            );
            assert_float_eq!(
                a.total_intensity.change_per_year.unwrap(),
                b.total_intensity.change_per_year.unwrap(),
                abs <= 1.0
            );
            assert_float_eq!(
                a.north.change_per_year.unwrap(),
                b.north.change_per_year.unwrap(),
                abs <= 1e-6
            );
        }
    }

    #[test]
    fn test_range_appends_change_per_year() {
        let model = dipole_model();
        let mut options = CalculationOptions::at(45.0, 10.0, date(2021, Month::January, 1));
        options.end_date = date(2023, Month::January, 1);
        let rows = compute_range(&options, &model).unwrap();
        assert_eq!(rows.len(), 4);
        let summary = &rows[3];
        assert_eq!(summary.kind, RowKind::ChangePerYear);
        assert_float_eq!(
            summary.north.value,
            (rows[2].north.value - rows[0].north.value) / 2.0,
            abs <= 1e-9
        );
        // linear secular variation: net change matches the per-row rate
        assert_float_eq!(summary.north.value, rows[0].north.change_per_year.unwrap(), abs <= 1e-6);
    }

    #[test]
    fn test_single_date_range_has_no_summary() {
        let model = dipole_model();
        let options = CalculationOptions::at(45.0, 10.0, date(2021, Month::January, 1));
        assert_eq!(compute_range(&options, &model).unwrap().len(), 1);
    }

    #[test]
    fn test_range_out_of_window_fails_fast() {
        let model = dipole_model();
        let mut options = CalculationOptions::at(45.0, 10.0, date(2024, Month::January, 1));
        options.end_date = date(2026, Month::January, 1);
        let mut steps = 0;
        let cancel = CancelToken::new();
        let err = compute_range_with(&options, &model, &cancel, |_| steps += 1).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }));
        assert_eq!(steps, 0);
    }

    #[test]
    fn test_range_progress_and_cancellation() {
        let model = dipole_model();
        let mut options = CalculationOptions::at(45.0, 10.0, date(2021, Month::January, 1));
        options.end_date = date(2021, Month::December, 31);
        options.step = StepInterval::Months(1);

        let mut seen = Vec::new();
        compute_range_with(&options, &model, &CancelToken::new(), |p| seen.push(p)).unwrap();
        assert_eq!(seen.len(), 12);
        assert!(seen.windows(2).all(|w| w[0].step < w[1].step));
        assert_eq!(seen[0].total, Some(12));

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let err = compute_range_with(&options, &model, &cancel, |p| {
            if p.step == 3 {
                trigger.cancel();
            }
        })
        .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_calculator_states() {
        let mut calc = Calculator::default();
        assert_eq!(calc.state(), CalculatorState::Idle);

        let options = CalculationOptions::at(45.0, 10.0, date(2021, Month::January, 1));
        let err = calc.compute_spot(&options, options.start_date).unwrap_err();
        assert!(matches!(err, Error::ModelNotLoaded));
        assert_eq!(calc.state(), CalculatorState::Error);

        calc.set_model(Arc::new(dipole_model()));
        assert_eq!(calc.state(), CalculatorState::ModelLoaded);
        calc.compute_spot(&options, options.start_date).unwrap();
        assert_eq!(calc.state(), CalculatorState::ResultsReady);
        assert_eq!(calc.results().len(), 1);

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = calc.compute_range(&options, &cancel, |_| {}).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calc.state(), CalculatorState::ResultsReady);

        let late = date(2030, Month::January, 1);
        assert!(calc.compute_spot(&options, late).is_err());
        assert_eq!(calc.state(), CalculatorState::Error);
    }
}
