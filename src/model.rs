//! Epoch-indexed coefficient collections and their resolution at a date.
//!
//! Coefficients are stored flat in Schmidt quasi-normalised order
//! `g(1,0), g(1,1), h(1,1), g(2,0), g(2,1), h(2,1), ...`, so a model of degree
//! `n` carries `n(n+2)` values.

use std::cmp::Ordering;

use tracing::trace;

use crate::config::Ellipsoid;
use crate::error::{Error, Result};
use crate::format::{ModelFamily, ModelFormat};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EpochKind {
    /// `M`
    Main,
    /// `S`
    SecularVariation,
    /// `E`
    External,
}

impl EpochKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "M" | "m" => Some(EpochKind::Main),
            "S" | "s" => Some(EpochKind::SecularVariation),
            "E" | "e" => Some(EpochKind::External),
            _ => None,
        }
    }

    pub fn tag(self) -> char {
        match self {
            EpochKind::Main => 'M',
            EpochKind::SecularVariation => 'S',
            EpochKind::External => 'E',
        }
    }
}

/// Degree `n` such that `count == n(n+2)`, if there is one.
pub fn degree_for_count(count: usize) -> Option<usize> {
    let n = ((count + 1) as f64).sqrt().round() as usize;
    let n = n.checked_sub(1)?;
    (n * (n + 2) == count).then_some(n)
}

/// Flat index of `g(n,m)`; `h(n,m)` (m > 0) sits one past it.
pub fn coefficient_index(n: usize, m: usize) -> usize {
    debug_assert!(n >= 1 && m <= n);
    n * n - 1 + if m == 0 { 0 } else { 2 * m - 1 }
}

/// One dated set of coefficients. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct CoefficientEpoch {
    kind: EpochKind,
    year: f64,
    max_degree: usize,
    coefficients: Vec<f64>,
}

impl CoefficientEpoch {
    /// Returns `None` unless the coefficient count is `n(n+2)` for some `n >= 1`.
    pub fn new(kind: EpochKind, year: f64, coefficients: Vec<f64>) -> Option<Self> {
        let max_degree = degree_for_count(coefficients.len()).filter(|&n| n >= 1)?;
        Some(Self {
            kind,
            year,
            max_degree,
            coefficients,
        })
    }

    pub fn kind(&self) -> EpochKind {
        self.kind
    }

    pub fn year(&self) -> f64 {
        self.year
    }

    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn g(&self, n: usize, m: usize) -> f64 {
        if n == 0 || n > self.max_degree || m > n {
            return 0.0;
        }
        self.coefficients[coefficient_index(n, m)]
    }

    pub fn h(&self, n: usize, m: usize) -> f64 {
        if m == 0 || n > self.max_degree || m > n {
            return 0.0;
        }
        self.coefficients[coefficient_index(n, m) + 1]
    }
}

/// Coefficients of a collection evaluated at one decimal date.
///
/// Evaluation never reads past the vectors: a degree larger than the
/// coefficients hold is capped to the highest complete degree.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedCoefficients {
    pub date: f64,
    pub internal: Vec<f64>,
    pub max_degree: usize,
    pub external: Vec<f64>,
    pub external_degree: usize,
}

/// Every epoch loaded from one coefficient file, plus its validity window.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelCollection {
    epochs: Vec<CoefficientEpoch>,
    min_date: f64,
    max_date: f64,
    earth_radius_km: f64,
    ellipsoid: Ellipsoid,
    source_file_names: Vec<String>,
    format: ModelFormat,
    family: Option<ModelFamily>,
    altitude_range_km: Option<(f64, f64)>,
}

impl ModelCollection {
    pub(crate) fn new(format: ModelFormat, earth_radius_km: f64) -> Self {
        Self {
            epochs: Vec::new(),
            min_date: f64::INFINITY,
            max_date: f64::NEG_INFINITY,
            earth_radius_km,
            ellipsoid: Ellipsoid::WGS84,
            source_file_names: Vec::new(),
            format,
            family: None,
            altitude_range_km: None,
        }
    }

    pub(crate) fn push_epoch(&mut self, epoch: CoefficientEpoch) {
        trace!(
            kind = %epoch.kind.tag(),
            year = epoch.year,
            degree = epoch.max_degree,
            "epoch added"
        );
        self.widen_window(epoch.year, epoch.year);
        self.epochs.push(epoch);
    }

    pub(crate) fn widen_window(&mut self, min: f64, max: f64) {
        self.min_date = self.min_date.min(min);
        self.max_date = self.max_date.max(max);
    }

    pub(crate) fn set_earth_radius_km(&mut self, radius: f64) {
        self.earth_radius_km = radius;
    }

    pub(crate) fn set_ellipsoid(&mut self, ellipsoid: Ellipsoid) {
        self.ellipsoid = ellipsoid;
    }

    pub(crate) fn set_family(&mut self, family: ModelFamily) {
        self.family = Some(family);
    }

    pub(crate) fn widen_altitude_range(&mut self, min_km: f64, max_km: f64) {
        self.altitude_range_km = Some(match self.altitude_range_km {
            Some((lo, hi)) => (lo.min(min_km), hi.max(max_km)),
            None => (min_km, max_km),
        });
    }

    pub(crate) fn add_source_file_name(&mut self, name: String) {
        self.source_file_names.push(name);
    }

    pub fn epochs(&self) -> &[CoefficientEpoch] {
        &self.epochs
    }

    pub fn min_date(&self) -> f64 {
        self.min_date
    }

    pub fn max_date(&self) -> f64 {
        self.max_date
    }

    pub fn earth_radius_km(&self) -> f64 {
        self.earth_radius_km
    }

    /// Ellipsoid the collection was loaded for; geodetic points use it.
    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    pub fn source_file_names(&self) -> &[String] {
        &self.source_file_names
    }

    pub fn format(&self) -> ModelFormat {
        self.format
    }

    pub fn family(&self) -> Option<ModelFamily> {
        self.family
    }

    pub fn altitude_range_km(&self) -> Option<(f64, f64)> {
        self.altitude_range_km
    }

    pub fn epochs_of(&self, kind: EpochKind) -> impl Iterator<Item = &CoefficientEpoch> {
        self.epochs.iter().filter(move |e| e.kind == kind)
    }

    /// A collection without a main-field epoch cannot be evaluated.
    pub fn is_usable(&self) -> bool {
        self.epochs_of(EpochKind::Main).next().is_some() && self.min_date <= self.max_date
    }

    pub fn contains(&self, date: f64) -> bool {
        date >= self.min_date && date <= self.max_date
    }

    pub fn check_date(&self, date: f64) -> Result<()> {
        if self.contains(date) {
            Ok(())
        } else {
            Err(Error::OutOfRange {
                date,
                min: self.min_date,
                max: self.max_date,
            })
        }
    }

    /// Resolve internal and external coefficients at `date` (decimal year).
    ///
    /// Between two main-field epochs the coefficients are interpolated
    /// linearly. Past the last one, secular-variation epochs extend it: each
    /// `S` epoch covers the year centred on its own date, and the portions of
    /// the first and last ones that fall outside `[M1.year, date]` are removed.
    pub fn resolve(&self, date: f64) -> Result<ResolvedCoefficients> {
        if !self.is_usable() {
            return Err(Error::ModelNotLoaded);
        }
        self.check_date(date)?;

        let (m1, m2) = bracket(self.epochs_of(EpochKind::Main), date);
        let m1 = m1.ok_or(Error::OutOfRange {
            date,
            min: self.first_main_year(),
            max: self.max_date,
        })?;

        let (internal, max_degree) = match m2 {
            Some(m2) => interpolate(m1, m2, date),
            None => self.extrapolate(m1, date),
        };

        let (e1, e2) = bracket(self.epochs_of(EpochKind::External), date);
        let (external, external_degree) = match (e1, e2) {
            (Some(a), Some(b)) => interpolate(a, b, date),
            (Some(e), None) | (None, Some(e)) => (e.coefficients.clone(), e.max_degree),
            (None, None) => (Vec::new(), 0),
        };

        Ok(ResolvedCoefficients {
            date,
            internal,
            max_degree,
            external,
            external_degree,
        })
    }

    fn first_main_year(&self) -> f64 {
        self.epochs_of(EpochKind::Main)
            .map(|e| e.year)
            .fold(f64::INFINITY, f64::min)
    }

    fn extrapolate(&self, m1: &CoefficientEpoch, date: f64) -> (Vec<f64>, usize) {
        let mut sv: Vec<&CoefficientEpoch> = self
            .epochs_of(EpochKind::SecularVariation)
            .filter(|s| s.year - 0.5 <= date && s.year + 0.5 > m1.year)
            .collect();
        sv.sort_by(|a, b| a.year.partial_cmp(&b.year).unwrap_or(Ordering::Equal));

        let max_degree = sv.iter().map(|s| s.max_degree).fold(m1.max_degree, usize::max);
        let mut out = m1.coefficients.clone();
        out.resize(max_degree * (max_degree + 2), 0.0);

        let (Some(first), Some(last)) = (sv.first(), sv.last()) else {
            return (out, max_degree);
        };
        for s in &sv {
            accumulate(&mut out, s, 1.0);
        }
        accumulate(&mut out, first, -(m1.year - first.year + 0.5));
        accumulate(&mut out, last, -(last.year - date + 0.5));
        (out, max_degree)
    }
}

/// Latest epoch with `year <= date` and earliest with `year > date`.
fn bracket<'a>(
    epochs: impl Iterator<Item = &'a CoefficientEpoch>,
    date: f64,
) -> (Option<&'a CoefficientEpoch>, Option<&'a CoefficientEpoch>) {
    let mut before: Option<&CoefficientEpoch> = None;
    let mut after: Option<&CoefficientEpoch> = None;
    for epoch in epochs {
        if epoch.year <= date {
            if before.map_or(true, |b| epoch.year >= b.year) {
                before = Some(epoch);
            }
        } else if after.map_or(true, |a| epoch.year < a.year) {
            after = Some(epoch);
        }
    }
    (before, after)
}

fn interpolate(a: &CoefficientEpoch, b: &CoefficientEpoch, date: f64) -> (Vec<f64>, usize) {
    let span = b.year - a.year;
    let wa = (b.year - date) / span;
    let wb = (date - a.year) / span;
    let max_degree = a.max_degree.max(b.max_degree);
    let len = max_degree * (max_degree + 2);
    let out = (0..len)
        .map(|i| {
            let ga = a.coefficients.get(i).copied().unwrap_or(0.0);
            let gb = b.coefficients.get(i).copied().unwrap_or(0.0);
            ga * wa + gb * wb
        })
        .collect();
    (out, max_degree)
}

fn accumulate(out: &mut [f64], epoch: &CoefficientEpoch, scale: f64) {
    for (o, c) in out.iter_mut().zip(&epoch.coefficients) {
        *o += scale * c;
    }
}
