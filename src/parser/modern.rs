//! Whitespace-delimited WMM/IGRF/EMM coefficient files.
//!
//! ```text
//!     2025.0            WMM-2025     11/13/2024
//!   1  0  -29351.8       0.0       12.0        0.0
//!   1  1   -1410.8    4545.4        9.7      -21.5
//! 999999999999999999999999999999999999999999999999
//! ```
//!
//! Each header opens a main-field epoch and its secular-variation epoch.

use tracing::{debug, trace};

use super::{is_sentinel, parse_number};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::format::{classify_header, HeaderShape, ModelFamily, ModelFormat, ModelHeader};
use crate::model::{coefficient_index, CoefficientEpoch, EpochKind, ModelCollection};
use crate::progress::Monitor;

struct Row {
    line: usize,
    n: usize,
    m: usize,
    g: f64,
    h: f64,
    g_rate: f64,
    h_rate: f64,
}

struct PendingEpoch {
    year: f64,
    rows: Vec<Row>,
}

impl PendingEpoch {
    fn finish(self, end_line: usize, collection: &mut ModelCollection) -> Result<()> {
        let max_n = self.rows.iter().map(|r| r.n).max().unwrap_or(0);
        let len = max_n * (max_n + 2);
        let mut main = vec![None; len];
        let mut rates = vec![0.0; len];

        for row in &self.rows {
            let i = coefficient_index(row.n, row.m);
            if main[i].is_some() {
                return Err(Error::malformed(
                    row.line,
                    format!("duplicate coefficient ({}, {})", row.n, row.m),
                ));
            }
            main[i] = Some(row.g);
            rates[i] = row.g_rate;
            if row.m > 0 {
                main[i + 1] = Some(row.h);
                rates[i + 1] = row.h_rate;
            }
        }

        let count = main.iter().filter(|c| c.is_some()).count();
        let bad_count = || Error::BadCoefficientCount {
            line: end_line,
            count,
        };
        let main: Vec<f64> = main.into_iter().collect::<Option<_>>().ok_or_else(bad_count)?;
        let m = CoefficientEpoch::new(EpochKind::Main, self.year, main).ok_or_else(bad_count)?;
        let s = CoefficientEpoch::new(EpochKind::SecularVariation, self.year, rates)
            .ok_or_else(bad_count)?;
        collection.push_epoch(m);
        collection.push_epoch(s);
        Ok(())
    }
}

fn header_year(header: &ModelHeader, line: &str, line_no: usize) -> Result<f64> {
    let mut tokens = line.split_whitespace();
    let token = match header.shape {
        HeaderShape::EpochFirst => tokens.next(),
        HeaderShape::NameFirst => tokens.nth(1),
    };
    token
        .and_then(parse_number)
        .ok_or_else(|| Error::malformed(line_no, "header carries no epoch year"))
}

fn parse_row(line: &str, line_no: usize) -> Result<Row> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 6 {
        return Err(Error::malformed(
            line_no,
            format!("expected 6 fields, found {}", tokens.len()),
        ));
    }
    let degree = |t: &str| {
        t.parse::<usize>()
            .map_err(|_| Error::malformed(line_no, format!("bad degree/order {t:?}")))
    };
    let number = |t: &str| {
        parse_number(t).ok_or_else(|| Error::malformed(line_no, format!("bad coefficient {t:?}")))
    };
    let n = degree(tokens[0])?;
    let m = degree(tokens[1])?;
    if n == 0 || m > n {
        return Err(Error::malformed(line_no, format!("invalid term ({n}, {m})")));
    }
    Ok(Row {
        line: line_no,
        n,
        m,
        g: number(tokens[2])?,
        h: number(tokens[3])?,
        g_rate: number(tokens[4])?,
        h_rate: number(tokens[5])?,
    })
}

pub(super) fn parse(
    text: &str,
    config: &EngineConfig,
    monitor: &mut Monitor<'_>,
) -> Result<ModelCollection> {
    let mut collection = ModelCollection::new(ModelFormat::ModernDelimited, config.earth_radius_km);
    let mut pending: Option<PendingEpoch> = None;
    let mut family: Option<ModelFamily> = None;
    let mut max_degree = usize::MAX;
    let mut skipped = 0usize;
    let mut line_no = 0;

    for (idx, raw) in text.lines().enumerate() {
        line_no = idx + 1;
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        if is_sentinel(line) {
            if let Some(epoch) = pending.take() {
                epoch.finish(line_no, &mut collection)?;
            }
            continue;
        }
        if let Some(header) = classify_header(line) {
            if let Some(epoch) = pending.take() {
                epoch.finish(line_no, &mut collection)?;
            }
            monitor.step()?;
            let year = header_year(&header, line, line_no)?;
            trace!(name = %header.name, year, "model header");
            family = Some(header.family);
            max_degree = config.max_degree_for(header.family);
            pending = Some(PendingEpoch {
                year,
                rows: Vec::new(),
            });
            continue;
        }

        let epoch = pending
            .as_mut()
            .ok_or_else(|| Error::malformed(line_no, "coefficient row outside a model"))?;
        let row = parse_row(line, line_no)?;
        if row.n > max_degree {
            skipped += 1;
            continue;
        }
        epoch.rows.push(row);
    }
    if let Some(epoch) = pending.take() {
        epoch.finish(line_no, &mut collection)?;
    }

    if skipped > 0 {
        debug!(skipped, max_degree, "rows above degree limit skipped");
    }
    if let Some(family) = family {
        collection.set_family(family);
        if family.is_periodic() {
            let last = collection.max_date();
            collection.widen_window(last, last + config.validity_span_years);
        }
    }
    Ok(collection)
}
