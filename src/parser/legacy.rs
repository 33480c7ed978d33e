//! 80-column fixed-width files, several models per file.
//!
//! A header record (three leading blanks) carries
//! `name epoch max1 max2 max3 yrmin yrmax altmin altmax`; the records under it
//! carry `n m g1 h1 g2 h2`, where `g1/h1` belong to the main field (to degree
//! `max1`) and `g2/h2` to the secular variation (to degree `max2`).

use tracing::{debug, trace};

use super::{is_sentinel, parse_number};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::format::{classify_header, HeaderShape, ModelFormat, FIXED_RECORD_WIDTH};
use crate::model::{coefficient_index, CoefficientEpoch, EpochKind, ModelCollection};
use crate::progress::Monitor;

struct PendingModel {
    epoch: f64,
    main_degree: usize,
    sv_degree: usize,
    main: Vec<Option<f64>>,
    sv: Vec<Option<f64>>,
}

impl PendingModel {
    fn new(epoch: f64, main_degree: usize, sv_degree: usize) -> Self {
        Self {
            epoch,
            main_degree,
            sv_degree,
            main: vec![None; main_degree * (main_degree + 2)],
            sv: vec![None; sv_degree * (sv_degree + 2)],
        }
    }

    fn set(&mut self, n: usize, m: usize, values: [f64; 4]) {
        let [g1, h1, g2, h2] = values;
        let i = coefficient_index(n, m);
        if n <= self.main_degree {
            self.main[i] = Some(g1);
            if m > 0 {
                self.main[i + 1] = Some(h1);
            }
        }
        if n <= self.sv_degree {
            self.sv[i] = Some(g2);
            if m > 0 {
                self.sv[i + 1] = Some(h2);
            }
        }
    }

    fn finish(self, end_line: usize, collection: &mut ModelCollection) -> Result<()> {
        let complete = |values: Vec<Option<f64>>| {
            let count = values.iter().filter(|v| v.is_some()).count();
            values
                .into_iter()
                .collect::<Option<Vec<f64>>>()
                .ok_or(Error::BadCoefficientCount {
                    line: end_line,
                    count,
                })
        };
        let main = complete(self.main)?;
        let main_count = main.len();
        let main = CoefficientEpoch::new(EpochKind::Main, self.epoch, main).ok_or(
            Error::BadCoefficientCount {
                line: end_line,
                count: main_count,
            },
        )?;
        collection.push_epoch(main);

        if self.sv_degree > 0 {
            let sv = complete(self.sv)?;
            if let Some(sv) = CoefficientEpoch::new(EpochKind::SecularVariation, self.epoch, sv) {
                collection.push_epoch(sv);
            }
        }
        Ok(())
    }
}

struct Header {
    epoch: f64,
    max1: usize,
    max2: usize,
    year_min: f64,
    year_max: f64,
    alt_min: f64,
    alt_max: f64,
}

fn parse_header(line: &str, line_no: usize) -> Result<Header> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 9 {
        return Err(Error::malformed(line_no, "header needs 9 fields"));
    }
    let number = |i: usize| {
        parse_number(tokens[i])
            .ok_or_else(|| Error::malformed(line_no, format!("bad header field {:?}", tokens[i])))
    };
    let degree = |i: usize| {
        tokens[i]
            .parse::<usize>()
            .map_err(|_| Error::malformed(line_no, format!("bad degree {:?}", tokens[i])))
    };
    Ok(Header {
        epoch: number(1)?,
        max1: degree(2)?,
        max2: degree(3)?,
        year_min: number(5)?,
        year_max: number(6)?,
        alt_min: number(7)?,
        alt_max: number(8)?,
    })
}

fn parse_record(line: &str, line_no: usize) -> Result<(usize, usize, [f64; 4])> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 6 {
        return Err(Error::malformed(line_no, "record needs n m g1 h1 g2 h2"));
    }
    let n: usize = tokens[0]
        .parse()
        .map_err(|_| Error::malformed(line_no, format!("bad degree {:?}", tokens[0])))?;
    let m: usize = tokens[1]
        .parse()
        .map_err(|_| Error::malformed(line_no, format!("bad order {:?}", tokens[1])))?;
    if n == 0 || m > n {
        return Err(Error::malformed(line_no, format!("invalid term ({n}, {m})")));
    }
    let mut values = [0.0; 4];
    for (slot, token) in values.iter_mut().zip(&tokens[2..6]) {
        *slot = parse_number(token)
            .ok_or_else(|| Error::malformed(line_no, format!("bad coefficient {token:?}")))?;
    }
    Ok((n, m, values))
}

pub(super) fn parse(
    text: &str,
    config: &EngineConfig,
    monitor: &mut Monitor<'_>,
) -> Result<ModelCollection> {
    let mut collection =
        ModelCollection::new(ModelFormat::LegacyFixedWidth, config.earth_radius_km);
    let mut pending: Option<PendingModel> = None;
    let mut skipped = 0usize;
    let mut line_no = 0;

    for (idx, raw) in text.lines().enumerate() {
        line_no = idx + 1;
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() || is_sentinel(line) {
            continue;
        }
        if line.len() != FIXED_RECORD_WIDTH {
            return Err(Error::malformed(
                line_no,
                format!("record is {} characters, expected {FIXED_RECORD_WIDTH}", line.len()),
            ));
        }

        let header = classify_header(line)
            .filter(|h| h.shape == HeaderShape::NameFirst && line.starts_with("   "));
        if let Some(header) = header {
            if let Some(model) = pending.take() {
                model.finish(line_no, &mut collection)?;
            }
            monitor.step()?;
            let fields = parse_header(line, line_no)?;
            let limit = config.max_degree_for(header.family);
            trace!(name = %header.name, epoch = fields.epoch, max1 = fields.max1, "model header");

            collection.set_family(header.family);
            collection.widen_window(fields.year_min, fields.year_max);
            collection.widen_altitude_range(fields.alt_min, fields.alt_max);
            pending = Some(PendingModel::new(
                fields.epoch,
                fields.max1.min(limit),
                fields.max2.min(limit),
            ));
            continue;
        }

        let model = pending
            .as_mut()
            .ok_or_else(|| Error::malformed(line_no, "coefficient record before any header"))?;
        let (n, m, values) = parse_record(line, line_no)?;
        if n > model.main_degree.max(model.sv_degree) {
            skipped += 1;
            continue;
        }
        model.set(n, m, values);
    }
    if let Some(model) = pending.take() {
        model.finish(line_no, &mut collection)?;
    }

    if skipped > 0 {
        debug!(skipped, "records above degree limit skipped");
    }
    Ok(collection)
}
