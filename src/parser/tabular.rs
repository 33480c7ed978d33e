//! Tabular BGGM-class files.
//!
//! ```text
//! 2020.0          collection min year
//! 2026.0          collection max year
//! M 2020.0        tag and year (the year may also sit on the next line)
//! -29404.8 -1450.9 4652.5 ...
//! S 2020.5
//! ...
//! N               switch to the modern reference radius
//! ```

use tracing::trace;

use super::parse_number;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::format::{ModelFamily, ModelFormat};
use crate::model::{CoefficientEpoch, EpochKind, ModelCollection};
use crate::progress::Monitor;

struct Block {
    kind: EpochKind,
    line: usize,
    year: Option<f64>,
    values: Vec<f64>,
}

impl Block {
    fn finish(self, max_degree: usize, collection: &mut ModelCollection) -> Result<()> {
        let year = self
            .year
            .ok_or_else(|| Error::malformed(self.line, "block has no year"))?;
        let mut values = self.values;
        let count = values.len();
        let limit = max_degree * (max_degree + 2);
        if count > limit && crate::model::degree_for_count(count).is_some() {
            values.truncate(limit);
        }
        let epoch = CoefficientEpoch::new(self.kind, year, values).ok_or(
            Error::BadCoefficientCount {
                line: self.line,
                count,
            },
        )?;
        trace!(kind = %self.kind.tag(), year, degree = epoch.max_degree(), "block parsed");
        collection.push_epoch(epoch);
        Ok(())
    }
}

fn is_tag(token: &str) -> bool {
    token.len() == 1 && token.starts_with(|c: char| c.is_ascii_alphabetic())
}

pub(super) fn parse(
    text: &str,
    config: &EngineConfig,
    monitor: &mut Monitor<'_>,
) -> Result<ModelCollection> {
    let mut collection =
        ModelCollection::new(ModelFormat::TabularBggm, config.legacy_tabular_radius_km);
    collection.set_family(ModelFamily::Bggm);
    let max_degree = config.max_degree_for(ModelFamily::Bggm);

    let mut lines = text
        .lines()
        .enumerate()
        .map(|(idx, l)| (idx + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty());

    let mut window = [0.0; 2];
    for (slot, what) in window.iter_mut().zip(["minimum", "maximum"]) {
        let (line_no, line) = lines.next().ok_or_else(|| {
            Error::UnsupportedFormat(format!("tabular file lacks its {what} year"))
        })?;
        *slot = line
            .split_whitespace()
            .next()
            .and_then(parse_number)
            .ok_or_else(|| Error::malformed(line_no, format!("expected {what} year")))?;
    }
    collection.widen_window(window[0], window[1]);

    let mut block: Option<Block> = None;
    for (line_no, line) in lines {
        let mut tokens = line.split_whitespace();
        if let Some(tag) = line.split_whitespace().next().filter(|t| is_tag(t)) {
            tokens.next();
            if let Some(done) = block.take() {
                done.finish(max_degree, &mut collection)?;
            }
            if tag.eq_ignore_ascii_case("N") {
                collection.set_earth_radius_km(config.earth_radius_km);
                continue;
            }
            let kind = EpochKind::from_tag(tag)
                .ok_or_else(|| Error::malformed(line_no, format!("unknown block tag {tag:?}")))?;
            monitor.step()?;
            block = Some(Block {
                kind,
                line: line_no,
                year: None,
                values: Vec::new(),
            });
        }

        let Some(current) = block.as_mut() else {
            return Err(Error::malformed(line_no, "coefficients before any block tag"));
        };
        for token in tokens {
            let value = parse_number(token)
                .ok_or_else(|| Error::malformed(line_no, format!("bad number {token:?}")))?;
            if current.year.is_none() {
                current.year = Some(value);
            } else {
                current.values.push(value);
            }
        }
    }
    if let Some(done) = block.take() {
        done.finish(max_degree, &mut collection)?;
    }
    Ok(collection)
}
