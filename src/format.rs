//! Coefficient file formats and header classification.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Model families recognised from header names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    Wmm,
    WmmHighResolution,
    Igrf,
    Dgrf,
    Emm,
    Bggm,
}

impl ModelFamily {
    /// Highest degree a model of this family is expanded to.
    pub fn default_max_degree(self) -> usize {
        match self {
            ModelFamily::Wmm => 12,
            ModelFamily::WmmHighResolution => 133,
            ModelFamily::Igrf | ModelFamily::Dgrf => 13,
            ModelFamily::Emm => 790,
            ModelFamily::Bggm => 720,
        }
    }

    /// Periodically reissued models stay valid for a fixed span past their last epoch.
    pub fn is_periodic(self) -> bool {
        matches!(
            self,
            ModelFamily::Wmm | ModelFamily::WmmHighResolution | ModelFamily::Igrf | ModelFamily::Emm
        )
    }

    /// Case-insensitive scan of a token for a known model marker.
    pub fn from_token(token: &str) -> Option<Self> {
        let upper = token.to_ascii_uppercase();
        if ["WMMHR", "WMM_HR", "WMM-HR"].iter().any(|m| upper.contains(m)) {
            Some(ModelFamily::WmmHighResolution)
        } else if upper.contains("WMM") {
            Some(ModelFamily::Wmm)
        } else if upper.contains("DGRF") {
            Some(ModelFamily::Dgrf)
        } else if upper.contains("IGRF") {
            Some(ModelFamily::Igrf)
        } else if upper.contains("EMM") {
            Some(ModelFamily::Emm)
        } else if upper.contains("BGGM") {
            Some(ModelFamily::Bggm)
        } else {
            None
        }
    }
}

/// Layout of a header line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderShape {
    /// `    2025.0            WMM-2025     11/13/2024`
    EpochFirst,
    /// `   IGRF13  2020.00 13  8  0 2020.00 2025.00   -1.0  600.0 ...`
    NameFirst,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelHeader {
    pub family: ModelFamily,
    pub shape: HeaderShape,
    pub name: String,
}

/// Classify a line as a model header, or `None` for anything else.
///
/// A line that starts with a number is only a header when its second token is
/// a model name; coefficient rows begin with two integers and never qualify,
/// whatever trails them.
pub fn classify_header(line: &str) -> Option<ModelHeader> {
    let mut tokens = line.split_whitespace();
    let first = tokens.next()?;
    let lead = first.chars().next()?;

    if lead.is_ascii_alphabetic() {
        let family = ModelFamily::from_token(first)?;
        return Some(ModelHeader {
            family,
            shape: HeaderShape::NameFirst,
            name: first.to_string(),
        });
    }

    if lead.is_ascii_digit() || matches!(lead, '-' | '+' | '.') {
        first.parse::<f64>().ok()?;
        let second = tokens.next()?;
        if !second.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return None;
        }
        let family = ModelFamily::from_token(second)?;
        return Some(ModelHeader {
            family,
            shape: HeaderShape::EpochFirst,
            name: second.to_string(),
        });
    }

    None
}

/// The on-disk grammars the parser understands, chosen once per file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelFormat {
    LegacyFixedWidth,
    ModernDelimited,
    TabularBggm,
}

pub const FIXED_RECORD_WIDTH: usize = 80;

impl ModelFormat {
    /// Pick the grammar from the file extension and its first non-blank line.
    pub fn detect(path: &Path, contents: &str) -> Result<Self> {
        let is_dat = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("dat"));
        if is_dat {
            return Ok(ModelFormat::TabularBggm);
        }

        let first = contents
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| Error::UnsupportedFormat(format!("{} is empty", path.display())))?;

        match classify_header(first) {
            Some(header)
                if header.shape == HeaderShape::NameFirst
                    && first.len() == FIXED_RECORD_WIDTH
                    && first.starts_with("   ") =>
            {
                Ok(ModelFormat::LegacyFixedWidth)
            }
            Some(_) => Ok(ModelFormat::ModernDelimited),
            None => Err(Error::UnsupportedFormat(format!(
                "{}: no recognised model header in {:?}",
                path.display(),
                first.trim()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_epoch_first() {
        let header = classify_header("    2025.0            WMM-2025     11/13/2024").unwrap();
        assert_eq!(header.family, ModelFamily::Wmm);
        assert_eq!(header.shape, HeaderShape::EpochFirst);
        assert_eq!(header.name, "WMM-2025");

        let header = classify_header("    2025.0            WMMHR-2025   11/13/2024").unwrap();
        assert_eq!(header.family, ModelFamily::WmmHighResolution);
    }

    #[test]
    fn test_classify_name_first() {
        let header = classify_header(
            "   igrf13  2020.00 13  8  0 2020.00 2025.00   -1.0  600.0           IGRF13   0",
        )
        .unwrap();
        assert_eq!(header.family, ModelFamily::Igrf);
        assert_eq!(header.shape, HeaderShape::NameFirst);
        assert_eq!(classify_header("DGRF2015 2015.0").unwrap().family, ModelFamily::Dgrf);
        assert_eq!(classify_header("EMM2017 2017.0").unwrap().family, ModelFamily::Emm);
    }

    #[test]
    fn test_data_rows_are_not_headers() {
        assert_eq!(classify_header("  1  0  -29351.8       0.0       12.0        0.0"), None);
        assert_eq!(
            classify_header(" 1  0 -29404.80      0.00       5.70      0.00           IGRF13   1"),
            None
        );
        assert_eq!(classify_header("999999999999999999999999999999999999999999999999"), None);
        assert_eq!(classify_header("   "), None);
        assert_eq!(classify_header("Random comment"), None);
    }

    #[test]
    fn test_detect_format() {
        let wmm = "    2025.0            WMM-2025     11/13/2024\n  1  0 -29351.8 0.0 12.0 0.0\n";
        assert_eq!(
            ModelFormat::detect(Path::new("WMM.COF"), wmm).unwrap(),
            ModelFormat::ModernDelimited
        );

        let header = "   IGRF13  2020.00  1  1  0 2020.00 2025.00   -1.0  600.0";
        let legacy = format!("{header:<80}\n");
        assert_eq!(
            ModelFormat::detect(Path::new("IGRF13.cof"), &legacy).unwrap(),
            ModelFormat::LegacyFixedWidth
        );

        assert_eq!(
            ModelFormat::detect(Path::new("bggm2023.DAT"), "").unwrap(),
            ModelFormat::TabularBggm
        );

        let err = ModelFormat::detect(Path::new("notes.txt"), "hello world\n").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }
}
