//! Coefficient file loading.
//!
//! Every format converges on the same [`ModelCollection`]. A parse either
//! returns a complete collection or an error; nothing partial escapes.

mod legacy;
mod modern;
mod tabular;

use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::format::ModelFormat;
use crate::model::ModelCollection;
use crate::progress::{CancelToken, Monitor, Progress};

// Windows sharing and lock violations
const ERROR_SHARING_VIOLATION: i32 = 32;
const ERROR_LOCK_VIOLATION: i32 = 33;

/// Load a coefficient file with the default configuration.
pub fn load_model(path: impl AsRef<Path>) -> Result<ModelCollection> {
    load_model_with(path, &EngineConfig::default(), &CancelToken::new(), |_| {})
}

/// Load a coefficient file, checking `cancel` and reporting progress once per
/// epoch parsed.
pub fn load_model_with(
    path: impl AsRef<Path>,
    config: &EngineConfig,
    cancel: &CancelToken,
    mut on_progress: impl FnMut(Progress),
) -> Result<ModelCollection> {
    let path = path.as_ref();
    let mut monitor = Monitor::new(cancel, &mut on_progress, None);
    monitor.check()?;

    let contents = read_coefficient_file(path)?;
    let format = ModelFormat::detect(path, &contents)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    parse_with(&name, &contents, format, config, &mut monitor)
}

/// Parse coefficient text already in memory; `file_name` drives format detection.
pub fn parse_str(
    file_name: &str,
    contents: &str,
    config: &EngineConfig,
) -> Result<ModelCollection> {
    let format = ModelFormat::detect(Path::new(file_name), contents)?;
    let cancel = CancelToken::new();
    let mut ignore = |_: Progress| {};
    let mut monitor = Monitor::new(&cancel, &mut ignore, None);
    parse_with(file_name, contents, format, config, &mut monitor)
}

fn parse_with(
    file_name: &str,
    contents: &str,
    format: ModelFormat,
    config: &EngineConfig,
    monitor: &mut Monitor<'_>,
) -> Result<ModelCollection> {
    debug!(file = file_name, ?format, "parsing coefficient file");
    let mut collection = match format {
        ModelFormat::LegacyFixedWidth => legacy::parse(contents, config, monitor)?,
        ModelFormat::ModernDelimited => modern::parse(contents, config, monitor)?,
        ModelFormat::TabularBggm => tabular::parse(contents, config, monitor)?,
    };
    if !collection.is_usable() {
        return Err(Error::UnsupportedFormat(format!(
            "{file_name} contains no main-field epoch"
        )));
    }
    collection.set_ellipsoid(config.ellipsoid);
    collection.add_source_file_name(file_name.to_string());

    info!(
        file = file_name,
        ?format,
        epochs = collection.epochs().len(),
        min_date = collection.min_date(),
        max_date = collection.max_date(),
        "model loaded"
    );
    Ok(collection)
}

fn read_coefficient_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
        ErrorKind::PermissionDenied => Error::FileLocked(path.to_path_buf()),
        ErrorKind::InvalidData => {
            Error::UnsupportedFormat(format!("{} is not a text file", path.display()))
        }
        _ if matches!(
            e.raw_os_error(),
            Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)
        ) =>
        {
            Error::FileLocked(path.to_path_buf())
        }
        _ => Error::Io(e),
    })
}

/// Numbers as written by Fortran-era tools may use `D` exponents.
pub(crate) fn parse_number(token: &str) -> Option<f64> {
    if token.contains(['D', 'd']) {
        token.replace(['D', 'd'], "E").parse().ok()
    } else {
        token.parse().ok()
    }
}

/// Lines made only of nines mark the end of a model.
pub(crate) fn is_sentinel(line: &str) -> bool {
    let t = line.trim();
    t.len() >= 8 && t.bytes().all(|b| b == b'9')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1.5D+02"), Some(150.0));
        assert_eq!(parse_number("-2.5d-1"), Some(-0.25));
        assert_eq!(parse_number("-29351.8"), Some(-29351.8));
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn test_sentinel() {
        assert!(is_sentinel("999999999999999999999999999999999999999999999999"));
        assert!(!is_sentinel("  9  9  1.0  2.0"));
        assert!(!is_sentinel("999"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_model("/definitely/not/here/WMM.COF").unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn test_precancelled_load_reads_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let config = EngineConfig::default();
        let err =
            load_model_with("/definitely/not/here/WMM.COF", &config, &cancel, |_| {}).unwrap_err();
        assert!(err.is_cancelled());
    }
}
