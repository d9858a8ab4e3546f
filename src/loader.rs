//! Loading calibration records of any registered type from disk.

use std::path::Path;
use std::str::FromStr;

use log::debug;

use crate::calibration_info::CalibrationInfo;
use crate::container;
use crate::document::CalDocument;
use crate::error::{CalibrationError, Result};
use crate::registry;

/// On-disk formats a calibration record can be stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalFormat {
    Json,
    /// The binary container format, conventionally stored with an `.hdf` or
    /// `.h5` extension.
    Hdf,
}

impl CalFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Ok(CalFormat::Json),
            Some("hdf" | "h5") => Ok(CalFormat::Hdf),
            _ => Err(CalibrationError::UnknownFormat(format!(
                "unrecognized extension on `{}`, pass the format explicitly",
                path.display()
            ))),
        }
    }
}

impl FromStr for CalFormat {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(CalFormat::Json),
            "hdf" => Ok(CalFormat::Hdf),
            _ => Err(CalibrationError::UnknownFormat(format!(
                "`{s}` is not a known format (expected `json` or `hdf`)"
            ))),
        }
    }
}

/// Load a record from `path`, inferring the format from the extension unless
/// one is given.
pub fn load_calibration_info(
    path: &Path,
    format: Option<CalFormat>,
) -> Result<Box<dyn CalibrationInfo>> {
    let format = match format {
        Some(format) => format,
        None => CalFormat::from_path(path)?,
    };
    debug!("loading {:?} calibration from {}", format, path.display());
    match format {
        CalFormat::Json => from_json_file(path),
        CalFormat::Hdf => from_hdf_file(path),
    }
}

/// Parse a record from its JSON form.
pub fn from_json_str(text: &str) -> Result<Box<dyn CalibrationInfo>> {
    registry::from_document(&CalDocument::from_json_str(text)?)
}

pub fn from_json_file(path: &Path) -> Result<Box<dyn CalibrationInfo>> {
    from_json_str(&std::fs::read_to_string(path)?)
}

pub fn from_hdf_file(path: &Path) -> Result<Box<dyn CalibrationInfo>> {
    registry::from_document(&container::read_file(path)?)
}
