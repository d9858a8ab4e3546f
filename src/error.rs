//! Error types for calibration estimation, application and storage.

use thiserror::Error;

use crate::section_list::SectionLabel;

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, CalibrationError>;

/// All failure modes of the calibration pipeline.
///
/// None of these are transient: every operation in this crate is a
/// deterministic function of its inputs, so callers should treat an error as
/// final rather than retry.
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("calibration section `{0}` is missing")]
    MissingSection(SectionLabel),

    #[error("calibration section `{label}` is empty or out of bounds ({start}..{end})")]
    InvalidSection {
        label: SectionLabel,
        start: usize,
        end: usize,
    },

    #[error("acc and gyro sample counts differ ({acc} vs {gyro})")]
    SampleCountMismatch { acc: usize, gyro: usize },

    #[error("sampling rate must be positive, got {0}")]
    InvalidSamplingRate(f64),

    #[error("expected rotation angle must be non-zero")]
    ZeroExpectedAngle,

    #[error("matrix `{0}` is not invertible, the calibration data is degenerate")]
    NonInvertible(&'static str),

    #[error("unknown calibration type `{0}`")]
    UnknownCalType(String),

    #[error("calibration type `{0}` is already registered")]
    DuplicateCalType(String),

    #[error("`{op}` is not supported by calibration type `{cal_type}`: {reason}")]
    Unsupported {
        cal_type: &'static str,
        op: &'static str,
        reason: &'static str,
    },

    #[error("cannot compare a `{left}` calibration with a `{right}` calibration")]
    TypeMismatch { left: String, right: String },

    #[error("calibration records of type `{0}` declare different parameter fields")]
    FieldSetMismatch(String),

    #[error("parameter `{0}` is missing from the serialized calibration")]
    MissingParam(String),

    #[error("parameter `{name}` has shape {rows}x{cols}, expected {expected}")]
    WrongShape {
        name: String,
        rows: usize,
        cols: usize,
        expected: &'static str,
    },

    #[error("calibration sequence incomplete, stopped in state {0}")]
    SequenceIncomplete(String),

    #[error("could not determine the calibration file format: {0}")]
    UnknownFormat(String),

    #[error("malformed calibration file: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
