//! Calibration of 6-axis IMUs using the Ferraris procedure.
//!
//! The crate covers the whole workflow: cutting a labeled recording into the
//! nine measurement phases (or acquiring them live with the
//! [`CalibrationSequencer`]), estimating the correction parameters with
//! [`FerrarisCalibration`], applying the resulting
//! [`FerrarisCalibrationInfo`] to raw data, and storing records as JSON or in
//! a binary container format. Additional calibration methods can plug into
//! the same storage and application machinery through [`register_cal_type`].

pub use calibration_info::{CalMeta, CalibrationInfo};
pub use document::{CalDocument, Param};
pub use error::{CalibrationError, Result};
pub use ferraris_calibration::{
    FerrarisCalibration, FerrarisSection, FerrarisSections, StaticNoise, DEFAULT_EXPECTED_ANGLE,
    DEFAULT_GRAVITY,
};
pub use ferraris_calibration_info::{FerrarisCalibrationInfo, FERRARIS_CAL_TYPE};
pub use imu_reading::IMUReading;
pub use loader::{from_hdf_file, from_json_file, from_json_str, load_calibration_info, CalFormat};
pub use registry::{register_cal_type, CalFactory};
pub use section_list::{SectionLabel, SectionList};
pub use sequencer::{CalibrationSequencer, Event, SequencerConfig, SequencerState};

mod calibration_info;
mod container;
mod document;
mod error;
mod ferraris_calibration;
mod ferraris_calibration_info;
mod imu_reading;
mod loader;
mod moving_average;
mod registry;
mod section_list;
mod sequencer;
