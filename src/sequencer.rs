//! Guided acquisition of the nine measurement phases from a live stream.
//!
//! [`CalibrationSequencer`] walks an operator through the full procedure: it
//! waits for the sensor to be held still, records each static phase for a
//! minimum duration, and ends each rotation phase when the sensor comes to
//! rest again. The result is a [`FerrarisSections`] ready for
//! [`FerrarisCalibration::from_sections`](crate::FerrarisCalibration::from_sections).
//!
//! Stillness is detected on the angular acceleration, not the angular rate,
//! so a gyroscope with a large bias still registers as still.

use std::fmt;

use log::debug;
use nalgebra::Vector3;

use crate::error::{CalibrationError, Result};
use crate::ferraris_calibration::{FerrarisCalibration, FerrarisSections};
use crate::imu_reading::IMUReading;
use crate::moving_average::SingleSumSMA;
use crate::section_list::SectionLabel;

/// Thresholds of the guided acquisition.
#[derive(Debug, Clone, Copy)]
pub struct SequencerConfig {
    /// Mean angular acceleration below which the sensor counts as still.
    pub still_gyro_threshold: f64,
    /// Minimum number of samples per static phase.
    pub min_section_samples: usize,
    /// Minimum duration of a static phase, in seconds.
    pub min_section_duration: f64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            still_gyro_threshold: 0.17,
            min_section_samples: 300,
            min_section_duration: 3.0,
        }
    }
}

// Stillness samples are taken at most every 0.1 s; a window of 30 averages
// over roughly 3 s.
const STILL_SAMPLE_INTERVAL: f64 = 0.1;
const STILL_WINDOW: usize = 30;

/// Whether a phase is being entered or has just finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    /// Waiting for the sensor to be held still before the first phase.
    WaitingStill,
    Section(SectionLabel, Event),
    Done,
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencerState::Idle => f.write_str("idle"),
            SequencerState::WaitingStill => f.write_str("waiting_still"),
            SequencerState::Section(label, Event::Start) => write!(f, "{label} start"),
            SequencerState::Section(label, Event::End) => write!(f, "{label} end"),
            SequencerState::Done => f.write_str("done"),
        }
    }
}

/// Incremental state machine that cuts a live reading stream into the nine
/// labeled phases.
pub struct CalibrationSequencer {
    state: SequencerState,
    sections: FerrarisSections,
    config: SequencerConfig,
    last_still_reading: Option<IMUReading>,
    angular_acceleration_avg: SingleSumSMA<Vector3<f64>>,
    state_start_timestamp: f64,
}

impl Default for CalibrationSequencer {
    fn default() -> Self {
        Self::new(SequencerConfig::default())
    }
}

impl CalibrationSequencer {
    pub fn new(config: SequencerConfig) -> Self {
        Self {
            state: SequencerState::Idle,
            sections: FerrarisSections::default(),
            config,
            last_still_reading: None,
            angular_acceleration_avg: SingleSumSMA::new(STILL_WINDOW, Vector3::zeros()),
            state_start_timestamp: 0.0,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    fn wait_still(&mut self, reading: &IMUReading) -> bool {
        let Some(last) = &self.last_still_reading else {
            self.last_still_reading = Some(reading.clone());
            return false;
        };
        let delta_time = reading.timestamp - last.timestamp;
        if delta_time > STILL_SAMPLE_INTERVAL {
            let angular_acceleration = (reading.gyro - last.gyro) / delta_time;
            self.last_still_reading = Some(reading.clone());
            self.angular_acceleration_avg.add_sample(angular_acceleration);

            if self.angular_acceleration_avg.is_full()
                && self.angular_acceleration_avg.get_average().norm_squared()
                    < self.config.still_gyro_threshold * self.config.still_gyro_threshold
            {
                self.angular_acceleration_avg.clear();
                return true;
            }
        }
        false
    }

    fn record(&mut self, label: SectionLabel, reading: &IMUReading) {
        let section = self.sections.section_mut(label);
        section.acc.push(reading.acc);
        section.gyr.push(reading.gyro);
    }

    /// Feed one reading. Returns the new state when a transition happened.
    ///
    /// Readings must arrive in timestamp order.
    pub fn process(&mut self, reading: &IMUReading) -> Option<SequencerState> {
        let new_state = match self.state {
            SequencerState::Idle => {
                self.last_still_reading = Some(reading.clone());
                Some(SequencerState::WaitingStill)
            }
            SequencerState::WaitingStill => self
                .wait_still(reading)
                .then_some(SequencerState::Section(SectionLabel::XPlus, Event::Start)),
            SequencerState::Section(label, Event::Start) if label.is_static() => {
                self.record(label, reading);
                let long_enough = self.sections.section(label).len() > self.config.min_section_samples
                    && reading.timestamp - self.state_start_timestamp
                        > self.config.min_section_duration;
                long_enough.then_some(SequencerState::Section(label, Event::End))
            }
            SequencerState::Section(label, Event::Start) => {
                // Rotation phase: record until the sensor is still again.
                self.record(label, reading);
                self.wait_still(reading).then(|| match label.next() {
                    Some(_) => SequencerState::Section(label, Event::End),
                    None => SequencerState::Done,
                })
            }
            SequencerState::Section(label, Event::End) => {
                self.wait_still(reading).then(|| {
                    // End states only exist for labels with a successor.
                    let next = label.next().unwrap_or(SectionLabel::ZRotation);
                    SequencerState::Section(next, Event::Start)
                })
            }
            SequencerState::Done => None,
        };

        if let Some(state) = new_state {
            debug!("calibration sequence: {} -> {}", self.state, state);
            self.state = state;
            self.state_start_timestamp = reading.timestamp;
        }
        new_state
    }

    /// The recorded phases, available once the sequence has run to
    /// completion.
    pub fn into_sections(self) -> Result<FerrarisSections> {
        if self.state != SequencerState::Done {
            return Err(CalibrationError::SequenceIncomplete(self.state.to_string()));
        }
        Ok(self.sections)
    }

    /// Finish the sequence and hand the phases to the estimator.
    pub fn into_calibration(
        self,
        sampling_rate: f64,
        gravity: Option<f64>,
        expected_angle: Option<f64>,
    ) -> Result<FerrarisCalibration> {
        FerrarisCalibration::from_sections(
            self.into_sections()?,
            sampling_rate,
            gravity,
            expected_angle,
        )
    }
}
