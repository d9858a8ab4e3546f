//! Parameter estimation from a labeled Ferraris recording.
//!
//! The procedure follows Ferraris et al. (1995): six static phases with each
//! sensor axis pointing up and down once, then one controlled rotation about
//! each axis. The static phases determine the accelerometer parameters, the
//! gyroscope bias and the acceleration sensitivity; the rotations determine
//! the gyroscope scale and alignment.

use log::{debug, warn};
use nalgebra::{Matrix3, Vector3};

use crate::calibration_info::{CalMeta, CalibrationInfo};
use crate::error::{CalibrationError, Result};
use crate::ferraris_calibration_info::FerrarisCalibrationInfo;
use crate::section_list::{SectionLabel, SectionList};

/// Standard gravity in m/s^2, the default for [`FerrarisCalibration`].
pub const DEFAULT_GRAVITY: f64 = 9.81;

/// Default expected rotation per rotation phase, in degrees.
pub const DEFAULT_EXPECTED_ANGLE: f64 = 360.0;

/// Samples of one measurement phase, accelerometer and gyroscope in lockstep.
#[derive(Debug, Clone, Default)]
pub struct FerrarisSection {
    pub acc: Vec<Vector3<f64>>,
    pub gyr: Vec<Vector3<f64>>,
}

impl FerrarisSection {
    pub fn new(acc: Vec<Vector3<f64>>, gyr: Vec<Vector3<f64>>) -> Self {
        Self { acc, gyr }
    }

    pub fn len(&self) -> usize {
        self.acc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acc.is_empty()
    }

    fn mean_acc(&self) -> Vector3<f64> {
        mean(&self.acc)
    }

    fn mean_gyr(&self) -> Vector3<f64> {
        mean(&self.gyr)
    }
}

fn mean(samples: &[Vector3<f64>]) -> Vector3<f64> {
    samples.iter().fold(Vector3::zeros(), |acc, s| acc + s) / samples.len() as f64
}

/// All nine labeled phases of one Ferraris recording.
#[derive(Debug, Clone, Default)]
pub struct FerrarisSections {
    pub x_p: FerrarisSection,
    pub x_a: FerrarisSection,
    pub y_p: FerrarisSection,
    pub y_a: FerrarisSection,
    pub z_p: FerrarisSection,
    pub z_a: FerrarisSection,
    pub x_rot: FerrarisSection,
    pub y_rot: FerrarisSection,
    pub z_rot: FerrarisSection,
}

impl FerrarisSections {
    pub fn section(&self, label: SectionLabel) -> &FerrarisSection {
        match label {
            SectionLabel::XPlus => &self.x_p,
            SectionLabel::XMinus => &self.x_a,
            SectionLabel::YPlus => &self.y_p,
            SectionLabel::YMinus => &self.y_a,
            SectionLabel::ZPlus => &self.z_p,
            SectionLabel::ZMinus => &self.z_a,
            SectionLabel::XRotation => &self.x_rot,
            SectionLabel::YRotation => &self.y_rot,
            SectionLabel::ZRotation => &self.z_rot,
        }
    }

    pub fn section_mut(&mut self, label: SectionLabel) -> &mut FerrarisSection {
        match label {
            SectionLabel::XPlus => &mut self.x_p,
            SectionLabel::XMinus => &mut self.x_a,
            SectionLabel::YPlus => &mut self.y_p,
            SectionLabel::YMinus => &mut self.y_a,
            SectionLabel::ZPlus => &mut self.z_p,
            SectionLabel::ZMinus => &mut self.z_a,
            SectionLabel::XRotation => &mut self.x_rot,
            SectionLabel::YRotation => &mut self.y_rot,
            SectionLabel::ZRotation => &mut self.z_rot,
        }
    }

    pub fn is_complete(&self) -> bool {
        SectionLabel::ALL.iter().all(|l| !self.section(*l).is_empty())
    }
}

/// Per-axis standard deviation of the static phases, a quick data-quality
/// indicator. High accelerometer noise usually means the sensor was not
/// actually at rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticNoise {
    pub acc: Vector3<f64>,
    pub gyr: Vector3<f64>,
}

/// A validated Ferraris recording, ready for parameter estimation.
#[derive(Debug, Clone)]
pub struct FerrarisCalibration {
    sections: FerrarisSections,
    sampling_rate: f64,
    gravity: f64,
    expected_angle: f64,
}

impl FerrarisCalibration {
    /// Build from pre-cut sections.
    ///
    /// `sampling_rate` is in Hz. `gravity` defaults to [`DEFAULT_GRAVITY`]
    /// and must match the unit of the raw acceleration data;
    /// `expected_angle` defaults to [`DEFAULT_EXPECTED_ANGLE`] and must match
    /// the unit of the raw gyroscope data times seconds. A negative angle
    /// encodes rotations performed in the clockwise direction.
    pub fn from_sections(
        sections: FerrarisSections,
        sampling_rate: f64,
        gravity: Option<f64>,
        expected_angle: Option<f64>,
    ) -> Result<Self> {
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(CalibrationError::InvalidSamplingRate(sampling_rate));
        }
        let expected_angle = expected_angle.unwrap_or(DEFAULT_EXPECTED_ANGLE);
        if expected_angle == 0.0 || !expected_angle.is_finite() {
            return Err(CalibrationError::ZeroExpectedAngle);
        }
        for label in SectionLabel::ALL {
            let section = sections.section(label);
            if section.is_empty() {
                return Err(CalibrationError::MissingSection(label));
            }
            if section.acc.len() != section.gyr.len() {
                return Err(CalibrationError::SampleCountMismatch {
                    acc: section.acc.len(),
                    gyro: section.gyr.len(),
                });
            }
        }
        Ok(Self {
            sections,
            sampling_rate,
            gravity: gravity.unwrap_or(DEFAULT_GRAVITY),
            expected_angle,
        })
    }

    /// Cut sections out of a continuous recording using a section list.
    ///
    /// `acc` and `gyr` must be sample-aligned; the row ranges in `list` are
    /// half-open and must lie within the recording.
    pub fn from_section_list(
        acc: &[Vector3<f64>],
        gyr: &[Vector3<f64>],
        list: &SectionList,
        sampling_rate: f64,
        gravity: Option<f64>,
        expected_angle: Option<f64>,
    ) -> Result<Self> {
        if acc.len() != gyr.len() {
            return Err(CalibrationError::SampleCountMismatch {
                acc: acc.len(),
                gyro: gyr.len(),
            });
        }
        let mut sections = FerrarisSections::default();
        for label in SectionLabel::ALL {
            let (start, end) = list
                .get(label)
                .ok_or(CalibrationError::MissingSection(label))?;
            if start >= end || end > acc.len() {
                return Err(CalibrationError::InvalidSection { label, start, end });
            }
            *sections.section_mut(label) = FerrarisSection::new(
                acc[start..end].to_vec(),
                gyr[start..end].to_vec(),
            );
        }
        Self::from_sections(sections, sampling_rate, gravity, expected_angle)
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn gravity(&self) -> f64 {
        self.gravity
    }

    pub fn expected_angle(&self) -> f64 {
        self.expected_angle
    }

    /// Pooled per-axis standard deviation of the six static phases, each
    /// phase measured against its own mean.
    pub fn static_noise(&self) -> StaticNoise {
        let mut acc_var = Vector3::zeros();
        let mut gyr_var = Vector3::zeros();
        let mut total = 0usize;
        for label in SectionLabel::STATIC {
            let section = self.sections.section(label);
            let acc_mean = section.mean_acc();
            let gyr_mean = section.mean_gyr();
            for (a, g) in section.acc.iter().zip(&section.gyr) {
                acc_var += (a - acc_mean).component_mul(&(a - acc_mean));
                gyr_var += (g - gyr_mean).component_mul(&(g - gyr_mean));
            }
            total += section.len();
        }
        StaticNoise {
            acc: (acc_var / total as f64).map(f64::sqrt),
            gyr: (gyr_var / total as f64).map(f64::sqrt),
        }
    }

    /// Estimate the full parameter set.
    pub fn compute(&self) -> Result<FerrarisCalibrationInfo> {
        let noise = self.static_noise();
        if noise.acc.max() > 0.05 * self.gravity {
            warn!(
                "high accelerometer noise during static phases ({:.4} m/s^2), was the sensor at rest?",
                noise.acc.max()
            );
        }

        // Static means as columns: U[+-] = [mean(x), mean(y), mean(z)].
        let u_a_p = column_means(&self.sections, |s| &s.acc, false);
        let u_a_n = column_means(&self.sections, |s| &s.acc, true);
        let u_g_p = column_means(&self.sections, |s| &s.gyr, false);
        let u_g_n = column_means(&self.sections, |s| &s.gyr, true);

        // Accelerometer bias, scale and alignment (Ferraris eq. 16-20).
        let b_a = ((u_a_p + u_a_n) / 2.0).diagonal();
        let d_a = u_a_p - u_a_n;
        let k_a_sq = (d_a * d_a.transpose()).diagonal() / (4.0 * self.gravity * self.gravity);
        if k_a_sq.min() <= f64::EPSILON {
            return Err(CalibrationError::NonInvertible("K_a"));
        }
        let k_a = Matrix3::from_diagonal(&k_a_sq.map(f64::sqrt));
        let k_a_inv = k_a
            .try_inverse()
            .ok_or(CalibrationError::NonInvertible("K_a"))?;
        let r_a = k_a_inv * d_a / (2.0 * self.gravity);
        debug!("accelerometer parameters estimated, b_a = {:?}", b_a);

        // Gyroscope bias: pooled mean over every static sample. With a
        // symmetric set of static phases the K_ga contributions cancel.
        let mut b_g = Vector3::zeros();
        let mut static_samples = 0usize;
        for label in SectionLabel::STATIC {
            let section = self.sections.section(label);
            b_g += section.gyr.iter().fold(Vector3::zeros(), |acc, g| acc + g);
            static_samples += section.len();
        }
        let b_g = b_g / static_samples as f64;
        if noise.gyr.max() > b_g.abs().max().max(f64::EPSILON) {
            warn!(
                "gyroscope noise during static phases ({:.4}) exceeds the estimated bias",
                noise.gyr.max()
            );
        }

        // Gyroscope sensitivity to acceleration (eq. 9).
        let k_ga = (u_g_p - u_g_n) / (2.0 * self.gravity);

        // Gyroscope scale and alignment from the rotation phases
        // (eq. 21-29). The angular rate is integrated per phase after
        // removing the bias and the acceleration-induced offset; each
        // integral should equal the expected rotation angle.
        let partial = FerrarisCalibrationInfo {
            b_a,
            K_a: k_a,
            R_a: r_a,
            b_g,
            K_g: Matrix3::identity(),
            R_g: Matrix3::identity(),
            K_ga: k_ga,
            meta: CalMeta::default(),
        };
        let mut w = Matrix3::zeros();
        for (column, label) in SectionLabel::ROTATION.iter().enumerate() {
            let section = self.sections.section(*label);
            let acc_cal = partial.apply_acc(&section.acc)?;
            let integral = section
                .gyr
                .iter()
                .zip(&acc_cal)
                .fold(Vector3::zeros(), |sum, (g, a)| {
                    sum + partial.gyro_offset_free(*g, *a)
                })
                / self.sampling_rate;
            w.set_column(column, &integral);
        }
        let m = w / self.expected_angle;
        let k_g_sq = (m * m.transpose()).diagonal();
        if k_g_sq.min() <= f64::EPSILON {
            return Err(CalibrationError::NonInvertible("K_g"));
        }
        let k_g = Matrix3::from_diagonal(&k_g_sq.map(f64::sqrt));
        let k_g_inv = k_g
            .try_inverse()
            .ok_or(CalibrationError::NonInvertible("K_g"))?;
        let r_g = k_g_inv * m;
        debug!("gyroscope parameters estimated, b_g = {:?}", b_g);

        Ok(FerrarisCalibrationInfo {
            b_a,
            K_a: k_a,
            R_a: r_a,
            b_g,
            K_g: k_g,
            R_g: r_g,
            K_ga: k_ga,
            meta: CalMeta::default(),
        })
    }
}

/// Per-axis static means stacked as matrix columns. `negative` selects the
/// axis-down phases.
fn column_means(
    sections: &FerrarisSections,
    signal: impl Fn(&FerrarisSection) -> &Vec<Vector3<f64>>,
    negative: bool,
) -> Matrix3<f64> {
    let labels = if negative {
        [SectionLabel::XMinus, SectionLabel::YMinus, SectionLabel::ZMinus]
    } else {
        [SectionLabel::XPlus, SectionLabel::YPlus, SectionLabel::ZPlus]
    };
    let mut u = Matrix3::zeros();
    for (column, label) in labels.iter().enumerate() {
        u.set_column(column, &mean(signal(sections.section(*label))));
    }
    u
}
