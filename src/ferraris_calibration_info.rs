//! The Ferraris calibration record and its forward transform.

use nalgebra::{Matrix3, Vector3};

use crate::calibration_info::{CalMeta, CalibrationInfo};
use crate::document::{CalDocument, Param};
use crate::error::{CalibrationError, Result};
use crate::imu_reading::IMUReading;

/// Registered type tag of [`FerrarisCalibrationInfo`].
pub const FERRARIS_CAL_TYPE: &str = "ferraris";

/// Correction parameters estimated by a Ferraris calibration.
///
/// The assumed sensor model is
///
/// ```text
/// raw_acc  = K_a * R_a * true_acc  + b_a
/// raw_gyro = K_g * R_g * true_gyro + b_g + K_ga * true_acc
/// ```
///
/// so applying the calibration inverts that chain: subtract the bias, undo
/// scale and axis misalignment, and (for the gyroscope) remove the spurious
/// response to linear acceleration. Because of the `K_ga` term the gyroscope
/// can only be calibrated together with acceleration data covering the same
/// samples; acceleration can be calibrated on its own.
#[allow(non_snake_case)]
#[derive(Debug, Clone, PartialEq)]
pub struct FerrarisCalibrationInfo {
    /// Accelerometer bias.
    pub b_a: Vector3<f64>,
    /// Accelerometer scale factors (diagonal).
    pub K_a: Matrix3<f64>,
    /// Accelerometer axis misalignment.
    pub R_a: Matrix3<f64>,
    /// Gyroscope bias.
    pub b_g: Vector3<f64>,
    /// Gyroscope scale factors (diagonal).
    pub K_g: Matrix3<f64>,
    /// Gyroscope axis misalignment.
    pub R_g: Matrix3<f64>,
    /// Gyroscope sensitivity to linear acceleration.
    pub K_ga: Matrix3<f64>,
    pub meta: CalMeta,
}

impl FerrarisCalibrationInfo {
    /// A record that leaves both signals unchanged. Mostly useful in tests
    /// and as a starting point for manual construction.
    pub fn identity() -> Self {
        Self {
            b_a: Vector3::zeros(),
            K_a: Matrix3::identity(),
            R_a: Matrix3::identity(),
            b_g: Vector3::zeros(),
            K_g: Matrix3::identity(),
            R_g: Matrix3::identity(),
            K_ga: Matrix3::zeros(),
            meta: CalMeta::default(),
        }
    }

    /// `R_a^-1 * K_a^-1`, the matrix applied to bias-free raw acceleration.
    fn acc_mat(&self) -> Result<Matrix3<f64>> {
        let r_inv = self
            .R_a
            .try_inverse()
            .ok_or(CalibrationError::NonInvertible("R_a"))?;
        let k_inv = self
            .K_a
            .try_inverse()
            .ok_or(CalibrationError::NonInvertible("K_a"))?;
        Ok(r_inv * k_inv)
    }

    /// `R_g^-1 * K_g^-1`, the matrix applied to offset-free raw angular rate.
    fn gyro_mat(&self) -> Result<Matrix3<f64>> {
        let r_inv = self
            .R_g
            .try_inverse()
            .ok_or(CalibrationError::NonInvertible("R_g"))?;
        let k_inv = self
            .K_g
            .try_inverse()
            .ok_or(CalibrationError::NonInvertible("K_g"))?;
        Ok(r_inv * k_inv)
    }

    /// Remove gyroscope bias and the acceleration-induced offset. Needs the
    /// *calibrated* acceleration of the same sample.
    pub(crate) fn gyro_offset_free(
        &self,
        gyro: Vector3<f64>,
        calibrated_acc: Vector3<f64>,
    ) -> Vector3<f64> {
        gyro - self.b_g - self.K_ga * calibrated_acc
    }

    /// Calibrate a single timestamped reading.
    pub fn apply_reading(&self, reading: &IMUReading) -> Result<IMUReading> {
        let acc = self.acc_mat()? * (reading.acc - self.b_a);
        let gyro = self.gyro_mat()? * self.gyro_offset_free(reading.gyro, acc);
        Ok(IMUReading::new(reading.timestamp, acc, gyro))
    }
}

impl CalibrationInfo for FerrarisCalibrationInfo {
    fn cal_type(&self) -> &'static str {
        FERRARIS_CAL_TYPE
    }

    fn meta(&self) -> &CalMeta {
        &self.meta
    }

    fn param_fields(&self) -> Vec<(&'static str, Param)> {
        vec![
            ("b_a", Param::Vector(self.b_a)),
            ("K_a", Param::Matrix(self.K_a)),
            ("R_a", Param::Matrix(self.R_a)),
            ("b_g", Param::Vector(self.b_g)),
            ("K_g", Param::Matrix(self.K_g)),
            ("R_g", Param::Matrix(self.R_g)),
            ("K_ga", Param::Matrix(self.K_ga)),
        ]
    }

    fn apply(
        &self,
        acc: &[Vector3<f64>],
        gyro: &[Vector3<f64>],
    ) -> Result<(Vec<Vector3<f64>>, Vec<Vector3<f64>>)> {
        if acc.len() != gyro.len() {
            return Err(CalibrationError::SampleCountMismatch {
                acc: acc.len(),
                gyro: gyro.len(),
            });
        }
        let calibrated_acc = self.apply_acc(acc)?;
        let gyro_mat = self.gyro_mat()?;
        let calibrated_gyro = gyro
            .iter()
            .zip(&calibrated_acc)
            .map(|(g, a)| gyro_mat * self.gyro_offset_free(*g, *a))
            .collect();
        Ok((calibrated_acc, calibrated_gyro))
    }

    fn supports_acc_only(&self) -> bool {
        true
    }

    fn apply_acc(&self, acc: &[Vector3<f64>]) -> Result<Vec<Vector3<f64>>> {
        let acc_mat = self.acc_mat()?;
        Ok(acc.iter().map(|a| acc_mat * (a - self.b_a)).collect())
    }

    // apply_gyro deliberately stays at the unsupported default: removing the
    // K_ga offset requires calibrated acceleration for the same interval.
}

/// Registry factory: rebuild a Ferraris record from its document form.
pub(crate) fn from_document(doc: &CalDocument) -> Result<Box<dyn CalibrationInfo>> {
    Ok(Box::new(FerrarisCalibrationInfo {
        b_a: doc.vector("b_a")?,
        K_a: doc.matrix("K_a")?,
        R_a: doc.matrix("R_a")?,
        b_g: doc.vector("b_g")?,
        K_g: doc.matrix("K_g")?,
        R_g: doc.matrix("R_g")?,
        K_ga: doc.matrix("K_ga")?,
        meta: doc.meta.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn perturbed() -> FerrarisCalibrationInfo {
        FerrarisCalibrationInfo {
            b_a: Vector3::new(0.1, -0.2, 0.05),
            K_a: Matrix3::from_diagonal(&Vector3::new(1.02, 0.98, 1.05)),
            R_a: *nalgebra::Rotation3::from_scaled_axis(Vector3::new(0.02, -0.015, 0.03)).matrix(),
            b_g: Vector3::new(0.5, -0.3, 0.2),
            K_g: Matrix3::from_diagonal(&Vector3::new(0.97, 1.03, 1.01)),
            R_g: *nalgebra::Rotation3::from_scaled_axis(Vector3::new(-0.01, 0.02, 0.015)).matrix(),
            K_ga: Matrix3::new(
                0.002, -0.001, 0.0005, 0.0008, 0.0015, -0.0006, -0.0004, 0.0009, 0.0011,
            ),
            meta: CalMeta::default(),
        }
    }

    #[test]
    fn identity_record_is_a_no_op() {
        let cal = FerrarisCalibrationInfo::identity();
        let acc = vec![Vector3::new(0.1, 9.81, -0.2), Vector3::new(1.0, 2.0, 3.0)];
        let gyro = vec![Vector3::new(10.0, -20.0, 30.0), Vector3::new(0.5, 0.0, -0.5)];
        let (acc_cal, gyro_cal) = cal.apply(&acc, &gyro).unwrap();
        for (raw, cal) in acc.iter().zip(&acc_cal) {
            assert_abs_diff_eq!(raw, cal, epsilon = 1e-12);
        }
        for (raw, cal) in gyro.iter().zip(&gyro_cal) {
            assert_abs_diff_eq!(raw, cal, epsilon = 1e-12);
        }
    }

    #[test]
    fn apply_inverts_the_sensor_model() {
        let cal = perturbed();
        let true_acc = Vector3::new(0.3, 9.7, -0.4);
        let true_gyro = Vector3::new(45.0, -10.0, 5.0);
        let raw_acc = cal.K_a * cal.R_a * true_acc + cal.b_a;
        let raw_gyro = cal.K_g * cal.R_g * true_gyro + cal.b_g + cal.K_ga * true_acc;

        let (acc_cal, gyro_cal) = cal.apply(&[raw_acc], &[raw_gyro]).unwrap();
        assert_abs_diff_eq!(acc_cal[0], true_acc, epsilon = 1e-9);
        assert_abs_diff_eq!(gyro_cal[0], true_gyro, epsilon = 1e-9);

        let reading = cal
            .apply_reading(&IMUReading::new(1.5, raw_acc, raw_gyro))
            .unwrap();
        assert_abs_diff_eq!(reading.acc, true_acc, epsilon = 1e-9);
        assert_abs_diff_eq!(reading.gyro, true_gyro, epsilon = 1e-9);
        assert_abs_diff_eq!(reading.timestamp, 1.5);
    }

    #[test]
    fn gyro_only_calibration_is_rejected() {
        let cal = perturbed();
        assert!(cal.supports_acc_only());
        assert!(!cal.supports_gyro_only());
        assert!(cal.apply_acc(&[Vector3::zeros()]).is_ok());
        assert!(matches!(
            cal.apply_gyro(&[Vector3::zeros()]),
            Err(CalibrationError::Unsupported { .. })
        ));
    }

    #[test]
    fn mismatched_sample_counts_are_rejected() {
        let cal = FerrarisCalibrationInfo::identity();
        let err = cal
            .apply(&[Vector3::zeros(), Vector3::zeros()], &[Vector3::zeros()])
            .unwrap_err();
        assert!(matches!(err, CalibrationError::SampleCountMismatch { .. }));
    }

    #[test]
    fn degenerate_scale_is_surfaced() {
        let mut cal = FerrarisCalibrationInfo::identity();
        cal.K_a = Matrix3::from_diagonal(&Vector3::new(1.0, 0.0, 1.0));
        assert!(matches!(
            cal.apply_acc(&[Vector3::zeros()]),
            Err(CalibrationError::NonInvertible("K_a"))
        ));
    }

    #[test]
    fn json_round_trip_preserves_equality() {
        let mut cal = perturbed();
        cal.meta.acc_unit = Some("m/s^2".to_string());
        cal.meta.comment = Some("bench calibration".to_string());
        let json = cal.to_json().unwrap();
        let loaded = crate::loader::from_json_str(&json).unwrap();
        assert!(cal.equals(loaded.as_ref()).unwrap());
    }

    #[test]
    fn missing_parameter_fails_deserialization() {
        let cal = perturbed();
        let mut doc = cal.to_document();
        doc.params.remove("K_ga");
        assert!(matches!(
            from_document(&doc),
            Err(CalibrationError::MissingParam(name)) if name == "K_ga"
        ));
    }

    #[test]
    fn equality_is_exact() {
        let a = perturbed();
        let mut b = perturbed();
        assert!(a.equals(&b).unwrap());
        b.b_a.x += 1e-15;
        assert!(!a.equals(&b).unwrap());
        let mut c = perturbed();
        c.meta.comment = Some("different".to_string());
        assert!(!a.equals(&c).unwrap());
    }
}
