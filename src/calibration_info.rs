//! The polymorphic calibration record interface.
//!
//! Every calibration method stores its correction parameters in a type
//! implementing [`CalibrationInfo`]. Records are serializable to JSON and to
//! the binary container format, compare structurally via [`CalibrationInfo::equals`],
//! and are reconstructed from files through the type registry in
//! [`crate::registry`].

use std::collections::BTreeMap;
use std::path::Path;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::container;
use crate::document::{CalDocument, Param};
use crate::error::{CalibrationError, Result};

/// Optional metadata carried by every calibration record.
///
/// Units describe what the record converts *from* (raw) and *to*
/// (calibrated); none of them affect the math.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalMeta {
    /// Unit of the calibrated acceleration output.
    pub acc_unit: Option<String>,
    /// Unit of the calibrated angular rate output.
    pub gyr_unit: Option<String>,
    /// Unit of the raw acceleration input.
    pub from_acc_unit: Option<String>,
    /// Unit of the raw angular rate input.
    pub from_gyr_unit: Option<String>,
    /// Free-text note about how the calibration was obtained.
    pub comment: Option<String>,
}

impl CalMeta {
    pub(crate) const FIELDS: [&'static str; 5] = [
        "acc_unit",
        "gyr_unit",
        "from_acc_unit",
        "from_gyr_unit",
        "comment",
    ];

    pub(crate) fn field(&self, name: &str) -> &Option<String> {
        match name {
            "acc_unit" => &self.acc_unit,
            "gyr_unit" => &self.gyr_unit,
            "from_acc_unit" => &self.from_acc_unit,
            "from_gyr_unit" => &self.from_gyr_unit,
            "comment" => &self.comment,
            _ => unreachable!("not a metadata field: {name}"),
        }
    }

    pub(crate) fn field_mut(&mut self, name: &str) -> &mut Option<String> {
        match name {
            "acc_unit" => &mut self.acc_unit,
            "gyr_unit" => &mut self.gyr_unit,
            "from_acc_unit" => &mut self.from_acc_unit,
            "from_gyr_unit" => &mut self.from_gyr_unit,
            "comment" => &mut self.comment,
            _ => unreachable!("not a metadata field: {name}"),
        }
    }

    /// Attribute map for the binary container. Unset fields are omitted, not
    /// written as empty strings, so they read back as unset.
    pub(crate) fn to_attrs(&self) -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();
        for name in Self::FIELDS {
            if let Some(value) = self.field(name) {
                attrs.insert(name.to_string(), value.clone());
            }
        }
        attrs
    }

    pub(crate) fn from_attrs(attrs: &BTreeMap<String, String>) -> Self {
        let mut meta = CalMeta::default();
        for name in Self::FIELDS {
            if let Some(value) = attrs.get(name) {
                *meta.field_mut(name) = Some(value.clone());
            }
        }
        meta
    }
}

/// A calibration record: the correction parameters of one calibration
/// method, plus metadata.
///
/// Implementations must provide the full forward transform ([`apply`]) and
/// declare their parameter arrays through [`param_fields`]; equality and
/// serialization are derived from that declaration. Partial transforms are
/// optional and capability-flagged, since some methods (Ferraris included)
/// cannot calibrate the gyroscope without accompanying acceleration data.
///
/// [`apply`]: CalibrationInfo::apply
/// [`param_fields`]: CalibrationInfo::param_fields
pub trait CalibrationInfo: std::fmt::Debug {
    /// The unique, registered type tag of this calibration method.
    fn cal_type(&self) -> &'static str;

    /// Record metadata.
    fn meta(&self) -> &CalMeta;

    /// The ordered parameter arrays of this method.
    fn param_fields(&self) -> Vec<(&'static str, Param)>;

    /// Calibrate matching accelerometer and gyroscope sample sequences.
    fn apply(
        &self,
        acc: &[Vector3<f64>],
        gyro: &[Vector3<f64>],
    ) -> Result<(Vec<Vector3<f64>>, Vec<Vector3<f64>>)>;

    /// Whether acceleration can be calibrated on its own.
    fn supports_acc_only(&self) -> bool {
        false
    }

    /// Whether angular rate can be calibrated on its own.
    fn supports_gyro_only(&self) -> bool {
        false
    }

    /// Calibrate acceleration alone, if the method supports it.
    fn apply_acc(&self, acc: &[Vector3<f64>]) -> Result<Vec<Vector3<f64>>> {
        let _ = acc;
        Err(CalibrationError::Unsupported {
            cal_type: self.cal_type(),
            op: "apply_acc",
            reason: "this calibration type cannot calibrate acceleration independently",
        })
    }

    /// Calibrate angular rate alone, if the method supports it.
    fn apply_gyro(&self, gyro: &[Vector3<f64>]) -> Result<Vec<Vector3<f64>>> {
        let _ = gyro;
        Err(CalibrationError::Unsupported {
            cal_type: self.cal_type(),
            op: "apply_gyro",
            reason: "this calibration type cannot calibrate angular rate independently",
        })
    }

    /// Structural equality with another record of the same type.
    ///
    /// Comparing records of different calibration types is an error, not
    /// `false`: such a comparison is almost certainly a bug in the caller.
    /// Parameter arrays are compared exactly, element by element.
    fn equals(&self, other: &dyn CalibrationInfo) -> Result<bool> {
        if self.cal_type() != other.cal_type() {
            return Err(CalibrationError::TypeMismatch {
                left: self.cal_type().to_string(),
                right: other.cal_type().to_string(),
            });
        }
        let ours = self.param_fields();
        let theirs = other.param_fields();
        if ours.len() != theirs.len()
            || ours
                .iter()
                .zip(theirs.iter())
                .any(|((a, _), (b, _))| a != b)
        {
            return Err(CalibrationError::FieldSetMismatch(
                self.cal_type().to_string(),
            ));
        }
        Ok(ours == theirs && self.meta() == other.meta())
    }

    /// The normalized flat representation used by both storage formats.
    fn to_document(&self) -> CalDocument {
        CalDocument {
            cal_type: self.cal_type().to_string(),
            params: self
                .param_fields()
                .into_iter()
                .map(|(name, param)| (name.to_string(), param))
                .collect(),
            meta: self.meta().clone(),
        }
    }

    /// Serialize to a JSON string.
    fn to_json(&self) -> Result<String> {
        self.to_document().to_json_string()
    }

    /// Write the JSON form to a file.
    fn to_json_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Write the binary container form to a file.
    fn to_hdf_file(&self, path: &Path) -> Result<()> {
        container::write_file(path, &self.to_document())
    }
}
