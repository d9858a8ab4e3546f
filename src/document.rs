//! Normalized flat representation of a calibration record.
//!
//! [`CalDocument`] is the common intermediate form between a
//! [`CalibrationInfo`](crate::CalibrationInfo) and both on-disk formats: the
//! JSON mapping and the binary container. Factories registered in
//! [`crate::registry`] consume a document and rebuild the concrete record.

use std::collections::BTreeMap;

use nalgebra::{Matrix3, Vector3};
use serde_json::{Map, Number, Value};

use crate::calibration_info::CalMeta;
use crate::error::{CalibrationError, Result};

/// One parameter array: a 3-vector or a 3x3 matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Vector(Vector3<f64>),
    Matrix(Matrix3<f64>),
}

impl Param {
    /// (rows, cols) of the array.
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Param::Vector(_) => (3, 1),
            Param::Matrix(_) => (3, 3),
        }
    }
}

/// Flat form of a calibration record: type tag, named parameter arrays and
/// metadata. Round-trips exactly through both storage formats.
#[derive(Debug, Clone, PartialEq)]
pub struct CalDocument {
    pub cal_type: String,
    pub params: BTreeMap<String, Param>,
    pub meta: CalMeta,
}

impl CalDocument {
    /// Fetch a declared 3-vector parameter.
    pub fn vector(&self, name: &str) -> Result<Vector3<f64>> {
        match self.params.get(name) {
            Some(Param::Vector(v)) => Ok(*v),
            Some(param) => {
                let (rows, cols) = param.shape();
                Err(CalibrationError::WrongShape {
                    name: name.to_string(),
                    rows,
                    cols,
                    expected: "3x1",
                })
            }
            None => Err(CalibrationError::MissingParam(name.to_string())),
        }
    }

    /// Fetch a declared 3x3 matrix parameter.
    pub fn matrix(&self, name: &str) -> Result<Matrix3<f64>> {
        match self.params.get(name) {
            Some(Param::Matrix(m)) => Ok(*m),
            Some(param) => {
                let (rows, cols) = param.shape();
                Err(CalibrationError::WrongShape {
                    name: name.to_string(),
                    rows,
                    cols,
                    expected: "3x3",
                })
            }
            None => Err(CalibrationError::MissingParam(name.to_string())),
        }
    }

    /// Build the flat JSON object: `cal_type`, all metadata keys (null when
    /// unset), and each parameter as a nested numeric list.
    pub fn to_json_value(&self) -> Value {
        let mut object = Map::new();
        object.insert("cal_type".to_string(), Value::String(self.cal_type.clone()));
        for name in CalMeta::FIELDS {
            let value = match self.meta.field(name) {
                Some(text) => Value::String(text.clone()),
                None => Value::Null,
            };
            object.insert(name.to_string(), value);
        }
        for (name, param) in &self.params {
            object.insert(name.clone(), param_to_json(param));
        }
        Value::Object(object)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json_value())?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Self::from_json_value(serde_json::from_str(text)?)
    }

    pub fn from_json_value(value: Value) -> Result<Self> {
        let Value::Object(object) = value else {
            return Err(CalibrationError::Malformed(
                "calibration JSON must be an object".to_string(),
            ));
        };

        let cal_type = match object.get("cal_type") {
            Some(Value::String(tag)) => tag.clone(),
            Some(_) => {
                return Err(CalibrationError::Malformed(
                    "`cal_type` must be a string".to_string(),
                ))
            }
            None => {
                return Err(CalibrationError::Malformed(
                    "`cal_type` is missing".to_string(),
                ))
            }
        };

        let mut meta = CalMeta::default();
        let mut params = BTreeMap::new();
        for (key, value) in &object {
            if key == "cal_type" {
                continue;
            }
            if CalMeta::FIELDS.contains(&key.as_str()) {
                match value {
                    Value::String(text) => {
                        *meta.field_mut(key) = Some(text.clone());
                    }
                    Value::Null => {}
                    _ => {
                        return Err(CalibrationError::Malformed(format!(
                            "metadata field `{key}` must be a string or null"
                        )))
                    }
                }
            } else if let Value::Array(_) = value {
                params.insert(key.clone(), param_from_json(key, value)?);
            }
            // Unknown scalar keys are passed over; the factory only reads
            // the fields its type declares.
        }

        Ok(CalDocument {
            cal_type,
            params,
            meta,
        })
    }
}

fn param_to_json(param: &Param) -> Value {
    match param {
        Param::Vector(v) => Value::Array((0..3).map(|i| number(v[i])).collect()),
        Param::Matrix(m) => Value::Array(
            (0..3)
                .map(|r| Value::Array((0..3).map(|c| number(m[(r, c)])).collect()))
                .collect(),
        ),
    }
}

fn number(value: f64) -> Value {
    // Calibration parameters are always finite; fall back to null only for
    // NaN/inf, which serde_json cannot represent.
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn param_from_json(name: &str, value: &Value) -> Result<Param> {
    let malformed = |detail: &str| {
        CalibrationError::Malformed(format!("parameter `{name}` is not a valid array: {detail}"))
    };
    let Value::Array(rows) = value else {
        return Err(malformed("expected an array"));
    };
    if rows.len() != 3 {
        return Err(malformed("expected exactly 3 entries"));
    }

    if rows.iter().all(|row| row.is_array()) {
        let mut m = Matrix3::zeros();
        for (r, row) in rows.iter().enumerate() {
            let Value::Array(cols) = row else {
                unreachable!()
            };
            if cols.len() != 3 {
                return Err(malformed("matrix rows must have 3 entries"));
            }
            for (c, entry) in cols.iter().enumerate() {
                m[(r, c)] = entry.as_f64().ok_or_else(|| malformed("non-numeric entry"))?;
            }
        }
        Ok(Param::Matrix(m))
    } else {
        let mut v = Vector3::zeros();
        for (i, entry) in rows.iter().enumerate() {
            v[i] = entry.as_f64().ok_or_else(|| malformed("non-numeric entry"))?;
        }
        Ok(Param::Vector(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sample_document() -> CalDocument {
        let mut params = BTreeMap::new();
        params.insert(
            "bias".to_string(),
            Param::Vector(Vector3::new(0.25, -1.5, 3.0)),
        );
        params.insert(
            "scale".to_string(),
            Param::Matrix(Matrix3::new(1.0, 0.1, 0.2, 0.3, 2.0, 0.4, 0.5, 0.6, 3.0)),
        );
        CalDocument {
            cal_type: "test".to_string(),
            params,
            meta: CalMeta {
                acc_unit: Some("m/s^2".to_string()),
                ..CalMeta::default()
            },
        }
    }

    #[test]
    fn json_round_trip() {
        let doc = sample_document();
        let text = doc.to_json_string().unwrap();
        let parsed = CalDocument::from_json_str(&text).unwrap();
        assert_eq!(doc, parsed);
    }

    #[test]
    fn json_layout_is_flat() {
        let value = sample_document().to_json_value();
        let object = value.as_object().unwrap();
        assert_eq!(object["cal_type"], "test");
        assert_eq!(object["acc_unit"], "m/s^2");
        assert!(object["gyr_unit"].is_null());
        assert_eq!(object["bias"][1], -1.5);
        assert_eq!(object["scale"][2][1], 0.6);
    }

    #[test]
    fn matrix_rows_are_row_major() {
        let doc = sample_document();
        let m = doc.matrix("scale").unwrap();
        assert_abs_diff_eq!(m[(0, 1)], 0.1);
        assert_abs_diff_eq!(m[(1, 0)], 0.3);
    }

    #[test]
    fn typed_accessors_enforce_shape() {
        let doc = sample_document();
        assert!(matches!(
            doc.vector("scale"),
            Err(CalibrationError::WrongShape { .. })
        ));
        assert!(matches!(
            doc.matrix("bias"),
            Err(CalibrationError::WrongShape { .. })
        ));
        assert!(matches!(
            doc.vector("nope"),
            Err(CalibrationError::MissingParam(_))
        ));
    }

    #[test]
    fn missing_cal_type_is_rejected() {
        let err = CalDocument::from_json_str("{\"bias\": [1, 2, 3]}").unwrap_err();
        assert!(matches!(err, CalibrationError::Malformed(_)));
    }
}
