//! Binary container format for calibration records.
//!
//! A small self-describing file: a magic number and format version, the
//! calibration type tag, a list of named float64 datasets and a list of
//! named string attributes. Datasets are stored row-major, all integers and
//! floats little-endian. Unset metadata fields are not written at all, so
//! they read back as unset rather than as empty strings.
//!
//! Layout:
//!
//! ```text
//! [4]  magic "IMCL"
//! [1]  format version (currently 1)
//! str  cal_type
//! u32  dataset count
//!      per dataset: str name, u32 rows, u32 cols, rows*cols f64 values
//! u32  attribute count
//!      per attribute: str name, str value
//! ```
//!
//! where `str` is a u32 length followed by that many bytes of UTF-8.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use nalgebra::{Matrix3, Vector3};

use crate::calibration_info::CalMeta;
use crate::document::{CalDocument, Param};
use crate::error::{CalibrationError, Result};

const MAGIC: &[u8; 4] = b"IMCL";
const FORMAT_VERSION: u8 = 1;

// Upper bounds on variable-length fields, to fail fast on corrupt files
// instead of attempting huge allocations.
const MAX_STRING_LEN: u32 = 1 << 16;
const MAX_ENTRY_COUNT: u32 = 1 << 10;

/// Write a document to `path` in the container format.
pub fn write_file(path: &Path, doc: &CalDocument) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(MAGIC)?;
    writer.write_all(&[FORMAT_VERSION])?;
    write_str(&mut writer, &doc.cal_type)?;

    write_u32(&mut writer, doc.params.len() as u32)?;
    for (name, param) in &doc.params {
        write_str(&mut writer, name)?;
        let (rows, cols) = param.shape();
        write_u32(&mut writer, rows as u32)?;
        write_u32(&mut writer, cols as u32)?;
        match param {
            Param::Vector(v) => {
                for i in 0..3 {
                    writer.write_all(&v[i].to_le_bytes())?;
                }
            }
            Param::Matrix(m) => {
                for r in 0..3 {
                    for c in 0..3 {
                        writer.write_all(&m[(r, c)].to_le_bytes())?;
                    }
                }
            }
        }
    }

    let attrs = doc.meta.to_attrs();
    write_u32(&mut writer, attrs.len() as u32)?;
    for (name, value) in &attrs {
        write_str(&mut writer, name)?;
        write_str(&mut writer, value)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a document back from a container file.
pub fn read_file(path: &Path) -> Result<CalDocument> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(CalibrationError::Malformed(
            "not a calibration container (bad magic number)".to_string(),
        ));
    }
    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != FORMAT_VERSION {
        return Err(CalibrationError::Malformed(format!(
            "unsupported container version {}",
            version[0]
        )));
    }

    let cal_type = read_str(&mut reader)?;

    let dataset_count = read_count(&mut reader)?;
    let mut params = BTreeMap::new();
    for _ in 0..dataset_count {
        let name = read_str(&mut reader)?;
        let rows = read_u32(&mut reader)?;
        let cols = read_u32(&mut reader)?;
        let param = match (rows, cols) {
            (3, 1) => {
                let mut v = Vector3::zeros();
                for i in 0..3 {
                    v[i] = read_f64(&mut reader)?;
                }
                Param::Vector(v)
            }
            (3, 3) => {
                let mut m = Matrix3::zeros();
                for r in 0..3 {
                    for c in 0..3 {
                        m[(r, c)] = read_f64(&mut reader)?;
                    }
                }
                Param::Matrix(m)
            }
            _ => {
                return Err(CalibrationError::WrongShape {
                    name,
                    rows: rows as usize,
                    cols: cols as usize,
                    expected: "3x1 or 3x3",
                })
            }
        };
        params.insert(name, param);
    }

    let attr_count = read_count(&mut reader)?;
    let mut attrs = BTreeMap::new();
    for _ in 0..attr_count {
        let name = read_str(&mut reader)?;
        let value = read_str(&mut reader)?;
        attrs.insert(name, value);
    }

    Ok(CalDocument {
        cal_type,
        params,
        meta: CalMeta::from_attrs(&attrs),
    })
}

fn write_u32(writer: &mut impl Write, value: u32) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_str(writer: &mut impl Write, text: &str) -> Result<()> {
    write_u32(writer, text.len() as u32)?;
    writer.write_all(text.as_bytes())?;
    Ok(())
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f64(reader: &mut impl Read) -> Result<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn read_count(reader: &mut impl Read) -> Result<u32> {
    let count = read_u32(reader)?;
    if count > MAX_ENTRY_COUNT {
        return Err(CalibrationError::Malformed(format!(
            "implausible entry count {count}"
        )));
    }
    Ok(count)
}

fn read_str(reader: &mut impl Read) -> Result<String> {
    let len = read_u32(reader)?;
    if len > MAX_STRING_LEN {
        return Err(CalibrationError::Malformed(format!(
            "implausible string length {len}"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|_| CalibrationError::Malformed("string is not valid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> CalDocument {
        let mut params = BTreeMap::new();
        params.insert(
            "bias".to_string(),
            Param::Vector(Vector3::new(0.1, 0.2, -0.3)),
        );
        params.insert(
            "scale".to_string(),
            Param::Matrix(Matrix3::new(1.0, 0.0, 0.1, 0.0, 2.0, 0.2, 0.3, 0.0, 3.0)),
        );
        CalDocument {
            cal_type: "test".to_string(),
            params,
            meta: CalMeta {
                gyr_unit: Some("deg/s".to_string()),
                comment: Some("bench run".to_string()),
                ..CalMeta::default()
            },
        }
    }

    #[test]
    fn round_trip_is_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.hdf");
        let doc = sample_document();
        write_file(&path, &doc).unwrap();
        let loaded = read_file(&path).unwrap();
        assert_eq!(doc, loaded);
    }

    #[test]
    fn unset_metadata_stays_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.hdf");
        write_file(&path, &sample_document()).unwrap();
        let loaded = read_file(&path).unwrap();
        assert_eq!(loaded.meta.gyr_unit.as_deref(), Some("deg/s"));
        assert_eq!(loaded.meta.acc_unit, None);
        assert_eq!(loaded.meta.from_acc_unit, None);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.hdf");
        std::fs::write(&path, b"NOPE\x01rest of the file").unwrap();
        assert!(matches!(
            read_file(&path),
            Err(CalibrationError::Malformed(_))
        ));
    }

    #[test]
    fn future_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.hdf");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.push(99);
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            read_file(&path),
            Err(CalibrationError::Malformed(_))
        ));
    }

    #[test]
    fn truncated_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.hdf");
        let doc = sample_document();
        write_file(&path, &doc).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(read_file(&path), Err(CalibrationError::Io(_))));
    }

    #[test]
    fn implausible_lengths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.hdf");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.push(FORMAT_VERSION);
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            read_file(&path),
            Err(CalibrationError::Malformed(_))
        ));
    }
}
