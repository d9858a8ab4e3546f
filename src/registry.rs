//! Process-wide registry of calibration types.
//!
//! Deserialization resolves the `cal_type` tag stored in a file to a factory
//! that rebuilds the concrete record. The registry is append-only and
//! pre-populated with the built-in Ferraris type; external crates add their
//! own methods with [`register_cal_type`] without touching this crate.

use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

use crate::calibration_info::CalibrationInfo;
use crate::document::CalDocument;
use crate::error::{CalibrationError, Result};
use crate::ferraris_calibration_info::{self, FERRARIS_CAL_TYPE};

/// Rebuilds a concrete calibration record from its flat document form.
pub type CalFactory = fn(&CalDocument) -> Result<Box<dyn CalibrationInfo>>;

static REGISTRY: OnceLock<RwLock<HashMap<String, CalFactory>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, CalFactory>> {
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<String, CalFactory> = HashMap::new();
        map.insert(
            FERRARIS_CAL_TYPE.to_string(),
            ferraris_calibration_info::from_document,
        );
        RwLock::new(map)
    })
}

/// Register a new calibration type under a unique tag.
///
/// Fails if the tag is already taken; tags are never overwritten or removed.
pub fn register_cal_type(cal_type: &str, factory: CalFactory) -> Result<()> {
    let mut map = registry().write().unwrap_or_else(PoisonError::into_inner);
    if map.contains_key(cal_type) {
        return Err(CalibrationError::DuplicateCalType(cal_type.to_string()));
    }
    map.insert(cal_type.to_string(), factory);
    Ok(())
}

/// Look up the factory for a tag.
pub fn resolve(cal_type: &str) -> Result<CalFactory> {
    let map = registry().read().unwrap_or_else(PoisonError::into_inner);
    map.get(cal_type)
        .copied()
        .ok_or_else(|| CalibrationError::UnknownCalType(cal_type.to_string()))
}

/// Rebuild a record of any registered type from its document form.
pub fn from_document(doc: &CalDocument) -> Result<Box<dyn CalibrationInfo>> {
    resolve(&doc.cal_type)?(doc)
}
