//! Labels and row ranges for the nine Ferraris measurement phases.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CalibrationError;

/// One of the nine Ferraris measurement phases.
///
/// Six static phases (each axis pointing up and down once) and three
/// rotation phases (one controlled rotation about each axis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SectionLabel {
    XPlus,
    XMinus,
    YPlus,
    YMinus,
    ZPlus,
    ZMinus,
    XRotation,
    YRotation,
    ZRotation,
}

impl SectionLabel {
    /// All labels in the canonical measurement order.
    pub const ALL: [SectionLabel; 9] = [
        SectionLabel::XPlus,
        SectionLabel::XMinus,
        SectionLabel::YPlus,
        SectionLabel::YMinus,
        SectionLabel::ZPlus,
        SectionLabel::ZMinus,
        SectionLabel::XRotation,
        SectionLabel::YRotation,
        SectionLabel::ZRotation,
    ];

    /// The six static phases in canonical order.
    pub const STATIC: [SectionLabel; 6] = [
        SectionLabel::XPlus,
        SectionLabel::XMinus,
        SectionLabel::YPlus,
        SectionLabel::YMinus,
        SectionLabel::ZPlus,
        SectionLabel::ZMinus,
    ];

    /// The three rotation phases in canonical order.
    pub const ROTATION: [SectionLabel; 3] = [
        SectionLabel::XRotation,
        SectionLabel::YRotation,
        SectionLabel::ZRotation,
    ];

    /// Canonical short name, as used in section tables and files.
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionLabel::XPlus => "x_p",
            SectionLabel::XMinus => "x_a",
            SectionLabel::YPlus => "y_p",
            SectionLabel::YMinus => "y_a",
            SectionLabel::ZPlus => "z_p",
            SectionLabel::ZMinus => "z_a",
            SectionLabel::XRotation => "x_rot",
            SectionLabel::YRotation => "y_rot",
            SectionLabel::ZRotation => "z_rot",
        }
    }

    pub fn is_static(&self) -> bool {
        !self.is_rotation()
    }

    pub fn is_rotation(&self) -> bool {
        matches!(
            self,
            SectionLabel::XRotation | SectionLabel::YRotation | SectionLabel::ZRotation
        )
    }

    /// The label that follows this one in the canonical measurement order.
    pub fn next(&self) -> Option<SectionLabel> {
        let idx = SectionLabel::ALL.iter().position(|l| l == self)?;
        SectionLabel::ALL.get(idx + 1).copied()
    }
}

impl fmt::Display for SectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionLabel {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionLabel::ALL
            .iter()
            .find(|l| l.as_str() == s)
            .copied()
            .ok_or_else(|| CalibrationError::Malformed(format!("unknown section label `{s}`")))
    }
}

/// Maps each measurement phase to a half-open `start..end` row range of the
/// raw sample table.
///
/// This is the hand-off format produced by any section-picking front end
/// (interactive or automatic) and consumed by
/// [`FerrarisCalibration::from_section_list`](crate::FerrarisCalibration::from_section_list).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionList {
    ranges: BTreeMap<SectionLabel, (usize, usize)>,
}

impl SectionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: SectionLabel, start: usize, end: usize) {
        self.ranges.insert(label, (start, end));
    }

    pub fn get(&self, label: SectionLabel) -> Option<(usize, usize)> {
        self.ranges.get(&label).copied()
    }

    /// Labels that have not been assigned a range yet.
    pub fn missing(&self) -> Vec<SectionLabel> {
        SectionLabel::ALL
            .iter()
            .filter(|l| !self.ranges.contains_key(l))
            .copied()
            .collect()
    }

    /// True when all nine phases have a non-empty range.
    pub fn is_complete(&self) -> bool {
        SectionLabel::ALL
            .iter()
            .all(|l| matches!(self.ranges.get(l), Some((s, e)) if s < e))
    }

    pub fn iter(&self) -> impl Iterator<Item = (SectionLabel, (usize, usize))> + '_ {
        self.ranges.iter().map(|(l, r)| (*l, *r))
    }
}
