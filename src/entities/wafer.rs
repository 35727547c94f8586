//! Wafer entity - one wafer's chip-level results
//!
//! The four index sequences (`seq`, `bin`, `x`, `y`) and every chip data
//! column always have exactly `chip_count` entries. Constructors and column
//! inserts enforce that.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when wafer data would break its shape
#[derive(Debug, Error, PartialEq)]
pub enum WaferError {
    #[error("Wafer '{wafer}': {field} has {actual} entries, expected {expected}")]
    LengthMismatch {
        wafer: String,
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Wafer '{wafer}' already has a column '{column}'")]
    DuplicateColumn { wafer: String, column: String },
}

/// Per-chip parameter values keyed by parameter id, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChipData {
    columns: Vec<(String, Vec<Option<f64>>)>,
}

impl ChipData {
    /// Values of one parameter column
    pub fn get(&self, id: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|(name, _)| name == id)
            .map(|(_, values)| values.as_slice())
    }

    /// Whether the column exists
    pub fn contains(&self, id: &str) -> bool {
        self.columns.iter().any(|(name, _)| name == id)
    }

    /// Column ids in insertion order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if there are no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn insert(&mut self, id: String, values: Vec<Option<f64>>) {
        self.columns.push((id, values));
    }
}

/// A single wafer's test results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wafer {
    /// Wafer id as read from the file
    pub wafer_id: String,

    /// Lot id as read from the file, when the file carries one
    pub source_lot_id: Option<String>,

    seq: Vec<Option<i64>>,
    bin: Vec<Option<i64>>,
    x: Vec<Option<i64>>,
    y: Vec<Option<i64>>,
    chip_data: ChipData,
}

impl Wafer {
    /// Create a wafer from its index sequences
    ///
    /// All four sequences must have the same length.
    pub fn new(
        wafer_id: impl Into<String>,
        source_lot_id: Option<String>,
        seq: Vec<Option<i64>>,
        bin: Vec<Option<i64>>,
        x: Vec<Option<i64>>,
        y: Vec<Option<i64>>,
    ) -> Result<Self, WaferError> {
        let wafer_id = wafer_id.into();
        let expected = seq.len();
        for (field, actual) in [("bin", bin.len()), ("x", x.len()), ("y", y.len())] {
            if actual != expected {
                return Err(WaferError::LengthMismatch {
                    wafer: wafer_id,
                    field: field.to_string(),
                    expected,
                    actual,
                });
            }
        }
        Ok(Self {
            wafer_id,
            source_lot_id,
            seq,
            bin,
            x,
            y,
            chip_data: ChipData::default(),
        })
    }

    /// Create a wafer whose only index data is a bin per chip
    ///
    /// Sequence numbers run from 1; coordinates are left missing.
    pub fn from_bins(wafer_id: impl Into<String>, bins: &[i64]) -> Self {
        let n = bins.len();
        Self {
            wafer_id: wafer_id.into(),
            source_lot_id: None,
            seq: (1..=n as i64).map(Some).collect(),
            bin: bins.iter().copied().map(Some).collect(),
            x: vec![None; n],
            y: vec![None; n],
            chip_data: ChipData::default(),
        }
    }

    /// Number of chips
    pub fn chip_count(&self) -> usize {
        self.seq.len()
    }

    pub fn seq(&self) -> &[Option<i64>] {
        &self.seq
    }

    pub fn bin(&self) -> &[Option<i64>] {
        &self.bin
    }

    pub fn x(&self) -> &[Option<i64>] {
        &self.x
    }

    pub fn y(&self) -> &[Option<i64>] {
        &self.y
    }

    /// Parameter columns
    pub fn chip_data(&self) -> &ChipData {
        &self.chip_data
    }

    /// Add a parameter column; it must have one value per chip
    pub fn add_column(
        &mut self,
        id: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<(), WaferError> {
        let id = id.into();
        if self.chip_data.contains(&id) {
            return Err(WaferError::DuplicateColumn {
                wafer: self.wafer_id.clone(),
                column: id,
            });
        }
        if values.len() != self.chip_count() {
            return Err(WaferError::LengthMismatch {
                wafer: self.wafer_id.clone(),
                field: id,
                expected: self.chip_count(),
                actual: values.len(),
            });
        }
        self.chip_data.insert(id, values);
        Ok(())
    }

    /// Builder-style column insert, for fixtures
    pub fn with_column(
        mut self,
        id: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self, WaferError> {
        self.add_column(id, values)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_lengths() {
        let err = Wafer::new(
            "W01",
            None,
            vec![Some(1), Some(2)],
            vec![Some(1), Some(1)],
            vec![Some(0)],
            vec![Some(0), Some(1)],
        )
        .unwrap_err();
        assert!(matches!(err, WaferError::LengthMismatch { ref field, .. } if field == "x"));
    }

    #[test]
    fn test_from_bins() {
        let wafer = Wafer::from_bins("W01", &[1, 2, 1]);
        assert_eq!(wafer.chip_count(), 3);
        assert_eq!(wafer.seq(), &[Some(1), Some(2), Some(3)]);
        assert_eq!(wafer.bin()[1], Some(2));
        assert_eq!(wafer.x(), &[None, None, None]);
    }

    #[test]
    fn test_add_column_checks_length_and_duplicates() {
        let mut wafer = Wafer::from_bins("W01", &[1, 1]);
        assert!(wafer.add_column("VTH", vec![Some(0.5)]).is_err());
        wafer.add_column("VTH", vec![Some(0.5), None]).unwrap();
        assert!(matches!(
            wafer.add_column("VTH", vec![None, None]),
            Err(WaferError::DuplicateColumn { .. })
        ));
        assert_eq!(wafer.chip_data().get("VTH"), Some(&[Some(0.5), None][..]));
        assert_eq!(wafer.chip_data().ids().collect::<Vec<_>>(), vec!["VTH"]);
    }
}
