//! Lot entity - wafers sharing one test program and parameter schema
//!
//! A lot starts empty. The first parsed file fixes the parameter schema;
//! every file afterwards appends one wafer. The combined table is a derived
//! view: any mutation drops it and the combiner has to be run again.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::parameter::Parameter;
use crate::entities::table::DataTable;
use crate::entities::wafer::Wafer;

/// Default bin denoting a good chip
pub const DEFAULT_PASS_BIN: i64 = 1;

fn default_pass_bin() -> i64 {
    DEFAULT_PASS_BIN
}

/// Errors raised when a mutation would break lot invariants
#[derive(Debug, Error, PartialEq)]
pub enum LotError {
    #[error("Lot '{lot}' already has a parameter schema")]
    SchemaAlreadySet { lot: String },

    #[error("Duplicate parameter id '{id}' in lot '{lot}'")]
    DuplicateParameter { lot: String, id: String },

    #[error("Wafer '{wafer}' has column '{column}' which is not a parameter of lot '{lot}'")]
    UnknownColumn {
        lot: String,
        wafer: String,
        column: String,
    },
}

/// A production lot of wafers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    /// Lot id
    pub lot_id: String,

    /// Product name
    #[serde(default)]
    pub product: String,

    /// Bin counted as passing
    #[serde(default = "default_pass_bin")]
    pub pass_bin: i64,

    #[serde(default)]
    wafers: Vec<Wafer>,

    #[serde(default)]
    parameters: Vec<Parameter>,

    /// Count of leading parameters read from files; `None` until the first
    /// file fixes the schema
    #[serde(default)]
    read_parameters: Option<usize>,

    #[serde(skip)]
    combined_data: Option<DataTable>,
}

impl Lot {
    /// Create an empty lot
    pub fn new(lot_id: impl Into<String>, product: impl Into<String>) -> Self {
        Self {
            lot_id: lot_id.into(),
            product: product.into(),
            pass_bin: DEFAULT_PASS_BIN,
            wafers: Vec::new(),
            parameters: Vec::new(),
            read_parameters: None,
            combined_data: None,
        }
    }

    /// Wafers in the order they were added
    pub fn wafers(&self) -> &[Wafer] {
        &self.wafers
    }

    /// Parameters in declaration order
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Look up a parameter by id
    pub fn parameter(&self, id: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// Parameters that came from the file schema, without derived ones
    pub fn read_parameters(&self) -> &[Parameter] {
        &self.parameters[..self.read_parameters.unwrap_or(0)]
    }

    /// Whether a parameter schema has been established, even an empty one
    pub fn has_schema(&self) -> bool {
        self.read_parameters.is_some()
    }

    /// Total chips across all wafers
    pub fn total_chips(&self) -> usize {
        self.wafers.iter().map(Wafer::chip_count).sum()
    }

    /// The combined table from the last combiner run, if still current
    pub fn combined_data(&self) -> Option<&DataTable> {
        self.combined_data.as_ref()
    }

    /// Establish the parameter schema; allowed only once
    ///
    /// The schema goes in front of any derived parameter added earlier.
    pub fn set_schema(&mut self, parameters: Vec<Parameter>) -> Result<(), LotError> {
        if self.has_schema() {
            return Err(LotError::SchemaAlreadySet {
                lot: self.lot_id.clone(),
            });
        }
        for (i, p) in parameters.iter().enumerate() {
            let repeated = parameters[..i].iter().any(|q| q.id == p.id);
            if repeated || self.parameter(&p.id).is_some() {
                return Err(LotError::DuplicateParameter {
                    lot: self.lot_id.clone(),
                    id: p.id.clone(),
                });
            }
        }
        self.read_parameters = Some(parameters.len());
        self.parameters.splice(0..0, parameters);
        self.combined_data = None;
        Ok(())
    }

    /// Append a derived parameter to the schema
    pub fn add_parameter(&mut self, parameter: Parameter) -> Result<(), LotError> {
        if self.parameter(&parameter.id).is_some() {
            return Err(LotError::DuplicateParameter {
                lot: self.lot_id.clone(),
                id: parameter.id,
            });
        }
        self.parameters.push(parameter);
        self.combined_data = None;
        Ok(())
    }

    /// Append a wafer; its columns must all be parameters of the lot
    pub fn push_wafer(&mut self, wafer: Wafer) -> Result<(), LotError> {
        if let Some(column) = wafer
            .chip_data()
            .ids()
            .find(|id| self.parameter(id).is_none())
        {
            return Err(LotError::UnknownColumn {
                lot: self.lot_id.clone(),
                wafer: wafer.wafer_id.clone(),
                column: column.to_string(),
            });
        }
        self.wafers.push(wafer);
        self.combined_data = None;
        Ok(())
    }

    pub(crate) fn parameters_mut(&mut self) -> &mut [Parameter] {
        self.combined_data = None;
        &mut self.parameters
    }

    pub(crate) fn wafers_mut(&mut self) -> &mut [Wafer] {
        self.combined_data = None;
        &mut self.wafers
    }

    pub(crate) fn set_combined_data(&mut self, table: DataTable) -> &DataTable {
        self.combined_data.insert(table)
    }
}
