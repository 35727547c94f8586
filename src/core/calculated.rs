//! Calculated parameters - derived columns defined in a setup grid
//!
//! Each setup column declares one new parameter over six rows: display
//! name, id, formula, unit, lower bound, upper bound. Labels sit in column
//! 0, so definitions start at column 1. Formulas use `fN` to address the
//! N-th parameter the lot had before the setup was applied.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::core::formula::{Formula, FormulaError};
use crate::core::grid::{Grid, GridError};
use crate::core::units::{self, Quantity};
use crate::entities::{Lot, Parameter};

pub const NAME_ROW: usize = 0;
pub const ID_ROW: usize = 1;
pub const FORMULA_ROW: usize = 2;
pub const UNIT_ROW: usize = 3;
pub const LOWER_ROW: usize = 4;
pub const UPPER_ROW: usize = 5;
pub const FIRST_COL: usize = 1;

/// One derived parameter as declared in the setup
#[derive(Debug, Clone, PartialEq)]
pub struct CalcDefinition {
    pub name: String,
    pub id: String,
    pub formula: String,
    pub unit: String,
    pub lower_limit: Option<f64>,
    pub upper_limit: Option<f64>,
}

/// Why a definition was not applied
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The same id appears earlier in the setup
    DuplicateInSetup,
    /// The id is already a parameter of the lot
    ExistingParameter,
    /// The formula does not compile
    Formula(FormulaError),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DuplicateInSetup => write!(f, "duplicate id in setup"),
            SkipReason::ExistingParameter => write!(f, "id already used by the lot"),
            SkipReason::Formula(e) => write!(f, "{}", e),
        }
    }
}

/// Outcome of applying a setup to a lot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalcReport {
    /// Ids added to the lot, in setup order
    pub added: Vec<String>,
    /// Ids rejected, with the reason
    pub skipped: Vec<(String, SkipReason)>,
}

/// A parsed calculated-parameter setup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalcSetup {
    definitions: Vec<CalcDefinition>,
}

impl CalcSetup {
    pub fn new(definitions: Vec<CalcDefinition>) -> Self {
        Self { definitions }
    }

    /// Load a setup grid from a csv or workbook file
    pub fn from_path(path: &Path) -> Result<Self, GridError> {
        Ok(Self::from_grid(&Grid::from_path(path)?))
    }

    /// Read definitions from a setup grid
    ///
    /// Columns with a blank formula are skipped, as are columns without an
    /// id (the display name stands in when only the id is blank).
    pub fn from_grid(grid: &Grid) -> Self {
        let mut definitions = Vec::new();
        for col in FIRST_COL..grid.n_cols() {
            let Some(formula) = grid.text(FORMULA_ROW, col) else {
                continue;
            };
            let name = grid.text(NAME_ROW, col);
            let Some(id) = grid.text(ID_ROW, col).or_else(|| name.clone()) else {
                warn!("Setup column {} has a formula but no id; skipped", col);
                continue;
            };
            let unit = grid.text(UNIT_ROW, col).unwrap_or_default();
            definitions.push(CalcDefinition {
                name: name.unwrap_or_else(|| id.clone()),
                id,
                formula,
                lower_limit: bound(grid, LOWER_ROW, col, &unit),
                upper_limit: bound(grid, UPPER_ROW, col, &unit),
                unit,
            });
        }
        debug!("Setup declares {} calculated parameters", definitions.len());
        Self { definitions }
    }

    pub fn definitions(&self) -> &[CalcDefinition] {
        &self.definitions
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Add every acceptable definition to `lot`
    ///
    /// Rejected definitions are logged and reported, never fatal. Each
    /// accepted parameter gets a column on every wafer that carries all of
    /// its inputs; rows with a missing input or a failed evaluation hold a
    /// missing value.
    pub fn apply_to(&self, lot: &mut Lot) -> CalcReport {
        let existing: Vec<String> = lot.parameters().iter().map(|p| p.id.clone()).collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut report = CalcReport::default();

        for def in &self.definitions {
            let rejection = if !seen.insert(def.id.as_str()) {
                Some(SkipReason::DuplicateInSetup)
            } else if existing.contains(&def.id) {
                Some(SkipReason::ExistingParameter)
            } else {
                None
            };
            if let Some(reason) = rejection {
                warn!("Calculated parameter '{}' skipped: {}", def.id, reason);
                report.skipped.push((def.id.clone(), reason));
                continue;
            }

            let formula = match Formula::compile(&def.formula, existing.as_slice()) {
                Ok(f) => f,
                Err(e) => {
                    warn!(
                        "Calculated parameter '{}' skipped: formula '{}': {}",
                        def.id, def.formula, e
                    );
                    report.skipped.push((def.id.clone(), SkipReason::Formula(e)));
                    continue;
                }
            };

            let columns = evaluate_wafers(lot, &formula);
            let parameter = Parameter::new(&def.id, &def.name, &def.unit)
                .with_limits(def.lower_limit, def.upper_limit);
            if let Err(e) = lot.add_parameter(parameter) {
                warn!("Calculated parameter '{}' skipped: {}", def.id, e);
                report
                    .skipped
                    .push((def.id.clone(), SkipReason::ExistingParameter));
                continue;
            }

            let mut filled = 0;
            for (wafer, values) in lot.wafers_mut().iter_mut().zip(columns) {
                let Some(values) = values else { continue };
                match wafer.add_column(def.id.clone(), values) {
                    Ok(()) => filled += 1,
                    Err(e) => warn!("{}", e),
                }
            }
            info!(
                "Added calculated parameter {} = {} on {} wafers",
                def.id,
                formula.expression(),
                filled
            );
            report.added.push(def.id.clone());
        }
        report
    }
}

/// Per-wafer column for `formula`, or `None` where an input column is absent
fn evaluate_wafers(lot: &Lot, formula: &Formula) -> Vec<Option<Vec<Option<f64>>>> {
    lot.wafers()
        .iter()
        .map(|wafer| {
            let data = wafer.chip_data();
            let inputs: Option<Vec<&[Option<f64>]>> =
                formula.dependencies().iter().map(|id| data.get(id)).collect();
            let Some(inputs) = inputs else {
                debug!(
                    "Wafer {} lacks inputs of '{}'",
                    wafer.wafer_id,
                    formula.source()
                );
                return None;
            };
            let values = (0..wafer.chip_count())
                .map(|row| {
                    formula.evaluate(|id| {
                        let i = formula.dependencies().iter().position(|d| d == id)?;
                        inputs[i][row]
                    })
                })
                .collect();
            Some(values)
        })
        .collect()
}

/// A bound cell: number in the setup unit, or a quantity with its own unit
fn bound(grid: &Grid, row: usize, col: usize, unit: &str) -> Option<f64> {
    let cell = grid.cell(row, col);
    cell.as_f64().or_else(|| {
        cell.as_text()
            .and_then(|text| units::parse_quantity(&text))
            .map(|q: Quantity| q.in_unit(unit))
    })
}
