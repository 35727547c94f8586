//! Grid reader - turns one raw export grid into lot data
//!
//! The first grid read into a lot establishes its parameter schema; every
//! grid (including the first) appends one wafer. A reader carries the
//! lot-scoped naming table and the column position of each schema
//! parameter, so one reader must serve exactly one lot, and files must be
//! fed to it sequentially.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::grid::{Grid, GridError};
use crate::core::layout::GridLayout;
use crate::core::namer::UniqueNamer;
use crate::core::units::{self, Quantity};
use crate::entities::{Lot, LotError, Parameter, Wafer, WaferError};

/// Item name that marks a non-parameter column
pub const DEFAULT_SENTINEL_ITEM: &str = "CONT";

/// Errors raised while reading one file
///
/// Any of these leaves the lot exactly as it was before the call.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("File not found: {path}")]
    NotFound { path: String },

    #[error(
        "Grid is {rows}x{cols}, the {layout} layout needs at least {min_rows} rows and {min_cols} columns"
    )]
    TooSmall {
        layout: String,
        rows: usize,
        cols: usize,
        min_rows: usize,
        min_cols: usize,
    },

    #[error("Missing {marker} at row {row}, column {col}")]
    MissingMarker {
        marker: &'static str,
        row: usize,
        col: usize,
    },

    #[error("Parameter schema of lot '{lot}' does not match this file: {detail}")]
    SchemaMismatch { lot: String, detail: String },

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Wafer(#[from] WaferError),

    #[error(transparent)]
    Lot(#[from] LotError),
}

impl ReadError {
    /// Whether this error concerns the file's content rather than its absence
    pub fn is_format_error(&self) -> bool {
        !matches!(
            self,
            ReadError::NotFound { .. } | ReadError::Grid(GridError::NotFound { .. })
        )
    }
}

/// A parameter column found in the item-name row
#[derive(Debug, Clone)]
struct SchemaColumn {
    col: usize,
    parameter: Parameter,
}

/// Reads export grids of one layout into one lot
#[derive(Debug)]
pub struct GridReader {
    layout: GridLayout,
    sentinel: String,
    namer: UniqueNamer,
    /// Grid column of each schema parameter, in schema order; `None`
    /// until this reader has mapped a file
    columns: Option<Vec<(usize, String)>>,
}

impl GridReader {
    /// Create a reader for one lot
    pub fn new(layout: &GridLayout) -> Self {
        Self {
            layout: layout.clone(),
            sentinel: DEFAULT_SENTINEL_ITEM.to_string(),
            namer: UniqueNamer::new(),
            columns: None,
        }
    }

    /// Use a different sentinel item name
    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }

    /// The layout this reader expects
    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Load a grid file and read it into `lot`
    pub fn read_file(&mut self, lot: &mut Lot, path: &Path) -> Result<(), ReadError> {
        let grid = Grid::from_path(path).map_err(|e| match e {
            GridError::NotFound { path } => ReadError::NotFound { path },
            other => ReadError::Grid(other),
        })?;
        self.read_grid(lot, grid)?;
        info!(
            "Read {} into lot {} ({} wafers)",
            path.display(),
            lot.lot_id,
            lot.wafers().len()
        );
        Ok(())
    }

    /// Read one grid into `lot`
    ///
    /// On the first call for a lot the parameter schema is extracted and
    /// installed; afterwards the established schema is reused unchanged.
    /// Exactly one wafer is appended on success; nothing changes on error.
    pub fn read_grid(&mut self, lot: &mut Lot, mut grid: Grid) -> Result<(), ReadError> {
        self.check_size(&grid)?;
        self.normalize(&mut grid);

        let mut namer = self.namer.clone();
        let (schema, columns) = match &self.columns {
            Some(columns) => (None, columns.clone()),
            None => {
                let found = self.scan_columns(&grid, &mut namer)?;
                let columns = if lot.has_schema() {
                    self.adopt_schema(lot, &found)?
                } else {
                    found
                        .iter()
                        .map(|c| (c.col, c.parameter.id.clone()))
                        .collect()
                };
                (Some(found), columns)
            }
        };

        let wafer = self.extract_wafer(&grid, &columns)?;

        // Everything is parsed; mutate the lot
        if let Some(found) = schema {
            if !lot.has_schema() {
                lot.set_schema(found.into_iter().map(|c| c.parameter).collect())?;
                if lot.product.is_empty() {
                    if let Some(product) =
                        self.layout.product_cell.and_then(|(r, c)| grid.text(r, c))
                    {
                        lot.product = product;
                    }
                }
            }
            self.namer = namer;
        }
        lot.push_wafer(wafer)?;
        self.columns = Some(columns);
        Ok(())
    }

    fn check_size(&self, grid: &Grid) -> Result<(), ReadError> {
        let (rows, cols) = (grid.n_rows(), grid.n_cols());
        let (min_rows, min_cols) = (self.layout.min_rows(), self.layout.min_cols());
        if rows < min_rows || cols < min_cols {
            return Err(ReadError::TooSmall {
                layout: self.layout.kind.to_string(),
                rows,
                cols,
                min_rows,
                min_cols,
            });
        }
        Ok(())
    }

    /// Re-insert the blank separator row some exports drop
    fn normalize(&self, grid: &mut Grid) {
        if let Some(row) = self.layout.separator_row {
            if !grid.row_is_blank(row) {
                debug!("Row {} is not blank; inserting a blank separator row", row);
                grid.insert_blank_row(row);
            }
        }
    }

    /// Extract parameter definitions from the header block
    fn scan_columns(
        &self,
        grid: &Grid,
        namer: &mut UniqueNamer,
    ) -> Result<Vec<SchemaColumn>, ReadError> {
        let layout = &self.layout;
        let mut found = Vec::new();

        for col in layout.param_start_col..grid.n_cols() {
            let Some(name) = grid.text(layout.name_row, col) else {
                continue;
            };
            if name.eq_ignore_ascii_case(&self.sentinel) {
                continue;
            }

            let upper = parse_limit(grid, layout.upper_limit_row, col);
            let lower = parse_limit(grid, layout.lower_limit_row, col);
            let unit = upper
                .as_ref()
                .or(lower.as_ref())
                .map(|q| q.unit.clone())
                .unwrap_or_default();

            let test_conditions = (layout.condition_rows.0..layout.condition_rows.1)
                .map(|row| grid.text(row, col).unwrap_or_default())
                .collect();

            let mut parameter = Parameter::new(namer.name(&name), name, unit.clone())
                .with_limits(
                    lower.map(|q| q.in_unit(&unit)),
                    upper.map(|q| q.in_unit(&unit)),
                );
            parameter.test_conditions = test_conditions;
            found.push(SchemaColumn { col, parameter });
        }

        if found.is_empty() {
            warn!(
                "No parameter columns found in row {} from column {}",
                layout.name_row, layout.param_start_col
            );
        }
        Ok(found)
    }

    /// Map an already-established lot schema onto this grid's columns
    ///
    /// Every parameter read from the first file must be present; derived
    /// parameters are never looked up in files.
    fn adopt_schema(
        &self,
        lot: &Lot,
        found: &[SchemaColumn],
    ) -> Result<Vec<(usize, String)>, ReadError> {
        let ids: Vec<&str> = found.iter().map(|c| c.parameter.id.as_str()).collect();
        lot.read_parameters()
            .iter()
            .map(|parameter| {
                found
                    .iter()
                    .find(|c| c.parameter.id == parameter.id)
                    .map(|c| (c.col, parameter.id.clone()))
                    .ok_or_else(|| ReadError::SchemaMismatch {
                        lot: lot.lot_id.clone(),
                        detail: format!("parameter '{}' not among {:?}", parameter.id, ids),
                    })
            })
            .collect()
    }

    fn extract_wafer(&self, grid: &Grid, columns: &[(usize, String)]) -> Result<Wafer, ReadError> {
        let layout = &self.layout;
        let (wr, wc) = layout.wafer_cell;
        let wafer_id = grid.text(wr, wc).ok_or(ReadError::MissingMarker {
            marker: "wafer id",
            row: wr,
            col: wc,
        })?;
        let source_lot_id = layout.lot_cell.and_then(|(r, c)| grid.text(r, c));

        let index_cols = [layout.seq_col, layout.x_col, layout.y_col, layout.bin_col];
        let end = (layout.data_start_row..grid.n_rows())
            .find(|&row| index_cols.iter().all(|&c| grid.cell(row, c).is_blank()))
            .unwrap_or_else(|| grid.n_rows().max(layout.data_start_row));
        let rows = layout.data_start_row..end;

        let index = |col: usize| -> Vec<Option<i64>> {
            rows.clone().map(|r| grid.integer(r, col)).collect()
        };
        let mut wafer = Wafer::new(
            wafer_id,
            source_lot_id,
            index(layout.seq_col),
            index(layout.bin_col),
            index(layout.x_col),
            index(layout.y_col),
        )?;

        for (col, id) in columns {
            let values: Vec<Option<f64>> = rows.clone().map(|r| grid.number(r, *col)).collect();
            wafer.add_column(id.clone(), values)?;
        }

        debug!(
            "Wafer {}: {} chips, {} parameters",
            wafer.wafer_id,
            wafer.chip_count(),
            columns.len()
        );
        Ok(wafer)
    }
}

/// Parse a spec-limit cell: a plain number, or text like `1.5mV`
fn parse_limit(grid: &Grid, row: usize, col: usize) -> Option<Quantity> {
    let cell = grid.cell(row, col);
    if let Some(value) = cell.as_f64() {
        return Some(Quantity {
            value,
            unit: String::new(),
        });
    }
    cell.as_text().and_then(|text| units::parse_quantity(&text))
}
