//! Positional cell grids
//!
//! Every supported export is a spreadsheet-like block of cells addressed by
//! (row, column). Rows may be ragged; reading past the end of a row yields
//! an empty cell rather than an error.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single scalar cell
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Empty,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

static EMPTY: Cell = Cell::Empty;

impl Cell {
    /// Cell for raw text as read from a file
    ///
    /// Text stays text: `"01"` remains `"01"`. Numeric accessors parse it on
    /// demand.
    pub fn from_raw(raw: &str) -> Self {
        if raw.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(raw.to_string())
        }
    }

    /// Empty, or text made only of whitespace
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric value, converting numeric text when possible
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) if f.is_finite() => Some(*f),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    /// Integer value; floats are accepted only when they are whole numbers
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(i) => Some(*i),
            Cell::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Cell::Text(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0 && f.is_finite())
                        .map(|f| f as i64)
                })
            }
            _ => None,
        }
    }

    /// Display text of the cell, `None` for blanks
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) if s.trim().is_empty() => None,
            Cell::Text(s) => Some(s.trim().to_string()),
            Cell::Int(i) => Some(i.to_string()),
            Cell::Float(f) => Some(f.to_string()),
            Cell::Bool(b) => Some(b.to_string()),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::Int(i) => Cell::Int(*i),
            Data::Float(f) => Cell::Float(*f),
            Data::Bool(b) => Cell::Bool(*b),
            Data::String(s) => Cell::from_raw(s),
            other => Cell::Text(other.to_string()),
        }
    }
}

/// Errors raised while loading a grid from disk
#[derive(Debug, Error)]
pub enum GridError {
    #[error("File not found: {path}")]
    NotFound { path: String },

    #[error("Unsupported grid file type: {path}")]
    Unsupported { path: String },

    #[error("Workbook '{path}' has no worksheets")]
    EmptyWorkbook { path: String },

    #[error("Failed to read workbook '{path}': {message}")]
    Workbook { path: String, message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A ragged, row-major block of cells
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
}

impl Grid {
    /// Create a grid from rows of cells
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Create a grid from raw text cells
    pub fn from_text_rows<R, S>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(|s| Cell::from_raw(s.as_ref())).collect())
                .collect(),
        }
    }

    /// Load the first sheet of a grid file
    ///
    /// `.csv`/`.txt` files are read as headerless CSV; `.xls`, `.xlsx`,
    /// `.xlsm`, `.xlsb` and `.ods` files are read with calamine.
    pub fn from_path(path: &Path) -> Result<Self, GridError> {
        if !path.exists() {
            return Err(GridError::NotFound {
                path: path.display().to_string(),
            });
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" | "txt" => Self::from_csv_path(path),
            "xls" | "xlsx" | "xlsm" | "xlsb" | "ods" => Self::from_workbook_path(path),
            _ => Err(GridError::Unsupported {
                path: path.display().to_string(),
            }),
        }
    }

    /// Read a headerless, possibly ragged CSV file
    pub fn from_csv_path(path: &Path) -> Result<Self, GridError> {
        let bytes = std::fs::read(path)?;
        Self::from_csv_str(&String::from_utf8_lossy(&bytes))
    }

    /// Read headerless CSV text
    ///
    /// The csv reader skips empty lines; they are restored as empty rows so
    /// that row indexes match the line numbers of the text.
    pub fn from_csv_str(text: &str) -> Result<Self, GridError> {
        let bytes = text.as_bytes();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut rows: Vec<Vec<Cell>> = Vec::new();
        let mut record = csv::StringRecord::new();
        loop {
            let start = reader.position().byte() as usize;
            if !reader.read_record(&mut record)? {
                break;
            }
            let skipped = blank_lines_at(bytes, start);
            rows.extend(std::iter::repeat_n(Vec::new(), skipped));
            rows.push(record.iter().map(Cell::from_raw).collect());
        }
        Ok(Self { rows })
    }

    fn from_workbook_path(path: &Path) -> Result<Self, GridError> {
        let display = path.display().to_string();
        let mut workbook = open_workbook_auto(path).map_err(|e| GridError::Workbook {
            path: display.clone(),
            message: e.to_string(),
        })?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| GridError::EmptyWorkbook {
                path: display.clone(),
            })?
            .map_err(|e| GridError::Workbook {
                path: display.clone(),
                message: e.to_string(),
            })?;

        // calamine ranges start at the first used cell; re-anchor at A1
        let (row_offset, col_offset) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));

        let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); row_offset];
        for row in range.rows() {
            let mut cells = vec![Cell::Empty; col_offset];
            cells.extend(row.iter().map(Cell::from));
            rows.push(cells);
        }
        Ok(Self { rows })
    }

    /// Number of rows
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Width of the widest row
    pub fn n_cols(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Cell at (row, col), empty when out of range
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    /// Trimmed text at (row, col)
    pub fn text(&self, row: usize, col: usize) -> Option<String> {
        self.cell(row, col).as_text()
    }

    /// Numeric value at (row, col)
    pub fn number(&self, row: usize, col: usize) -> Option<f64> {
        self.cell(row, col).as_f64()
    }

    /// Integer value at (row, col)
    pub fn integer(&self, row: usize, col: usize) -> Option<i64> {
        self.cell(row, col).as_i64()
    }

    /// Whether every cell of `row` is blank (missing rows count as blank)
    pub fn row_is_blank(&self, row: usize) -> bool {
        self.rows
            .get(row)
            .map(|r| r.iter().all(Cell::is_blank))
            .unwrap_or(true)
    }

    /// Insert an empty row before `index` (appends when past the end)
    pub fn insert_blank_row(&mut self, index: usize) {
        let at = index.min(self.rows.len());
        self.rows.insert(at, Vec::new());
    }

    /// Iterate over rows
    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(Vec::as_slice)
    }
}

/// Number of empty lines starting at byte `start`
///
/// With CRLF endings the reader stops after `\r`, so a `\n` right after a
/// `\r` still belongs to the previous record.
fn blank_lines_at(bytes: &[u8], start: usize) -> usize {
    let mut rest = bytes.get(start..).unwrap_or_default();
    if start > 0 && bytes[start - 1] == b'\r' && rest.first() == Some(&b'\n') {
        rest = &rest[1..];
    }
    rest.iter()
        .take_while(|&&b| b == b'\n' || b == b'\r')
        .filter(|&&b| b == b'\n')
        .count()
}
