//! Fixed positions of the supported grid exports
//!
//! Each export format places its header block, spec limits, test conditions
//! and chip data at constant row/column offsets. A `GridLayout` records those
//! offsets; the reader never searches for them.

use serde::{Deserialize, Serialize};

/// A (row, column) cell address
pub type CellPos = (usize, usize);

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    /// DCP export: six metadata rows, test conditions in rows 9 to 13
    #[default]
    Dcp,
    /// Compact export: no test conditions, bin right after sequence
    Compact,
    /// Extended export: site column, LSL above USL, seven condition rows
    Extended,
}

impl LayoutKind {
    /// The fixed positions of this format
    pub fn layout(self) -> &'static GridLayout {
        match self {
            LayoutKind::Dcp => &GridLayout::DCP,
            LayoutKind::Compact => &GridLayout::COMPACT,
            LayoutKind::Extended => &GridLayout::EXTENDED,
        }
    }
}

impl std::fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayoutKind::Dcp => write!(f, "dcp"),
            LayoutKind::Compact => write!(f, "compact"),
            LayoutKind::Extended => write!(f, "extended"),
        }
    }
}

/// Row and column constants of one export format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridLayout {
    pub kind: LayoutKind,

    /// First column holding a parameter
    pub param_start_col: usize,

    /// Row with the item (parameter) names
    pub name_row: usize,
    pub upper_limit_row: usize,
    pub lower_limit_row: usize,

    /// Test-condition rows, half-open `[start, end)`
    pub condition_rows: (usize, usize),

    /// Row expected to be blank right above the data block
    pub separator_row: Option<usize>,

    /// First chip row
    pub data_start_row: usize,

    pub seq_col: usize,
    pub x_col: usize,
    pub y_col: usize,
    pub bin_col: usize,

    pub product_cell: Option<CellPos>,
    pub lot_cell: Option<CellPos>,
    pub wafer_cell: CellPos,
}

impl GridLayout {
    pub const DCP: GridLayout = GridLayout {
        kind: LayoutKind::Dcp,
        param_start_col: 4,
        name_row: 6,
        upper_limit_row: 7,
        lower_limit_row: 8,
        condition_rows: (9, 14),
        separator_row: Some(14),
        data_start_row: 15,
        seq_col: 0,
        x_col: 1,
        y_col: 2,
        bin_col: 3,
        product_cell: Some((1, 1)),
        lot_cell: Some((2, 1)),
        wafer_cell: (3, 1),
    };

    pub const COMPACT: GridLayout = GridLayout {
        kind: LayoutKind::Compact,
        param_start_col: 4,
        name_row: 3,
        upper_limit_row: 4,
        lower_limit_row: 5,
        condition_rows: (6, 6),
        separator_row: Some(6),
        data_start_row: 7,
        seq_col: 0,
        x_col: 2,
        y_col: 3,
        bin_col: 1,
        product_cell: None,
        lot_cell: Some((0, 1)),
        wafer_cell: (1, 1),
    };

    pub const EXTENDED: GridLayout = GridLayout {
        kind: LayoutKind::Extended,
        param_start_col: 5,
        name_row: 8,
        upper_limit_row: 10,
        lower_limit_row: 9,
        condition_rows: (11, 18),
        separator_row: Some(18),
        data_start_row: 19,
        seq_col: 0,
        x_col: 1,
        y_col: 2,
        bin_col: 3,
        product_cell: Some((2, 1)),
        lot_cell: Some((4, 1)),
        wafer_cell: (5, 1),
    };

    /// Rows needed before the data block can be located
    pub fn min_rows(&self) -> usize {
        let header_end = [
            self.name_row + 1,
            self.upper_limit_row + 1,
            self.lower_limit_row + 1,
            self.condition_rows.1,
            self.wafer_cell.0 + 1,
        ];
        header_end.into_iter().max().unwrap_or(0)
    }

    /// Columns needed for the chip index block
    pub fn min_cols(&self) -> usize {
        [self.seq_col, self.x_col, self.y_col, self.bin_col, self.wafer_cell.1]
            .into_iter()
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Number of test-condition rows
    pub fn condition_count(&self) -> usize {
        self.condition_rows.1.saturating_sub(self.condition_rows.0)
    }
}
