//! Scope limits - per-product spec-limit overrides
//!
//! A scope grid holds one block per product:
//!
//! ```text
//! row r-1:  <label>   VTH     IDS     BV
//! row r  :  PX1
//! row r+1:  <label>   0.3     1mA
//! row r+2:  <label>   0.7             40
//! ```
//!
//! The product row is found by its first cell; names sit above it, lower
//! limits one row below and upper limits two rows below.

use std::path::Path;

use tracing::{debug, info};

use crate::core::grid::{Cell, Grid, GridError};
use crate::core::units::{self, Quantity};
use crate::entities::Lot;

/// Bounds of one parameter, each with the unit it was written in
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeBound {
    pub lower: Option<Quantity>,
    pub upper: Option<Quantity>,
}

impl ScopeBound {
    /// Lower bound value as written
    pub fn lower_value(&self) -> Option<f64> {
        self.lower.as_ref().map(|q| q.value)
    }

    /// Upper bound value as written
    pub fn upper_value(&self) -> Option<f64> {
        self.upper.as_ref().map(|q| q.value)
    }
}

/// Limits found for one product, in column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeLimits {
    pub product: String,
    entries: Vec<(String, ScopeBound)>,
}

impl ScopeLimits {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ScopeBound> {
        self.entries.iter().find(|(k, _)| k == id).map(|(_, b)| b)
    }

    pub fn entries(&self) -> &[(String, ScopeBound)] {
        &self.entries
    }

    /// Overwrite the limits of matching lot parameters
    ///
    /// Bounds are converted into each parameter's unit; a side missing from
    /// the scope grid leaves that side of the parameter unchanged. Returns
    /// the number of parameters updated.
    pub fn apply_to(&self, lot: &mut Lot) -> usize {
        let mut updated = 0;
        for parameter in lot.parameters_mut() {
            let Some(bound) = self.get(&parameter.id) else {
                continue;
            };
            if let Some(lower) = &bound.lower {
                parameter.lower_limit = Some(lower.in_unit(&parameter.unit));
            }
            if let Some(upper) = &bound.upper {
                parameter.upper_limit = Some(upper.in_unit(&parameter.unit));
            }
            updated += 1;
        }
        debug!("Scope limits of {} applied to {} parameters", self.product, updated);
        updated
    }
}

/// Load a scope file and look up `product`
pub fn load_scope(path: &Path, product: &str) -> Result<Option<ScopeLimits>, GridError> {
    Ok(find_scope(&Grid::from_path(path)?, product))
}

/// Look up `product` in a scope grid
///
/// `None` means the product has no block; `Some` with no entries means the
/// block exists but carries no usable bound.
pub fn find_scope(grid: &Grid, product: &str) -> Option<ScopeLimits> {
    let target = normalize(product);
    let Some(row) = (0..grid.n_rows())
        .find(|&r| grid.text(r, 0).is_some_and(|t| normalize(&t) == target))
    else {
        info!("Product '{}' not found in scope grid", product);
        return None;
    };

    let mut entries = Vec::new();
    for col in 1..grid.n_cols() {
        let Some(id) = row.checked_sub(1).and_then(|r| grid.text(r, col)) else {
            continue;
        };
        let bound = ScopeBound {
            lower: bound_cell(grid.cell(row + 1, col)),
            upper: bound_cell(grid.cell(row + 2, col)),
        };
        if bound.lower.is_none() && bound.upper.is_none() {
            continue;
        }
        entries.push((id, bound));
    }

    debug!(
        "Scope for '{}' at row {}: {} entries",
        product,
        row,
        entries.len()
    );
    Some(ScopeLimits {
        product: product.trim().to_string(),
        entries,
    })
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn bound_cell(cell: &Cell) -> Option<Quantity> {
    if let Some(value) = cell.as_f64() {
        return Some(Quantity {
            value,
            unit: String::new(),
        });
    }
    cell.as_text().and_then(|t| units::parse_exact_quantity(&t))
}
