//! Shared helper functions for CLI commands
//!
//! Input discovery and lot loading used by every command.

use std::path::{Path, PathBuf};

use console::style;
use miette::{miette, IntoDiagnostic, Result};
use tracing::warn;
use walkdir::WalkDir;

use crate::cli::args::{EnrichArgs, InputArgs};
use crate::core::{CalcSetup, Config, GridReader, LayoutKind};
use crate::entities::Lot;

/// File extensions picked up when walking a directory
const GRID_EXTENSIONS: [&str; 7] = ["csv", "txt", "xls", "xlsx", "xlsm", "xlsb", "ods"];

fn is_grid_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| GRID_EXTENSIONS.iter().any(|g| e.eq_ignore_ascii_case(g)))
}

/// Expand files and directories into a list of grid files
///
/// Files are taken as given; directories are walked and their grid files
/// added in path order.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_grid_file(e.path()))
                .map(|e| e.into_path())
                .collect();
            found.sort();
            files.extend(found);
        } else if path.exists() {
            files.push(path.clone());
        } else {
            return Err(miette!("Input not found: {}", path.display()));
        }
    }
    if files.is_empty() {
        return Err(miette!("No input files found"));
    }
    Ok(files)
}

/// Read all inputs into one lot
///
/// A file with a format problem is reported and skipped; the lot keeps the
/// wafers read so far. A lot without any wafer is an error.
pub fn load_lot(input: &InputArgs, config: &Config) -> Result<Lot> {
    let files = collect_inputs(&input.inputs)?;
    let layout: LayoutKind = input.layout.map(Into::into).unwrap_or(config.layout);

    let mut lot = Lot::new(
        input.lot.clone().unwrap_or_default(),
        input.product.clone().unwrap_or_default(),
    );
    lot.pass_bin = config.pass_bin;

    let mut reader = GridReader::new(layout.layout()).with_sentinel(&config.sentinel_item);
    for file in &files {
        if let Err(e) = reader.read_file(&mut lot, file) {
            if !e.is_format_error() {
                return Err(miette!("{}: {}", file.display(), e));
            }
            warn!("Skipping {}: {}", file.display(), e);
            eprintln!(
                "{} Skipped {}: {}",
                style("!").yellow(),
                file.display(),
                e
            );
        }
    }

    if lot.wafers().is_empty() {
        return Err(miette!("No wafer could be read from {} file(s)", files.len()));
    }
    if lot.lot_id.is_empty() {
        lot.lot_id = lot
            .wafers()
            .iter()
            .find_map(|w| w.source_lot_id.clone())
            .unwrap_or_else(|| "LOT".to_string());
    }
    Ok(lot)
}

/// Apply scope limits, then calculated parameters
pub fn enrich_lot(lot: &mut Lot, extras: &EnrichArgs) -> Result<()> {
    if let Some(path) = &extras.scope {
        match crate::core::load_scope(path, &lot.product).into_diagnostic()? {
            Some(scope) => {
                scope.apply_to(lot);
            }
            None => eprintln!(
                "{} Product '{}' not found in {}",
                style("!").yellow(),
                lot.product,
                path.display()
            ),
        }
    }

    if let Some(path) = &extras.setup {
        let setup = CalcSetup::from_path(path).into_diagnostic()?;
        let report = setup.apply_to(lot);
        for (id, reason) in &report.skipped {
            eprintln!(
                "{} Calculated parameter {} skipped: {}",
                style("!").yellow(),
                id,
                reason
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_collect_inputs_walks_directories_in_order() {
        let tmp = TempDir::new().unwrap();
        let sub = tmp.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(tmp.path().join("b.csv"), "").unwrap();
        fs::write(tmp.path().join("a.csv"), "").unwrap();
        fs::write(tmp.path().join("notes.md"), "").unwrap();
        fs::write(sub.join("c.xlsx"), "").unwrap();

        let files = collect_inputs(&[tmp.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv", "c.xlsx"]);
    }

    #[test]
    fn test_collect_inputs_missing_path() {
        let tmp = TempDir::new().unwrap();
        assert!(collect_inputs(&[tmp.path().join("missing.csv")]).is_err());
        assert!(collect_inputs(&[tmp.path().to_path_buf()]).is_err());
    }
}
