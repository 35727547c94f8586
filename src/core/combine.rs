//! Lot combiner - flattens every wafer of a lot into one table
//!
//! Column order is the identity prefix followed by the lot's parameter ids
//! in declaration order. Wafers lacking a parameter column (a derived
//! parameter whose inputs were absent, say) get missing values there.

use tracing::debug;

use crate::entities::{Column, DataTable, Lot, Value};

pub const LOT_ID: &str = "LotID";
pub const WAFER_ID: &str = "WaferID";
pub const SEQ: &str = "Seq";
pub const BIN: &str = "Bin";
pub const X: &str = "X";
pub const Y: &str = "Y";
pub const CONT: &str = "CONT";

/// Identity columns that precede the parameter columns
pub const IDENTITY_COLUMNS: [&str; 7] = [LOT_ID, WAFER_ID, SEQ, BIN, X, Y, CONT];

/// Build the combined table of `lot` without storing it
///
/// The row count always equals the lot's total chip count; a lot without
/// wafers yields a table with the full header and no rows.
pub fn combine(lot: &Lot) -> DataTable {
    let parameter_ids: Vec<&str> = lot.parameters().iter().map(|p| p.id.as_str()).collect();
    let names: Vec<&str> = IDENTITY_COLUMNS
        .iter()
        .copied()
        .chain(parameter_ids.iter().copied())
        .collect();

    let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(lot.total_chips()); names.len()];
    for wafer in lot.wafers() {
        let n = wafer.chip_count();
        let lot_id = wafer.source_lot_id.as_deref().unwrap_or(&lot.lot_id);

        columns[0].extend(std::iter::repeat_n(Value::from(lot_id), n));
        columns[1].extend(std::iter::repeat_n(Value::from(wafer.wafer_id.as_str()), n));
        columns[2].extend(wafer.seq().iter().map(|v| Value::from(*v)));
        columns[3].extend(wafer.bin().iter().map(|v| Value::from(*v)));
        columns[4].extend(wafer.x().iter().map(|v| Value::from(*v)));
        columns[5].extend(wafer.y().iter().map(|v| Value::from(*v)));
        columns[6].extend(std::iter::repeat_n(Value::Int(1), n));

        for (offset, id) in parameter_ids.iter().enumerate() {
            let target = &mut columns[IDENTITY_COLUMNS.len() + offset];
            match wafer.chip_data().get(id) {
                Some(values) => target.extend(values.iter().map(|v| Value::from(*v))),
                None => target.extend(std::iter::repeat_n(Value::Missing, n)),
            }
        }
    }

    let table = DataTable::from_parts(
        names
            .into_iter()
            .zip(columns)
            .map(|(name, values)| Column {
                name: name.to_string(),
                values,
            })
            .collect(),
    );

    debug!(
        "Combined lot {}: {} rows x {} columns",
        lot.lot_id,
        table.n_rows(),
        table.n_cols()
    );
    table
}

/// Build the combined table and store it on the lot
pub fn combine_lot(lot: &mut Lot) -> &DataTable {
    let table = combine(lot);
    lot.set_combined_data(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Parameter, Wafer};

    fn sample_lot() -> Lot {
        let mut lot = Lot::new("L001", "PX1");
        lot.set_schema(vec![
            Parameter::new("VTH", "VTH", "V"),
            Parameter::new("IDS", "IDS", "mA"),
        ])
        .unwrap();
        let w1 = Wafer::from_bins("W01", &[1, 3])
            .with_column("VTH", vec![Some(0.5), Some(0.6)])
            .unwrap()
            .with_column("IDS", vec![Some(1.0), None])
            .unwrap();
        let mut w2 = Wafer::from_bins("W02", &[1, 1, 4])
            .with_column("VTH", vec![Some(0.7), None, Some(0.9)])
            .unwrap();
        w2.source_lot_id = Some("L001A".to_string());
        lot.push_wafer(w1).unwrap();
        lot.push_wafer(w2).unwrap();
        lot
    }

    #[test]
    fn test_column_order() {
        let table = combine(&sample_lot());
        let names: Vec<_> = table.column_names().collect();
        assert_eq!(
            names,
            vec!["LotID", "WaferID", "Seq", "Bin", "X", "Y", "CONT", "VTH", "IDS"]
        );
    }

    #[test]
    fn test_row_count_matches_chip_total() {
        let lot = sample_lot();
        let table = combine(&lot);
        assert_eq!(table.n_rows(), lot.total_chips());
        assert_eq!(table.n_rows(), 5);
    }

    #[test]
    fn test_identity_values() {
        let table = combine(&sample_lot());
        assert_eq!(table.get(0, LOT_ID), Some(&Value::from("L001")));
        assert_eq!(table.get(2, LOT_ID), Some(&Value::from("L001A")));
        assert_eq!(table.get(4, WAFER_ID), Some(&Value::from("W02")));
        assert_eq!(table.get(4, BIN), Some(&Value::Int(4)));
        assert_eq!(table.get(3, CONT), Some(&Value::Int(1)));
        assert_eq!(table.get(0, X), Some(&Value::Missing));
    }

    #[test]
    fn test_missing_wafer_column_filled_with_missing() {
        let table = combine(&sample_lot());
        assert_eq!(table.get(1, "IDS"), Some(&Value::Missing));
        assert_eq!(table.get(2, "IDS"), Some(&Value::Missing));
        assert_eq!(table.get(0, "IDS"), Some(&Value::Float(1.0)));
    }

    #[test]
    fn test_empty_lot_gives_empty_table() {
        let lot = Lot::new("L001", "PX1");
        let table = combine(&lot);
        assert_eq!(table.n_rows(), 0);
        assert_eq!(table.n_cols(), IDENTITY_COLUMNS.len());
    }

    #[test]
    fn test_combine_lot_stores_and_mutation_invalidates() {
        let mut lot = sample_lot();
        assert_eq!(combine_lot(&mut lot).n_rows(), 5);
        assert!(lot.combined_data().is_some());

        lot.push_wafer(Wafer::from_bins("W03", &[1])).unwrap();
        assert!(lot.combined_data().is_none());
        assert_eq!(combine_lot(&mut lot).n_rows(), 6);
    }
}
