//! Yield and parametric statistics
//!
//! Yield is computed per (lot, wafer) group in first-seen order, followed by
//! an `ALL` summary row. The summary sums the counts but averages the
//! per-wafer yields, so every wafer weighs the same regardless of its die
//! count.
//!
//! Parametric statistics follow the usual definitions:
//! - Cp = (USL - LSL) / (6σ)
//! - Cpk = min(USL - μ, μ - LSL) / (3σ)
//!
//! with σ the sample standard deviation. A figure that is undefined (σ = 0,
//! a missing limit, fewer than two values) is `None`.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::combine::{BIN, LOT_ID, WAFER_ID};
use crate::entities::{Column, DataTable, Lot, Parameter, ParameterStats, Value, Wafer};

/// Bins counted individually in the yield report
pub const DEFAULT_TRACKED_BINS: [i64; 6] = [3, 4, 6, 7, 8, 9];

/// Label of the summary row
pub const SUMMARY_LABEL: &str = "ALL";

/// Format a yield percentage the way reports show it
pub fn format_yield(percent: f64) -> String {
    format!("{:.2}%", percent)
}

/// Yield of one wafer, or of the whole lot for the summary row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YieldRow {
    pub lot_id: String,
    pub wafer_id: String,
    pub total: usize,
    pub pass: usize,
    /// Count per tracked bin, in tracked-bin order
    pub bins: Vec<usize>,
    /// Numeric yield in percent
    pub yield_percent: f64,
}

impl YieldRow {
    /// Yield as shown in reports, e.g. `60.00%`
    pub fn yield_text(&self) -> String {
        format_yield(self.yield_percent)
    }
}

/// Per-wafer yield rows plus the lot summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YieldReport {
    pub tracked_bins: Vec<i64>,
    pub wafers: Vec<YieldRow>,
    pub summary: YieldRow,
}

impl YieldReport {
    /// Wafer rows followed by the summary row
    pub fn rows(&self) -> impl Iterator<Item = &YieldRow> {
        self.wafers.iter().chain(std::iter::once(&self.summary))
    }

    /// The report as a table:
    /// `Lot_ID, Wafer_ID, Yield, Total, Pass, Bin3, Bin4, ...`
    pub fn to_table(&self) -> DataTable {
        let mut names = vec![
            "Lot_ID".to_string(),
            "Wafer_ID".to_string(),
            "Yield".to_string(),
            "Total".to_string(),
            "Pass".to_string(),
        ];
        names.extend(self.tracked_bins.iter().map(|b| format!("Bin{}", b)));

        let rows = self.rows().map(|row| {
            let mut values = vec![
                Value::from(row.lot_id.as_str()),
                Value::from(row.wafer_id.as_str()),
                Value::from(row.yield_text()),
                Value::Int(row.total as i64),
                Value::Int(row.pass as i64),
            ];
            values.extend(row.bins.iter().map(|&n| Value::Int(n as i64)));
            values
        });
        table_from_rows(names, rows)
    }
}

#[derive(Debug)]
struct Group {
    lot_id: String,
    wafer_id: String,
    total: usize,
    pass: usize,
    bins: Vec<usize>,
}

/// Computes yield reports
#[derive(Debug, Clone, PartialEq)]
pub struct YieldAnalyzer {
    pub pass_bin: i64,
    pub tracked_bins: Vec<i64>,
}

impl Default for YieldAnalyzer {
    fn default() -> Self {
        Self {
            pass_bin: crate::entities::DEFAULT_PASS_BIN,
            tracked_bins: DEFAULT_TRACKED_BINS.to_vec(),
        }
    }
}

impl YieldAnalyzer {
    pub fn new(pass_bin: i64, tracked_bins: Vec<i64>) -> Self {
        Self {
            pass_bin,
            tracked_bins,
        }
    }

    /// Yield report of a combined table
    ///
    /// Needs `LotID`, `WaferID` and `Bin` columns and at least one row;
    /// otherwise the reason is logged and `None` returned.
    pub fn analyze_table(&self, table: &DataTable) -> Option<YieldReport> {
        let (Some(lots), Some(wafers), Some(bins)) = (
            table.column(LOT_ID),
            table.column(WAFER_ID),
            table.column(BIN),
        ) else {
            let missing: Vec<&str> = [LOT_ID, WAFER_ID, BIN]
                .into_iter()
                .filter(|c| table.column(c).is_none())
                .collect();
            warn!("Yield analysis needs columns {:?}", missing);
            return None;
        };
        if table.is_empty() {
            warn!("Yield analysis skipped: table has no rows");
            return None;
        }

        let mut groups: Vec<Group> = Vec::new();
        for ((lot, wafer), bin) in lots.values.iter().zip(&wafers.values).zip(&bins.values) {
            let (lot, wafer) = (lot.to_string(), wafer.to_string());
            let index = match groups
                .iter()
                .position(|g| g.lot_id == lot && g.wafer_id == wafer)
            {
                Some(i) => i,
                None => {
                    groups.push(self.group(lot, wafer));
                    groups.len() - 1
                }
            };
            self.count(&mut groups[index], bin.as_i64());
        }
        Some(self.report(groups))
    }

    /// Yield report straight from a lot's wafers, using the lot's pass bin
    pub fn analyze_lot(&self, lot: &Lot) -> Option<YieldReport> {
        if lot.wafers().is_empty() {
            warn!("Yield analysis skipped: lot {} has no wafers", lot.lot_id);
            return None;
        }
        let analyzer = Self {
            pass_bin: lot.pass_bin,
            tracked_bins: self.tracked_bins.clone(),
        };

        // Wafers sharing (lot, wafer) ids merge into one group
        let mut groups: Vec<Group> = Vec::new();
        for wafer in lot.wafers() {
            let lot_id = wafer.source_lot_id.as_deref().unwrap_or(&lot.lot_id);
            let index = match groups
                .iter()
                .position(|g| g.lot_id == lot_id && g.wafer_id == wafer.wafer_id)
            {
                Some(i) => i,
                None => {
                    groups.push(analyzer.group(lot_id.to_string(), wafer.wafer_id.clone()));
                    groups.len() - 1
                }
            };
            for bin in wafer.bin() {
                analyzer.count(&mut groups[index], *bin);
            }
        }
        Some(analyzer.report(groups))
    }

    fn group(&self, lot_id: String, wafer_id: String) -> Group {
        Group {
            lot_id,
            wafer_id,
            total: 0,
            pass: 0,
            bins: vec![0; self.tracked_bins.len()],
        }
    }

    fn count(&self, group: &mut Group, bin: Option<i64>) {
        group.total += 1;
        let Some(bin) = bin else { return };
        if bin == self.pass_bin {
            group.pass += 1;
        }
        if let Some(i) = self.tracked_bins.iter().position(|&b| b == bin) {
            group.bins[i] += 1;
        }
    }

    fn report(&self, groups: Vec<Group>) -> YieldReport {
        let wafers: Vec<YieldRow> = groups
            .into_iter()
            .map(|g| YieldRow {
                yield_percent: percent(g.pass, g.total),
                lot_id: g.lot_id,
                wafer_id: g.wafer_id,
                total: g.total,
                pass: g.pass,
                bins: g.bins,
            })
            .collect();

        let mut bins = vec![0; self.tracked_bins.len()];
        for row in &wafers {
            for (sum, n) in bins.iter_mut().zip(&row.bins) {
                *sum += n;
            }
        }
        let mean_yield = if wafers.is_empty() {
            0.0
        } else {
            wafers.iter().map(|w| w.yield_percent).sum::<f64>() / wafers.len() as f64
        };
        let summary = YieldRow {
            lot_id: SUMMARY_LABEL.to_string(),
            wafer_id: SUMMARY_LABEL.to_string(),
            total: wafers.iter().map(|w| w.total).sum(),
            pass: wafers.iter().map(|w| w.pass).sum(),
            bins,
            yield_percent: mean_yield,
        };

        debug!(
            "Yield: {} wafers, {} / {} pass, mean {}",
            wafers.len(),
            summary.pass,
            summary.total,
            summary.yield_text()
        );
        YieldReport {
            tracked_bins: self.tracked_bins.clone(),
            wafers,
            summary,
        }
    }
}

fn percent(pass: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (pass as f64 * 100.0) / total as f64
    }
}

// =========================================================================
// Parametric statistics
// =========================================================================

/// Statistics of `values` against the limits of `parameter`
pub fn compute_stats(values: &[f64], parameter: &Parameter) -> ParameterStats {
    let count = values.len();
    if count == 0 {
        return ParameterStats::default();
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = count as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std_dev = (count > 1).then(|| {
        let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt()
    });
    let median = if count % 2 == 1 {
        sorted[count / 2]
    } else {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    };

    let (cp, cpk) = match (parameter.lower_limit, parameter.upper_limit, std_dev) {
        (Some(lsl), Some(usl), Some(sigma)) if sigma > 0.0 => {
            let cp = (usl - lsl) / (6.0 * sigma);
            let cpk = (usl - mean).min(mean - lsl) / (3.0 * sigma);
            (Some(cp), Some(cpk))
        }
        _ => (None, None),
    };

    let in_spec = values.iter().filter(|&&v| parameter.in_spec(v)).count();

    ParameterStats {
        count,
        mean: Some(mean),
        std_dev,
        median: Some(median),
        min: sorted.first().copied(),
        max: sorted.last().copied(),
        cp,
        cpk,
        yield_percent: Some(percent(in_spec, count)),
    }
}

fn column_values<'a>(wafers: impl IntoIterator<Item = &'a Wafer>, id: &str) -> Vec<f64> {
    wafers
        .into_iter()
        .filter_map(|w| w.chip_data().get(id))
        .flat_map(|col| col.iter().flatten().copied())
        .collect()
}

/// Statistics of every parameter over all chips of the lot, in schema order
pub fn parameter_stats(lot: &Lot) -> Vec<(String, ParameterStats)> {
    lot.parameters()
        .iter()
        .map(|p| (p.id.clone(), compute_stats(&column_values(lot.wafers(), &p.id), p)))
        .collect()
}

/// Statistics of one wafer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaferStats {
    pub wafer_id: String,
    pub parameters: Vec<(String, ParameterStats)>,
}

/// Statistics of every parameter per wafer, in wafer order
pub fn wafer_parameter_stats(lot: &Lot) -> Vec<WaferStats> {
    lot.wafers()
        .iter()
        .map(|wafer| WaferStats {
            wafer_id: wafer.wafer_id.clone(),
            parameters: lot
                .parameters()
                .iter()
                .map(|p| {
                    (
                        p.id.clone(),
                        compute_stats(&column_values([wafer], &p.id), p),
                    )
                })
                .collect(),
        })
        .collect()
}

/// Compute lot-wide statistics and store them on the lot's parameters
pub fn apply_parameter_stats(lot: &mut Lot) {
    let stats = parameter_stats(lot);
    for (parameter, (_, s)) in lot.parameters_mut().iter_mut().zip(stats) {
        parameter.set_stats(Some(s));
    }
}

/// Count of every distinct bin per wafer, bins ascending
pub fn bin_counts(lot: &Lot) -> Vec<(String, BTreeMap<i64, usize>)> {
    lot.wafers()
        .iter()
        .map(|wafer| {
            let mut counts = BTreeMap::new();
            for bin in wafer.bin().iter().flatten() {
                *counts.entry(*bin).or_insert(0) += 1;
            }
            (wafer.wafer_id.clone(), counts)
        })
        .collect()
}

const STATS_COLUMNS: [&str; 13] = [
    "Parameter",
    "Unit",
    "LSL",
    "USL",
    "Count",
    "Mean",
    "StdDev",
    "Median",
    "Min",
    "Max",
    "Cp",
    "Cpk",
    "Yield",
];

fn stats_row(parameter: &Parameter, stats: &ParameterStats) -> Vec<Value> {
    vec![
        Value::from(parameter.id.as_str()),
        Value::from(parameter.unit.as_str()),
        Value::from(parameter.lower_limit),
        Value::from(parameter.upper_limit),
        Value::Int(stats.count as i64),
        Value::from(stats.mean),
        Value::from(stats.std_dev),
        Value::from(stats.median),
        Value::from(stats.min),
        Value::from(stats.max),
        Value::from(stats.cp),
        Value::from(stats.cpk),
        stats
            .yield_percent
            .map(|y| Value::from(format_yield(y)))
            .unwrap_or_default(),
    ]
}

/// Statistics as a table; with `by_wafer` one block per wafer
pub fn stats_table(lot: &Lot, by_wafer: bool) -> DataTable {
    let mut rows: Vec<Vec<Value>> = Vec::new();
    if by_wafer {
        for ws in wafer_parameter_stats(lot) {
            for (parameter, (_, stats)) in lot.parameters().iter().zip(&ws.parameters) {
                let mut row = vec![Value::from(ws.wafer_id.as_str())];
                row.extend(stats_row(parameter, stats));
                rows.push(row);
            }
        }
    } else {
        for (parameter, (_, stats)) in lot.parameters().iter().zip(parameter_stats(lot)) {
            rows.push(stats_row(parameter, &stats));
        }
    }

    let names = by_wafer
        .then_some(WAFER_ID)
        .into_iter()
        .chain(STATS_COLUMNS);
    table_from_rows(names, rows)
}

/// Transpose rows of one width per header into columns
fn table_from_rows<S: Into<String>>(
    names: impl IntoIterator<Item = S>,
    rows: impl IntoIterator<Item = Vec<Value>>,
) -> DataTable {
    let mut columns: Vec<Column> = names
        .into_iter()
        .map(|name| Column {
            name: name.into(),
            values: Vec::new(),
        })
        .collect();
    for row in rows {
        for (column, value) in columns.iter_mut().zip(row) {
            column.values.push(value);
        }
    }
    DataTable::from_parts(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::combine::combine;

    const SCENARIO_A: [i64; 10] = [1, 1, 2, 3, 1, 4, 1, 6, 1, 1];
    const SCENARIO_B: [i64; 8] = [1, 2, 1, 1, 7, 8, 9, 1];

    fn lot_ab() -> Lot {
        let mut lot = Lot::new("L001", "PX1");
        lot.set_schema(vec![
            Parameter::new("VTH", "VTH", "V").with_limits(Some(0.0), Some(6.0))
        ])
        .unwrap();
        lot.push_wafer(Wafer::from_bins("A", &SCENARIO_A)).unwrap();
        lot.push_wafer(Wafer::from_bins("B", &SCENARIO_B)).unwrap();
        lot
    }

    #[test]
    fn test_scenario_a() {
        let mut lot = Lot::new("L001", "PX1");
        lot.push_wafer(Wafer::from_bins("A", &SCENARIO_A)).unwrap();
        let report = YieldAnalyzer::default().analyze_lot(&lot).unwrap();
        let a = &report.wafers[0];
        assert_eq!((a.total, a.pass), (10, 6));
        assert_eq!(a.yield_text(), "60.00%");
        assert_eq!(a.bins, vec![1, 1, 1, 0, 0, 0]);
    }

    #[test]
    fn test_scenario_b() {
        let report = YieldAnalyzer::default().analyze_lot(&lot_ab()).unwrap();
        let b = &report.wafers[1];
        assert_eq!((b.total, b.pass), (8, 4));
        assert_eq!(b.yield_text(), "50.00%");
        assert_eq!(b.bins, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_summary_averages_wafer_yields() {
        let report = YieldAnalyzer::default().analyze_lot(&lot_ab()).unwrap();
        let all = &report.summary;
        assert_eq!(all.lot_id, "ALL");
        assert_eq!(all.wafer_id, "ALL");
        assert_eq!((all.total, all.pass), (18, 10));
        // Mean of 60 and 50, not 10/18
        assert_eq!(all.yield_text(), "55.00%");
        assert_eq!(all.bins, vec![1, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_table_and_lot_paths_agree() {
        let lot = lot_ab();
        let analyzer = YieldAnalyzer::default();
        assert_eq!(
            analyzer.analyze_table(&combine(&lot)),
            analyzer.analyze_lot(&lot)
        );
    }

    #[test]
    fn test_groups_keep_first_seen_order() {
        let mut table = DataTable::with_columns([LOT_ID, WAFER_ID, BIN]);
        for (w, b) in [("W2", 1), ("W1", 2), ("W2", 1), ("W1", 1)] {
            table
                .push_row(vec![Value::from("L1"), Value::from(w), Value::Int(b)])
                .unwrap();
        }
        let report = YieldAnalyzer::default().analyze_table(&table).unwrap();
        let ids: Vec<_> = report.wafers.iter().map(|w| w.wafer_id.as_str()).collect();
        assert_eq!(ids, vec!["W2", "W1"]);
        assert_eq!(report.wafers[0].yield_text(), "100.00%");
    }

    #[test]
    fn test_preconditions() {
        let analyzer = YieldAnalyzer::default();
        let no_bin = DataTable::with_columns([LOT_ID, WAFER_ID]);
        assert!(analyzer.analyze_table(&no_bin).is_none());
        let empty = DataTable::with_columns([LOT_ID, WAFER_ID, BIN]);
        assert!(analyzer.analyze_table(&empty).is_none());
        assert!(analyzer.analyze_lot(&Lot::new("L", "P")).is_none());
    }

    #[test]
    fn test_empty_wafer_yield_is_zero() {
        let mut lot = Lot::new("L001", "PX1");
        lot.push_wafer(Wafer::from_bins("W0", &[])).unwrap();
        let report = YieldAnalyzer::default().analyze_lot(&lot).unwrap();
        assert_eq!(report.wafers[0].yield_text(), "0.00%");
    }

    #[test]
    fn test_custom_pass_bin() {
        let mut lot = lot_ab();
        lot.pass_bin = 2;
        let report = YieldAnalyzer::default().analyze_lot(&lot).unwrap();
        assert_eq!(report.wafers[0].pass, 1);
        assert_eq!(report.wafers[0].yield_text(), "10.00%");
    }

    #[test]
    fn test_report_table_layout() {
        let table = YieldAnalyzer::default()
            .analyze_lot(&lot_ab())
            .unwrap()
            .to_table();
        let names: Vec<_> = table.column_names().collect();
        assert_eq!(
            names,
            vec![
                "Lot_ID", "Wafer_ID", "Yield", "Total", "Pass", "Bin3", "Bin4", "Bin6", "Bin7",
                "Bin8", "Bin9"
            ]
        );
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.get(2, "Yield"), Some(&Value::from("55.00%")));
        assert_eq!(table.get(2, "Total"), Some(&Value::Int(18)));
    }

    #[test]
    fn test_compute_stats() {
        let p = Parameter::new("VTH", "VTH", "V").with_limits(Some(0.0), Some(6.0));
        let s = compute_stats(&[1.0, 2.0, 3.0, 4.0, 5.0], &p);
        assert_eq!(s.count, 5);
        assert_eq!(s.mean, Some(3.0));
        assert_eq!(s.median, Some(3.0));
        assert_eq!(s.min, Some(1.0));
        assert_eq!(s.max, Some(5.0));
        let sigma = s.std_dev.unwrap();
        assert!((sigma - 2.5f64.sqrt()).abs() < 1e-12);
        assert!((s.cp.unwrap() - 6.0 / (6.0 * sigma)).abs() < 1e-12);
        assert!((s.cpk.unwrap() - 3.0 / (3.0 * sigma)).abs() < 1e-12);
        assert_eq!(s.yield_percent, Some(100.0));
    }

    #[test]
    fn test_undefined_stats_are_none() {
        let one_sided = Parameter::new("IDS", "IDS", "mA").with_limits(None, Some(1.0));
        let s = compute_stats(&[0.5, 1.5], &one_sided);
        assert!(s.std_dev.is_some());
        assert_eq!((s.cp, s.cpk), (None, None));
        assert_eq!(s.yield_percent, Some(50.0));
        assert_eq!(s.median, Some(1.0));

        let both = Parameter::new("BV", "BV", "V").with_limits(Some(0.0), Some(1.0));
        let flat = compute_stats(&[0.5, 0.5, 0.5], &both);
        assert_eq!(flat.std_dev, Some(0.0));
        assert_eq!((flat.cp, flat.cpk), (None, None));

        let empty = compute_stats(&[], &both);
        assert_eq!(empty, ParameterStats::default());
    }

    #[test]
    fn test_lot_and_wafer_stats() {
        let mut lot = Lot::new("L001", "PX1");
        lot.set_schema(vec![Parameter::new("VTH", "VTH", "V")])
            .unwrap();
        lot.push_wafer(
            Wafer::from_bins("W1", &[1, 1])
                .with_column("VTH", vec![Some(1.0), None])
                .unwrap(),
        )
        .unwrap();
        lot.push_wafer(
            Wafer::from_bins("W2", &[1, 1])
                .with_column("VTH", vec![Some(3.0), Some(5.0)])
                .unwrap(),
        )
        .unwrap();

        let all = parameter_stats(&lot);
        assert_eq!(all[0].1.count, 3);
        assert_eq!(all[0].1.mean, Some(3.0));

        let per_wafer = wafer_parameter_stats(&lot);
        assert_eq!(per_wafer[0].parameters[0].1.mean, Some(1.0));
        assert_eq!(per_wafer[0].parameters[0].1.std_dev, None);
        assert_eq!(per_wafer[1].parameters[0].1.mean, Some(4.0));

        apply_parameter_stats(&mut lot);
        assert_eq!(lot.parameter("VTH").unwrap().stats().unwrap().count, 3);

        let table = stats_table(&lot, true);
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.column_names().next(), Some("WaferID"));
        assert_eq!(stats_table(&lot, false).n_cols(), 13);
    }

    #[test]
    fn test_bin_counts() {
        let counts = bin_counts(&lot_ab());
        assert_eq!(counts[0].0, "A");
        assert_eq!(counts[0].1.get(&1), Some(&6));
        assert_eq!(counts[1].1.get(&2), Some(&1));
        assert_eq!(counts[1].1.keys().copied().collect::<Vec<_>>(), vec![1, 2, 7, 8, 9]);
    }
}
