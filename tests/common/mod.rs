//! Shared test helpers for integration tests
//!
//! Fixture writers for DCP wafer exports, setup grids and scope grids.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo;
use assert_cmd::Command;
use tempfile::TempDir;

/// Helper to get a cpdt command
pub fn cpdt() -> Command {
    Command::new(cargo::cargo_bin!("cpdt"))
}

/// Bins of yield scenario A: 10 chips, 6 pass
pub const SCENARIO_A: [i64; 10] = [1, 1, 2, 3, 1, 4, 1, 6, 1, 1];

/// Bins of yield scenario B: 8 chips, 4 pass
pub const SCENARIO_B: [i64; 8] = [1, 2, 1, 1, 7, 8, 9, 1];

/// Columns of the fixture export: 4 index columns, VTH, IDS, CONT
const WIDTH: usize = 7;

/// Join fields into one CSV line padded to the fixture width
///
/// No fields gives a bare empty line, as real exports have.
fn line(fields: &[&str]) -> String {
    if fields.is_empty() {
        return String::new();
    }
    let mut cells: Vec<&str> = fields.to_vec();
    cells.resize(WIDTH.max(fields.len()), "");
    cells.join(",")
}

/// DCP export text for one wafer
///
/// VTH is in volts (limits 500mV..1.5V), IDS in milliamps (upper 10mA) and
/// equal to ten times VTH. A `None` VTH leaves both cells blank.
pub fn dcp_wafer_csv(lot: &str, wafer: &str, bins: &[i64], vth: &[Option<f64>]) -> String {
    let mut lines = vec![
        line(&["CP DATA"]),
        line(&["Product", "PX1"]),
        line(&["Lot", lot]),
        line(&["Wafer", wafer]),
        line(&[]),
        line(&[]),
        line(&["", "", "", "", "VTH", "IDS", "CONT"]),
        line(&["", "", "", "", "1.5V", "10mA", ""]),
        line(&["", "", "", "", "500mV", "", ""]),
        line(&["", "", "", "", "VDS=1V", "VDS=2V", ""]),
    ];
    while lines.len() < 15 {
        lines.push(line(&[]));
    }

    for (i, bin) in bins.iter().enumerate() {
        let seq = (i + 1).to_string();
        let x = (i % 5).to_string();
        let y = (i / 5).to_string();
        let bin = bin.to_string();
        let (v, ids) = match vth.get(i).copied().flatten() {
            Some(v) => (v.to_string(), (v * 10.0).to_string()),
            None => (String::new(), String::new()),
        };
        lines.push(line(&[&seq, &x, &y, &bin, &v, &ids, "1"]));
    }
    lines.join("\n") + "\n"
}

/// Write one DCP wafer file
pub fn write_wafer(
    dir: &Path,
    file: &str,
    lot: &str,
    wafer: &str,
    bins: &[i64],
    vth: &[Option<f64>],
) -> PathBuf {
    let path = dir.join(file);
    fs::write(&path, dcp_wafer_csv(lot, wafer, bins, vth)).unwrap();
    path
}

/// VTH values 0.6, 0.65, ... for `n` chips
pub fn ramp(n: usize) -> Vec<Option<f64>> {
    (0..n).map(|i| Some(0.6 + 0.05 * i as f64)).collect()
}

/// Temp dir with an empty `cpdt.yaml` and a `wafers/` directory holding
/// scenario A (W01) and scenario B (W02) of lot LOT1
pub fn scenario_dir() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("cpdt.yaml"), "").unwrap();
    let wafers = tmp.path().join("wafers");
    fs::create_dir(&wafers).unwrap();
    write_wafer(&wafers, "w01.csv", "LOT1", "W01", &SCENARIO_A, &ramp(10));
    write_wafer(&wafers, "w02.csv", "LOT1", "W02", &SCENARIO_B, &ramp(8));
    tmp
}

/// Write a calculated-parameter setup grid
pub fn write_setup(dir: &Path, columns: &[(&str, &str, &str, &str)]) -> PathBuf {
    let mut rows: Vec<Vec<String>> = vec![
        vec!["Name".into()],
        vec!["ID".into()],
        vec!["Formula".into()],
        vec!["Unit".into()],
        vec!["Lower".into()],
        vec!["Upper".into()],
    ];
    for (name, id, formula, unit) in columns {
        rows[0].push(name.to_string());
        rows[1].push(id.to_string());
        rows[2].push(formula.to_string());
        rows[3].push(unit.to_string());
        rows[4].push(String::new());
        rows[5].push(String::new());
    }
    let text: Vec<String> = rows.iter().map(|r| r.join(",")).collect();
    let path = dir.join("setup.csv");
    fs::write(&path, text.join("\n") + "\n").unwrap();
    path
}

/// Write a scope grid with a PX1 block overriding VTH and IDS
pub fn write_scope(dir: &Path) -> PathBuf {
    let text = "\
Item,VTH,IDS
PX1,,
Lower,0.65,
Upper,0.95,8000uA
";
    let path = dir.join("scope.csv");
    fs::write(&path, text).unwrap();
    path
}
