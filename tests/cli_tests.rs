//! CLI and command tests

mod common;

use common::{cpdt, scenario_dir, write_scope, write_setup, write_wafer};
use predicates::prelude::*;
use std::fs;

// ============================================================================
// CLI Basic Tests
// ============================================================================

#[test]
fn test_help_displays() {
    cpdt()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("wafer-probe"));
}

#[test]
fn test_version_displays() {
    cpdt()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cpdt"));
}

#[test]
fn test_unknown_command_fails() {
    cpdt()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_input_fails() {
    let tmp = scenario_dir();
    cpdt()
        .current_dir(tmp.path())
        .args(["yield", "nowhere.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input not found"));
}

// ============================================================================
// Yield Command Tests
// ============================================================================

#[test]
fn test_yield_csv_report() {
    let tmp = scenario_dir();
    let output = cpdt()
        .current_dir(tmp.path())
        .args(["yield", "wafers", "--format", "csv"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    insta::assert_snapshot!(stdout.trim_end(), @r"
    Lot_ID,Wafer_ID,Yield,Total,Pass,Bin3,Bin4,Bin6,Bin7,Bin8,Bin9
    LOT1,W01,60.00%,10,6,1,1,1,0,0,0
    LOT1,W02,50.00%,8,4,0,0,0,1,1,1
    ALL,ALL,55.00%,18,10,1,1,1,1,1,1
    ");
}

#[test]
fn test_yield_json_report() {
    let tmp = scenario_dir();
    let output = cpdt()
        .current_dir(tmp.path())
        .args(["yield", "wafers", "-f", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2]["Lot_ID"], "ALL");
    assert_eq!(rows[2]["Yield"], "55.00%");
    assert_eq!(rows[2]["Total"], 18);
}

#[test]
fn test_yield_uses_config_pass_bin() {
    let tmp = scenario_dir();
    fs::write(tmp.path().join("cpdt.yaml"), "pass_bin: 2\ntracked_bins: [1]\n").unwrap();
    cpdt()
        .current_dir(tmp.path())
        .args(["yield", "wafers", "-f", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Lot_ID,Wafer_ID,Yield,Total,Pass,Bin1"))
        .stdout(predicate::str::contains("LOT1,W01,10.00%,10,1,6"));
}

#[test]
fn test_invalid_config_fails() {
    let tmp = scenario_dir();
    fs::write(tmp.path().join("cpdt.yaml"), "pass_bin: [\n").unwrap();
    cpdt()
        .current_dir(tmp.path())
        .args(["yield", "wafers"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cpdt.yaml"));
}

#[test]
fn test_broken_file_is_skipped() {
    let tmp = scenario_dir();
    fs::write(tmp.path().join("wafers/w00.csv"), "not,a,wafer\n").unwrap();
    cpdt()
        .current_dir(tmp.path())
        .args(["yield", "wafers", "-f", "csv"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Skipped"))
        .stdout(predicate::str::contains("ALL,ALL,55.00%,18,10"));
}

// ============================================================================
// Combine Command Tests
// ============================================================================

#[test]
fn test_combine_writes_csv_file() {
    let tmp = scenario_dir();
    let out = tmp.path().join("combined.csv");
    cpdt()
        .current_dir(tmp.path())
        .args(["combine", "wafers", "--lot", "L77", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("Combined lot"));

    let text = fs::read_to_string(&out).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("LotID,WaferID,Seq,Bin,X,Y,CONT,VTH,IDS")
    );
    // Source lot ids from the files take precedence over --lot
    assert!(lines.next().unwrap().starts_with("LOT1,W01,1,1,0,0,1,0.6,"));
    assert_eq!(text.lines().count(), 19);
}

#[test]
fn test_combine_with_setup_and_scope() {
    let tmp = scenario_dir();
    let setup = write_setup(tmp.path(), &[("Ratio", "RATIO", "f2/f1", "")]);
    let scope = write_scope(tmp.path());
    cpdt()
        .current_dir(tmp.path())
        .args(["combine", "wafers", "-f", "csv", "--setup"])
        .arg(&setup)
        .arg("--scope")
        .arg(&scope)
        .assert()
        .success()
        .stdout(predicate::str::contains("CONT,VTH,IDS,RATIO"));
}

#[test]
fn test_directory_without_grid_files_fails() {
    let tmp = scenario_dir();
    fs::create_dir(tmp.path().join("empty")).unwrap();
    cpdt()
        .current_dir(tmp.path())
        .args(["combine", "empty"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No input files found"));
}

// ============================================================================
// Stats Command Tests
// ============================================================================

#[test]
fn test_stats_table() {
    let tmp = scenario_dir();
    cpdt()
        .current_dir(tmp.path())
        .args(["stats", "wafers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cpk"))
        .stdout(predicate::str::contains("VTH"));
}

#[test]
fn test_stats_by_wafer_csv() {
    let tmp = scenario_dir();
    write_wafer(
        &tmp.path().join("wafers"),
        "w03.csv",
        "LOT1",
        "W03",
        &[1, 1],
        &[Some(0.7), Some(0.7)],
    );
    let output = cpdt()
        .current_dir(tmp.path())
        .args(["stats", "wafers", "--by-wafer", "-f", "csv"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert!(lines[0].starts_with("WaferID,Parameter,Unit,LSL,USL,Count"));
    // Three wafers, two parameters each
    assert_eq!(lines.len(), 7);
    // Zero spread on W03: sigma is 0 and Cp/Cpk stay empty
    let w03_vth = lines.iter().find(|l| l.starts_with("W03,VTH")).unwrap();
    assert!(w03_vth.contains(",0,"));
    assert!(w03_vth.ends_with(",,,100.00%"));
}
