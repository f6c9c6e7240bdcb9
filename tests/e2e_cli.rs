
use assert_cmd::{cargo, prelude::*};
use fixtures::*;
use predicates::prelude::*;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

fn setup_temp_home() -> TempDir {
    TempDir::new().expect("failed to create temp home")
}

fn gstbook(home: &TempDir) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("gstbook"));
    cmd.env("HOME", home.path())
        .env("GSTBOOK_HOME", home.path().join("gstbook"))
        .env_remove("GSTBOOK_DB")
        .env_remove("GSTBOOK_OUTPUT_DIR")
        .env_remove("RUST_LOG")
        .arg("--no-color");
    cmd
}

fn create_project(home: &TempDir, name: &str) {
    gstbook(home)
        .args(["project", "create", "--name", name, "--gstin", GSTIN, "--fy", "2021-22"])
        .assert()
        .success();
}

#[test]
fn no_command_prints_help() {
    let home = setup_temp_home();
    gstbook(&home)
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn project_create_rejects_malformed_gstin() {
    let home = setup_temp_home();
    gstbook(&home)
        .args(["project", "create", "--name", "Acme", "--gstin", "27ABC", "--fy", "2021-22"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid GSTIN"));
}

#[test]
fn project_list_json_shows_created_project() {
    let home = setup_temp_home();
    create_project(&home, "Acme Traders");

    let output = gstbook(&home).args(["--json", "project", "list"]).output().unwrap();
    assert!(output.status.success());
    let projects: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(projects[0]["name"], "Acme Traders");
    assert_eq!(projects[0]["gstin"], GSTIN);
}

#[test]
fn analyse_without_uploads_fails_cleanly() {
    let home = setup_temp_home();
    create_project(&home, "Empty");

    gstbook(&home)
        .args(["analyse", "Empty"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no uploaded files"));

    gstbook(&home)
        .args(["runs", "Empty"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No analysis runs"));
}

#[test]
fn upload_status_and_analyse_produce_workbook() {
    let home = setup_temp_home();
    create_project(&home, "Acme");

    let apr = home.path().join(gstr1_name(4, 2021));
    write_export(&apr, &[b2b_sheet(&["01-04-2021", "28-03-2021"])]);
    let inward = home.path().join(gstr2a_name(5, 2021));
    write_export(&inward, &[b2b_sheet(&["03-05-2021"])]);

    for file in [&apr, &inward] {
        gstbook(&home)
            .arg("upload")
            .arg("Acme")
            .arg(file)
            .assert()
            .success()
            .stdout(predicate::str::contains("stored in"))
            .stdout(predicate::str::contains("\u{001b}[").not());
    }

    gstbook(&home)
        .args(["status", "Acme"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Apr-21"))
        .stdout(predicate::str::contains("GSTR-2A"));

    let output = gstbook(&home).args(["--json", "analyse", "Acme"]).output().unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["status"], "completed");
    let path = PathBuf::from(summary["output_path"].as_str().unwrap());
    assert!(path.exists());
    assert!(path.starts_with(home.path().join("gstbook").join("outputs")));

    let families = summary["families"].as_array().unwrap();
    assert_eq!(families[0]["total_anomalies"], 1);
    assert!(families[1]["total_records"].as_u64().unwrap() >= 1);

    gstbook(&home)
        .args(["runs", "Acme"])
        .assert()
        .success()
        .stdout(predicate::str::contains("completed"));
}

#[test]
fn upload_rejects_other_taxpayers_export() {
    let home = setup_temp_home();
    create_project(&home, "Acme");

    let foreign = home
        .path()
        .join("GSTR1_29ABCDE1234F1Z5_042021_Inv.xlsx");
    write_export(&foreign, &[b2b_sheet(&["01-04-2021"])]);

    gstbook(&home)
        .arg("upload")
        .arg("Acme")
        .arg(&foreign)
        .assert()
        .failure()
        .stderr(predicate::str::contains("belongs to GSTIN"));
}

#[test]
fn inspect_lists_bundle_sheets() {
    let home = setup_temp_home();
    let part = home.path().join(gstr2a_name(6, 2021));
    write_export(&part, &[b2b_sheet(&["01-06-2021"])]);
    let bundle = home.path().join("june.zip");
    write_bundle(&bundle, &[part]);

    gstbook(&home)
        .arg("inspect")
        .arg(&bundle)
        .assert()
        .success()
        .stdout(predicate::str::contains(gstr2a_name(6, 2021)))
        .stdout(predicate::str::contains("B2B"));
}
