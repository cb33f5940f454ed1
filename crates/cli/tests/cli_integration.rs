//! CLI integration tests: spawn the `mfio` binary against fixture
//! definition sources and package files in a temp directory.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const DIS_DFN: &str = "\
package-type dis

block dimensions
name nlay
type integer

block dimensions
name nrow
type integer

block dimensions
name ncol
type integer

block griddata
name botm
type double precision
shape (nrow, ncol)
";

const DIS_FILE: &str = "\
BEGIN DIMENSIONS
  NLAY 1
  NROW 2
  NCOL 2
END DIMENSIONS

BEGIN GRIDDATA
  BOTM
    CONSTANT 5.0
END GRIDDATA
";

/// Lay out a dfn directory and a package file under one temp root.
fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let dfn_dir = dir.path().join("dfn");
    fs::create_dir(&dfn_dir).unwrap();
    fs::write(dfn_dir.join("dis.dfn"), DIS_DFN).unwrap();
    fs::write(dir.path().join("model.dis"), DIS_FILE).unwrap();
    dir
}

fn mfio(root: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("mfio");
    cmd.current_dir(root);
    cmd
}

#[test]
fn help_exits_0_with_description() {
    cargo_bin_cmd!("mfio")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("mfio package-file toolchain"));
}

#[test]
fn validate_accepts_a_well_formed_package() {
    let dir = fixture();
    mfio(dir.path())
        .args(["validate", "model.dis", "--package-type", "dis"])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK"));
}

#[test]
fn validate_json_reports_ok() {
    let dir = fixture();
    mfio(dir.path())
        .args([
            "validate",
            "model.dis",
            "--package-type",
            "dis",
            "--output",
            "json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ok\":true"));
}

#[test]
fn validate_rejects_a_mismatched_end() {
    let dir = fixture();
    fs::write(
        dir.path().join("broken.dis"),
        "BEGIN DIMENSIONS\n  NLAY 1\nEND GRIDDATA\n",
    )
    .unwrap();
    mfio(dir.path())
        .args(["validate", "broken.dis", "--package-type", "dis"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn roundtrip_canonicalizes_constant_formatting() {
    let dir = fixture();
    mfio(dir.path())
        .args(["roundtrip", "model.dis", "--package-type", "dis"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CONSTANT 5.00000000"));
}

#[test]
fn roundtrip_output_is_stable() {
    let dir = fixture();
    mfio(dir.path())
        .args([
            "roundtrip",
            "model.dis",
            "--package-type",
            "dis",
            "--out",
            "pass1.dis",
        ])
        .assert()
        .success();
    mfio(dir.path())
        .args([
            "roundtrip",
            "pass1.dis",
            "--package-type",
            "dis",
            "--out",
            "pass2.dis",
        ])
        .assert()
        .success();
    let pass1 = fs::read_to_string(dir.path().join("pass1.dis")).unwrap();
    let pass2 = fs::read_to_string(dir.path().join("pass2.dis")).unwrap();
    assert_eq!(pass1, pass2);
}

#[test]
fn show_lists_registered_package_types() {
    let dir = fixture();
    mfio(dir.path())
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("dis"));
}

#[test]
fn show_describes_blocks_and_structures() {
    let dir = fixture();
    mfio(dir.path())
        .args(["show", "dis"])
        .assert()
        .success()
        .stdout(predicate::str::contains("block griddata"))
        .stdout(predicate::str::contains("botm"));
}

#[test]
fn show_json_serializes_the_spec_tree() {
    let dir = fixture();
    mfio(dir.path())
        .args(["show", "dis", "--output", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"package_type\": \"dis\""));
}

#[test]
fn unknown_package_type_fails() {
    let dir = fixture();
    mfio(dir.path())
        .args(["validate", "model.dis", "--package-type", "npf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("package type"));
}
