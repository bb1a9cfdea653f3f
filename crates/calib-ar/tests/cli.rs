use assert_cmd::Command;
use predicates::prelude::*;

fn calib_ar() -> Command {
    Command::cargo_bin("calib-ar").unwrap()
}

#[test]
fn help_lists_flags() {
    calib_ar()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--all"))
        .stdout(predicate::str::contains("--cell-size"));
}

#[test]
fn nonexistent_source_fails() {
    let dir = tempfile::tempdir().unwrap();
    calib_ar()
        .arg(dir.path().join("nope"))
        .arg("--all")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: cannot read any frame"));
}

#[test]
fn missing_source_fails() {
    calib_ar()
        .args(["--log-level", "off"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no frame source"));
}

#[test]
fn degenerate_pattern_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    calib_ar()
        .arg(dir.path())
        .args(["--columns", "1", "--rows", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 2x2"));
}

#[test]
fn bad_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");
    std::fs::write(&path, "{ not json").unwrap();
    calib_ar()
        .arg("--config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("error:"));
}
