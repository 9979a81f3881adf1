//! Scenario 6 (SPEC_FULL.md §8): unknown-blocker rejection surfaces as a
//! non-zero exit code from the `submit-jobs` command, independent of any
//! cluster backend — the config fails static validation before the
//! scheduler ever talks to one.

use assert_cmd::Command;
use std::io::Write;

#[test]
fn unknown_blocker_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let mut file = std::fs::File::create(&config_path).unwrap();
    write!(
        file,
        r#"{{"jobs":[{{"name":"1","command":"echo hi","blocked_by":["10"]}}]}}"#
    )
    .unwrap();

    Command::cargo_bin("jade")
        .unwrap()
        .arg("submit-jobs")
        .arg(&config_path)
        .arg("--local")
        .arg("--output")
        .arg(dir.path().join("out"))
        .assert()
        .failure();
}
