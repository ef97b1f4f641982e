//! Tests for the run command against a shell "interpreter" that prints the
//! program and then echoes every command.
// Test module - relaxed lint rules
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::indexing_slicing)]

use replaybox_fixtures::{temp_dir, write_config, CaseFiles, ConfigBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const ECHO_SCRIPT: &str = "cat \"$0\"; cat";
const GREET_PROGRAM: &str = "Hello.\n>";
const GREET_BASELINE: &str = "Hello.\n>look\nquit\n";

fn replaybox(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_replaybox"))
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("failed to execute")
}

/// Cases root with a passing `greet` case; returns (root, config path).
fn suite(prefix: &str) -> (PathBuf, PathBuf) {
    let dir = temp_dir(prefix);
    let cases = dir.join("cases");
    CaseFiles::new("greet", GREET_PROGRAM)
        .with_input("look\nquit\n")
        .with_baseline(GREET_BASELINE)
        .write(&cases);
    let config = dir.join("replaybox.json");
    write_config(&config, &ConfigBuilder::shell(&cases, ECHO_SCRIPT).build());
    (cases, config)
}

#[test]
fn run_all_prints_outcomes_and_summary() {
    let (cases, config) = suite("cli-run-all");
    CaseFiles::new("intro", GREET_PROGRAM).write(&cases);

    let output = replaybox(&config, &["run"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "inconclusive cases must not fail the batch: {stdout}"
    );
    assert!(stdout.contains("greet: pass"));
    assert!(stdout.contains("intro: inconclusive (no recorded input)"));
    assert!(stdout.contains("1 passed, 0 failed, 1 inconclusive"));
}

#[test]
fn mismatch_exits_one_and_points_at_failure_artifact() {
    let (cases, config) = suite("cli-run-mismatch");
    fs::write(cases.join("greet.in"), "look\nwest\n").unwrap();

    let output = replaybox(&config, &["run"]);

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("greet: FAIL (differs at line 3)"));
    assert!(stdout.contains("1 failure(s); actual output written to:"));
    let fail = cases.join("greet.fail");
    assert!(stdout.contains(&fail.display().to_string()));
    assert_eq!(fs::read_to_string(fail).unwrap(), "Hello.\n>look\nwest\n");
}

#[test]
fn single_case_run_passes() {
    let (_, config) = suite("cli-run-one");

    let output = replaybox(&config, &["run", "greet"]);

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("greet: pass"));
}

#[test]
fn single_inconclusive_case_exits_with_missing_fixture_code() {
    let (cases, config) = suite("cli-run-missing");
    fs::remove_file(cases.join("greet.out")).unwrap();

    let output = replaybox(&config, &["run", "greet"]);

    assert_eq!(output.status.code(), Some(11));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("greet: inconclusive (no expected output)"));
    assert!(cases.join("greet.fail").exists());
}

#[test]
fn unknown_case_is_an_error() {
    let (_, config) = suite("cli-run-unknown");

    let output = replaybox(&config, &["run", "nosuch"]);

    assert_eq!(output.status.code(), Some(13));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no test case named 'nosuch'"));
}

#[test]
fn missing_config_file_is_an_io_error() {
    let dir = temp_dir("cli-run-noconfig");

    let output = replaybox(&dir.join("absent.json"), &["run"]);

    assert_eq!(output.status.code(), Some(10));
}

#[test]
fn json_output_and_report_file_match() {
    let (cases, config) = suite("cli-run-json");
    let report_path = cases.join("report.json");

    let output = replaybox(
        &config,
        &["run", "--json", "--jobs", "2", "--report", report_path.to_str().unwrap()],
    );

    assert!(output.status.success());
    let printed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(printed, written);
    assert_eq!(printed["counts"]["passed"], 1);
    assert_eq!(printed["cases"][0]["name"], "greet");
    assert_eq!(printed["cases"][0]["outcome"]["status"], "passed");
}

#[test]
fn json_error_carries_stable_code() {
    let (_, config) = suite("cli-run-json-error");

    let output = replaybox(&config, &["run", "nosuch", "--json"]);

    assert_eq!(output.status.code(), Some(13));
    let error: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(error["code"], "E_UNKNOWN_CASE");
}

#[test]
fn serial_drift_passes_unless_strict() {
    let (cases, config) = suite("cli-run-strict");
    fs::write(cases.join("greet.ulx"), "Serial number 160518\n>").unwrap();
    fs::write(cases.join("greet.out"), "Serial number 991231\n>look\nquit\n").unwrap();

    let relaxed = replaybox(&config, &["run", "greet"]);
    let strict = replaybox(&config, &["run", "greet", "--strict"]);

    assert!(relaxed.status.success());
    assert_eq!(strict.status.code(), Some(1));
}

#[test]
fn yaml_config_is_accepted() {
    let (cases, _) = suite("cli-run-yaml");
    let yaml = cases.join("harness.yaml");
    let config = ConfigBuilder::shell(&cases, ECHO_SCRIPT).build();
    fs::write(&yaml, serde_yml::to_string(&config).unwrap()).unwrap();

    let output = replaybox(&yaml, &["run", "greet"]);

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn verbose_progress_goes_to_stderr() {
    let (_, config) = suite("cli-run-verbose");

    let output = replaybox(&config, &["-v", "run"]);

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("batch started"));
    assert!(stderr.contains("greet"));
}
