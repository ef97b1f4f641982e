//! Tests for recording baselines from the console, directly and via the menu.
// Test module - relaxed lint rules
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use replaybox_fixtures::{temp_dir, write_config, CaseFiles, ConfigBuilder};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

const ECHO_SCRIPT: &str = "cat \"$0\"; cat";

/// Run the binary with `stdin` piped in and closed afterwards.
fn replaybox_with_input(config: &Path, args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_replaybox"))
        .arg("--config")
        .arg(config)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    child.wait_with_output().expect("failed to wait")
}

/// A `greet` case with a program but no fixtures yet.
fn unrecorded(prefix: &str) -> (PathBuf, PathBuf) {
    let dir = temp_dir(prefix);
    let cases = dir.join("cases");
    CaseFiles::new("greet", "Hello.\n>").write(&cases);
    let config = dir.join("replaybox.json");
    write_config(&config, &ConfigBuilder::shell(&cases, ECHO_SCRIPT).build());
    (cases, config)
}

#[test]
fn record_writes_fixtures_that_replay_cleanly() {
    let (cases, config) = unrecorded("cli-record");

    let output = replaybox_with_input(&config, &["record", "greet"], "look\nquit\n");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        fs::read_to_string(cases.join("greet.in")).unwrap(),
        "look\nquit\n"
    );
    assert_eq!(
        fs::read_to_string(cases.join("greet.out")).unwrap(),
        "Hello.\n>look\nquit\n"
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("Hello."));
    assert!(String::from_utf8_lossy(&output.stderr).contains("recorded 2 command(s)"));

    let replay = replaybox_with_input(&config, &["run", "greet"], "");
    assert!(replay.status.success());
}

#[test]
fn record_unknown_case_fails_before_touching_files() {
    let (cases, config) = unrecorded("cli-record-unknown");

    let output = replaybox_with_input(&config, &["record", "nosuch"], "look\n");

    assert_eq!(output.status.code(), Some(13));
    assert!(!cases.join("nosuch.in").exists());
}

#[test]
fn menu_lists_runs_and_quits() {
    let (cases, config) = unrecorded("cli-menu");
    fs::write(cases.join("greet.in"), "look\n").unwrap();
    fs::write(cases.join("greet.out"), "Hello.\n>look\n").unwrap();

    let output = replaybox_with_input(&config, &["menu"], "list\nrun greet\nbogus\nquit\n");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 test case(s)"));
    assert!(stdout.contains("  greet"));
    assert!(stdout.contains("greet: pass"));
    assert!(stdout.contains("unknown command 'bogus'"));
}

#[test]
fn menu_record_consumes_the_following_lines() {
    let (cases, config) = unrecorded("cli-menu-record");

    let output = replaybox_with_input(&config, &["menu"], "record greet\nlook\nwest\n");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        fs::read_to_string(cases.join("greet.in")).unwrap(),
        "look\nwest\n"
    );
}

#[cfg(unix)]
#[test]
fn menu_survives_an_interrupted_run() {
    let dir = temp_dir("cli-menu-interrupt");
    let cases = dir.join("cases");
    CaseFiles::new("greet", "Hello.\n>")
        .with_input("look\n")
        .with_baseline("Hello.\n>look\n")
        .write(&cases);
    let config = dir.join("replaybox.json");
    write_config(
        &config,
        &ConfigBuilder::shell(&cases, "cat \"$0\"; exec sleep 30").build(),
    );

    let mut child = Command::new(env!("CARGO_BIN_EXE_replaybox"))
        .arg("--config")
        .arg(&config)
        .arg("menu")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn");
    let mut stdin = child.stdin.take().unwrap();
    stdin.write_all(b"run\n").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(1000));
    let sent = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(sent.success());
    std::thread::sleep(std::time::Duration::from_millis(300));
    stdin.write_all(b"list\nquit\n").unwrap();
    drop(stdin);

    let output = child.wait_with_output().expect("failed to wait");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("interrupted"));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let after_run = stdout.split("inconclusive (").last().unwrap_or_default();
    assert!(after_run.contains("  greet"), "stdout: {stdout}");
}
