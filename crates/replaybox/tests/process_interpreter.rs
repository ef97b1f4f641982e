// Test module - relaxed lint rules
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]
#![cfg(unix)]

//! External-process interpreter tests, using `/bin/sh` as the VM.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use replaybox::channel::ReplayChannel;
use replaybox::config::InterpreterConfig;
use replaybox::driver::{execute, DriverOptions, Execution};
use replaybox::interpreter::{InterpreterFactory, InterpreterOptions, ProcessInterpreterFactory};
use replaybox::model::ExecutionKind;
use replaybox::provider::ProgramGuard;

fn shell(script: &str, deterministic_args: &[&str]) -> ProcessInterpreterFactory {
    ProcessInterpreterFactory::new(InterpreterConfig {
        command: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string(), "{program}".to_string()],
        deterministic_args: deterministic_args.iter().map(|a| (*a).to_string()).collect(),
    })
    .unwrap()
}

fn program() -> ProgramGuard {
    ProgramGuard::prebuilt("story", PathBuf::from("/stories/story.ulx"), Vec::new())
}

fn run(factory: &ProcessInterpreterFactory, commands: &[&str], timeout: Option<Duration>) -> Execution {
    let interpreter = factory
        .create(&program(), &InterpreterOptions::harness())
        .unwrap();
    execute(
        interpreter,
        Box::new(ReplayChannel::from_commands(commands.iter().copied())),
        &DriverOptions::with_timeout(timeout),
    )
}

#[test]
fn commands_stream_through_stdin_and_stdout() {
    let factory = shell(
        r#"echo "Welcome to $0"; while read line; do echo "> $line"; done; echo bye"#,
        &[],
    );
    let execution = run(&factory, &["look", "take lamp"], Some(Duration::from_secs(10)));
    assert_eq!(execution.kind(), ExecutionKind::Completed);
    assert_eq!(
        execution.into_transcript(),
        "Welcome to /stories/story.ulx\n> look\n> take lamp\nbye\n"
    );
}

#[test]
fn deterministic_arguments_are_appended() {
    let factory = shell(r#"echo "args: $*""#, &["--rngseed", "1"]);
    let execution = run(&factory, &[], Some(Duration::from_secs(10)));
    assert_eq!(execution.into_transcript(), "args: --rngseed 1\n");
}

#[test]
fn nonzero_exit_is_a_fault_with_stderr() {
    let factory = shell("echo partial; echo 'illegal opcode' >&2; exit 3", &[]);
    let execution = run(&factory, &[], Some(Duration::from_secs(10)));
    assert_eq!(execution.kind(), ExecutionKind::Faulted);
    let transcript = execution.into_transcript();
    assert!(transcript.starts_with("partial\n\n*** interpreter fault ***\n"));
    assert!(transcript.contains("illegal opcode"));
    assert!(transcript.ends_with("*** end of fault ***\n"));
}

#[test]
fn missing_executable_is_a_fault() {
    let factory = ProcessInterpreterFactory::new(InterpreterConfig {
        command: "/nonexistent/glulxe".to_string(),
        args: vec!["{program}".to_string()],
        deterministic_args: Vec::new(),
    })
    .unwrap();
    let execution = run(&factory, &["look"], None);
    assert_eq!(execution.kind(), ExecutionKind::Faulted);
    assert!(execution.fault().unwrap().contains("could not be started"));
}

#[test]
fn hung_process_is_abandoned_at_the_limit() {
    let factory = shell("echo waiting; sleep 30", &[]);
    let started = Instant::now();
    let execution = run(&factory, &[], Some(Duration::from_millis(300)));
    assert_eq!(execution.kind(), ExecutionKind::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(execution.into_transcript().starts_with("waiting\n"));
}

#[test]
fn empty_command_is_rejected() {
    let result = ProcessInterpreterFactory::new(InterpreterConfig {
        command: "  ".to_string(),
        args: vec!["{program}".to_string()],
        deterministic_args: Vec::new(),
    });
    assert!(result.is_err());
}

#[test]
fn flooding_process_is_killed_at_the_limit() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("vm.pid");
    let factory = shell(
        &format!(
            "echo $$ > '{}'; while :; do echo flood; done",
            pid_file.display()
        ),
        &[],
    );

    let execution = run(&factory, &["look"], Some(Duration::from_millis(200)));
    assert_eq!(execution.kind(), ExecutionKind::TimedOut);
    assert!(execution.into_transcript().starts_with("flood\n"));

    let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let alive = std::process::Command::new("kill")
            .args(["-0", &pid])
            .stderr(std::process::Stdio::null())
            .status()
            .unwrap()
            .success();
        if !alive {
            break;
        }
        assert!(Instant::now() < deadline, "interpreter process {pid} still running");
        std::thread::sleep(Duration::from_millis(50));
    }
}
