//! Interpreter contract and the external-process interpreter.
//!
//! The harness never looks inside the virtual machine. It needs four things:
//! a constructor taking the program and options ([`InterpreterFactory`]), a
//! deterministic-mode flag, a command-source flag, and a run-to-completion
//! entry point ([`Interpreter::run`]).
//!
//! [`ProcessInterpreter`] adapts any VM executable that reads commands on
//! stdin and writes its transcript to stdout.

use crate::channel::{ChannelError, SessionChannel};
use crate::config::InterpreterConfig;
use crate::provider::ProgramGuard;
use crate::runner::{RunnerError, RunnerResult};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Placeholder in interpreter arguments replaced by the program path.
pub const PROGRAM_PLACEHOLDER: &str = "{program}";

/// Quiet period after which pending output is considered complete.
const OUTPUT_SETTLE: Duration = Duration::from_millis(25);

/// Runtime fault raised by an interpreter run.
#[derive(Debug, Error)]
pub enum InterpreterFault {
    /// The virtual machine reported an error.
    #[error("runtime fault: {0}")]
    Runtime(String),
    /// The interpreter process could not be started or ended unsuccessfully.
    #[error("interpreter process {message}")]
    Process { message: String, stderr: String },
    /// The command channel failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// The interpreter panicked.
    #[error("interpreter panicked: {0}")]
    Panicked(String),
    /// The run was cancelled by the harness.
    #[error("run cancelled")]
    Cancelled,
}

impl InterpreterFault {
    /// Full description for the transcript diagnostic block.
    pub fn describe(&self) -> String {
        match self {
            Self::Process { stderr, .. } if !stderr.trim().is_empty() => {
                format!("{self}\nstderr:\n{}", stderr.trim_end())
            }
            _ => self.to_string(),
        }
    }
}

/// Cooperative cancellation signal shared between the driver and a run.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Lower the flag so it can guard another run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Where the interpreter takes its commands from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSourceMode {
    /// From the session channel (replay and recording).
    #[default]
    Channel,
    /// From the live console, bypassing the channel.
    Console,
}

/// Construction-time interpreter settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterOptions {
    /// Force internal randomness to a fixed seed/sequence.
    pub deterministic: bool,
    pub command_source: CommandSourceMode,
}

impl InterpreterOptions {
    /// Settings used for every harness run.
    pub fn harness() -> Self {
        Self {
            deterministic: true,
            command_source: CommandSourceMode::Channel,
        }
    }
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self::harness()
    }
}

/// One interpreter instance bound to one program.
pub trait Interpreter: Send {
    /// Run until the program halts or faults.
    ///
    /// Implementations should stop promptly once `cancel` is raised.
    fn run(
        &mut self,
        channel: &mut dyn SessionChannel,
        cancel: &CancelFlag,
    ) -> Result<(), InterpreterFault>;
}

/// Creates a fresh interpreter per run.
pub trait InterpreterFactory: Send + Sync {
    fn create(
        &self,
        program: &ProgramGuard,
        options: &InterpreterOptions,
    ) -> RunnerResult<Box<dyn Interpreter>>;
}

/// Factory for [`ProcessInterpreter`] built from configuration.
#[derive(Clone, Debug)]
pub struct ProcessInterpreterFactory {
    config: InterpreterConfig,
}

impl ProcessInterpreterFactory {
    pub fn new(config: InterpreterConfig) -> RunnerResult<Self> {
        if config.command.trim().is_empty() {
            return Err(RunnerError::config("interpreter command is empty"));
        }
        Ok(Self { config })
    }
}

impl InterpreterFactory for ProcessInterpreterFactory {
    fn create(
        &self,
        program: &ProgramGuard,
        options: &InterpreterOptions,
    ) -> RunnerResult<Box<dyn Interpreter>> {
        let program_path = program.path().display().to_string();
        let mut args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|arg| arg.replace(PROGRAM_PLACEHOLDER, &program_path))
            .collect();
        if options.deterministic {
            args.extend(self.config.deterministic_args.iter().cloned());
        }
        Ok(Box::new(ProcessInterpreter {
            command: self.config.command.clone(),
            args,
            mode: options.command_source,
        }))
    }
}

/// Runs an external VM executable, streaming commands to stdin and stdout
/// into the channel.
#[derive(Clone, Debug)]
pub struct ProcessInterpreter {
    command: String,
    args: Vec<String>,
    mode: CommandSourceMode,
}

enum OutputEvent {
    Chunk(Vec<u8>),
    Closed,
}

impl ProcessInterpreter {
    pub fn new(command: impl Into<String>, args: Vec<String>, mode: CommandSourceMode) -> Self {
        Self {
            command: command.into(),
            args,
            mode,
        }
    }

    fn spawn(&self) -> Result<Child, InterpreterFault> {
        let stdin = match self.mode {
            CommandSourceMode::Channel => Stdio::piped(),
            CommandSourceMode::Console => Stdio::inherit(),
        };
        Command::new(&self.command)
            .args(&self.args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| InterpreterFault::Process {
                message: format!("'{}' could not be started: {err}", self.command),
                stderr: String::new(),
            })
    }
}

impl Interpreter for ProcessInterpreter {
    fn run(
        &mut self,
        channel: &mut dyn SessionChannel,
        cancel: &CancelFlag,
    ) -> Result<(), InterpreterFault> {
        let mut child = self.spawn()?;
        debug!(command = %self.command, pid = child.id(), "interpreter process started");
        let output = spawn_stdout_reader(&mut child);
        let stderr = spawn_stderr_reader(&mut child);
        let mut stdin = child.stdin.take();
        let mut decoder = Utf8Decoder::default();

        let pumped = pump(&output, &mut stdin, channel, cancel, &mut decoder);
        let tail = decoder.finish();
        if !tail.is_empty() {
            channel.write_output(&tail);
        }
        if let Err(fault) = pumped {
            if let Err(err) = child.kill() {
                debug!(error = %err, "interpreter process already gone");
            }
            let _ = child.wait();
            return Err(fault);
        }

        drop(stdin);
        let status = child.wait().map_err(|err| InterpreterFault::Process {
            message: format!("could not be awaited: {err}"),
            stderr: String::new(),
        })?;
        let stderr = stderr.join().unwrap_or_default();
        if status.success() {
            Ok(())
        } else {
            warn!(%status, "interpreter process ended unsuccessfully");
            Err(InterpreterFault::Process {
                message: format!("exited with {status}"),
                stderr,
            })
        }
    }
}

/// Move output into the channel and commands into the child until its
/// stdout closes.
fn pump(
    output: &Receiver<OutputEvent>,
    stdin: &mut Option<ChildStdin>,
    channel: &mut dyn SessionChannel,
    cancel: &CancelFlag,
    decoder: &mut Utf8Decoder,
) -> Result<(), InterpreterFault> {
    loop {
        // Let the interpreter finish responding before the next command.
        match drain_until_quiet(output, channel, cancel, decoder) {
            Drain::Quiet => {}
            Drain::Closed => return Ok(()),
            Drain::Cancelled => return Err(InterpreterFault::Cancelled),
        }
        let Some(pipe) = stdin.as_mut() else {
            continue;
        };
        match channel.read_command()? {
            Some(command) => {
                let sent = pipe
                    .write_all(command.as_bytes())
                    .and_then(|()| pipe.write_all(b"\n"))
                    .and_then(|()| pipe.flush());
                if let Err(err) = sent {
                    debug!(error = %err, "interpreter stopped reading commands");
                    *stdin = None;
                }
            }
            None => {
                debug!("command input exhausted");
                *stdin = None;
            }
        }
    }
}

enum Drain {
    Quiet,
    Closed,
    Cancelled,
}

/// Forward output until none arrives for the settle period, stdout closes,
/// or the run is cancelled.
fn drain_until_quiet(
    output: &Receiver<OutputEvent>,
    channel: &mut dyn SessionChannel,
    cancel: &CancelFlag,
    decoder: &mut Utf8Decoder,
) -> Drain {
    loop {
        if cancel.is_cancelled() {
            return Drain::Cancelled;
        }
        match output.recv_timeout(OUTPUT_SETTLE) {
            Ok(OutputEvent::Chunk(bytes)) => {
                let text = decoder.push(&bytes);
                if !text.is_empty() {
                    channel.write_output(&text);
                }
            }
            Ok(OutputEvent::Closed) | Err(RecvTimeoutError::Disconnected) => return Drain::Closed,
            Err(RecvTimeoutError::Timeout) => return Drain::Quiet,
        }
    }
}

fn spawn_stdout_reader(child: &mut Child) -> Receiver<OutputEvent> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut stdout) = child.stdout.take() {
        thread::spawn(move || {
            let mut buffer = [0u8; 4096];
            loop {
                match stdout.read(&mut buffer) {
                    Ok(0) | Err(_) => break,
                    Ok(count) => {
                        let chunk = buffer.get(..count).unwrap_or_default().to_vec();
                        if tx.send(OutputEvent::Chunk(chunk)).is_err() {
                            return;
                        }
                    }
                }
            }
            let _ = tx.send(OutputEvent::Closed);
        });
    }
    rx
}

fn spawn_stderr_reader(child: &mut Child) -> thread::JoinHandle<String> {
    let stderr = child.stderr.take();
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut stderr) = stderr {
            let mut bytes = Vec::new();
            if stderr.read_to_end(&mut bytes).is_ok() {
                text = String::from_utf8_lossy(&bytes).into_owned();
            }
        }
        text
    })
}

/// Decodes a byte stream into text without splitting multi-byte characters
/// across chunk boundaries.
#[derive(Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let text = text.to_string();
                self.pending.clear();
                text
            }
            // Incomplete sequence at the end: keep it for the next chunk.
            Err(err) if err.error_len().is_none() => {
                let valid = err.valid_up_to();
                let rest = self.pending.split_off(valid);
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending = rest;
                text
            }
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                text
            }
        }
    }

    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_keeps_split_multibyte_characters() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "café".as_bytes();
        let (head, tail) = bytes.split_at(bytes.len() - 1);
        assert_eq!(decoder.push(head), "caf");
        assert_eq!(decoder.push(tail), "é");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(&[b'a', 0xff, b'b']), "a\u{fffd}b");
    }

    #[test]
    fn process_fault_description_includes_stderr() {
        let fault = InterpreterFault::Process {
            message: "exited with exit status: 3".to_string(),
            stderr: "stack overflow\n".to_string(),
        };
        let text = fault.describe();
        assert!(text.contains("exited with exit status: 3"));
        assert!(text.ends_with("stderr:\nstack overflow"));
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}
