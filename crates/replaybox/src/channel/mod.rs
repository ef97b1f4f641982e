//! Session I/O channels between the harness and an interpreter.
//!
//! An interpreter pulls commands with [`SessionChannel::read_command`] and
//! pushes output with [`SessionChannel::write_output`]. Every fragment lands in
//! a shared [`Transcript`] in emission order. Two variants exist:
//!
//! - [`ReplayChannel`] - feeds a recorded input log loaded up front
//! - [`RecordingChannel`] - forwards a live [`CommandSource`] and appends each
//!   consumed command to an [`InputLog`] as it happens
//!
//! # Example
//!
//! ```
//! use replaybox::channel::{ReplayChannel, SessionChannel};
//!
//! let mut channel = ReplayChannel::from_commands(["look", "inventory"]);
//! let transcript = channel.transcript();
//! while let Ok(Some(command)) = channel.read_command() {
//!     channel.write_output(&format!("> {command}\n"));
//! }
//! assert_eq!(transcript.freeze(), "> look\n> inventory\n");
//! ```

use crate::runner::{RunnerError, RunnerResult};
use std::collections::VecDeque;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure while obtaining the next command.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The live command source could not be read.
    #[error("live command source failed: {0}")]
    Source(#[source] io::Error),
    /// The consumed command could not be written to the input log.
    #[error("failed to append to input log {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Default)]
struct TranscriptState {
    text: String,
    frozen: bool,
}

/// Append-only output buffer shared between a channel and the harness.
///
/// Cloning yields another handle to the same buffer.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    state: Arc<Mutex<TranscriptState>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Ignored once the transcript is frozen.
    pub fn append(&self, fragment: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.frozen {
            state.text.push_str(fragment);
        }
    }

    /// Text accumulated so far; the run may still be going.
    pub fn snapshot(&self) -> String {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .text
            .clone()
    }

    /// End the run: stop accepting output and return the final text.
    pub fn freeze(&self) -> String {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.frozen = true;
        state.text.clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frozen
    }
}

/// Command input and output capture as seen by an interpreter.
pub trait SessionChannel: Send {
    /// Next command, or `None` once input is exhausted.
    fn read_command(&mut self) -> Result<Option<String>, ChannelError>;

    /// Append an output fragment to the transcript.
    fn write_output(&mut self, fragment: &str);

    /// Handle to the transcript this channel writes into.
    fn transcript(&self) -> Transcript;
}

/// Split an input log into commands, one per line. A trailing `\r` is dropped.
pub fn parse_input_log(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect()
}

/// Replays a recorded input log.
pub struct ReplayChannel {
    commands: VecDeque<String>,
    consumed: usize,
    transcript: Transcript,
}

impl ReplayChannel {
    /// Load the whole input log before any command is fed.
    pub fn open(path: &Path) -> RunnerResult<Self> {
        let text = fs::read_to_string(path).map_err(|err| {
            RunnerError::missing_fixture(
                format!("recorded input is missing or unreadable: {err}"),
                path,
            )
        })?;
        let commands = parse_input_log(&text);
        debug!(path = %path.display(), commands = commands.len(), "loaded input log");
        Ok(Self::from_commands(commands))
    }

    pub fn from_commands<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            consumed: 0,
            transcript: Transcript::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.commands.len()
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

impl SessionChannel for ReplayChannel {
    fn read_command(&mut self) -> Result<Option<String>, ChannelError> {
        let command = self.commands.pop_front();
        if command.is_some() {
            self.consumed += 1;
        }
        Ok(command)
    }

    fn write_output(&mut self, fragment: &str) {
        self.transcript.append(fragment);
    }

    fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }
}

/// Live origin of commands for a recording session.
pub trait CommandSource: Send {
    /// Next command, or `None` at end of input.
    fn next_command(&mut self) -> io::Result<Option<String>>;
}

/// Reads one command per line from any buffered reader, such as stdin.
pub struct LineSource<R> {
    reader: R,
    prompt: Option<(String, Box<dyn Write + Send>)>,
}

impl<R: BufRead + Send> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            prompt: None,
        }
    }

    /// Print `prompt` to `out` before each read.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>, out: Box<dyn Write + Send>) -> Self {
        self.prompt = Some((prompt.into(), out));
        self
    }
}

impl<R: BufRead + Send> CommandSource for LineSource<R> {
    fn next_command(&mut self) -> io::Result<Option<String>> {
        if let Some((prompt, out)) = self.prompt.as_mut() {
            out.write_all(prompt.as_bytes())?;
            out.flush()?;
        }
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }
}

/// In-memory command source, for scripted live sessions.
#[derive(Clone, Debug, Default)]
pub struct ScriptedSource {
    commands: VecDeque<String>,
}

impl ScriptedSource {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }
}

impl CommandSource for ScriptedSource {
    fn next_command(&mut self) -> io::Result<Option<String>> {
        Ok(self.commands.pop_front())
    }
}

/// Write-through recorded input log.
pub struct InputLog {
    path: PathBuf,
    file: fs::File,
    entries: usize,
}

impl InputLog {
    /// Create (or truncate) the log at `path`.
    pub fn create(path: &Path) -> RunnerResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|err| RunnerError::io("failed to create input log directory", err))?;
            }
        }
        let file = fs::File::create(path)
            .map_err(|err| RunnerError::io("failed to create input log", err))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            entries: 0,
        })
    }

    /// Log into a temporary file beside `target`.
    ///
    /// `target` is left untouched until [`StagedInput::commit`] moves the
    /// log over it. Dropping the [`StagedInput`] discards the log.
    pub fn staged(target: &Path) -> RunnerResult<(Self, StagedInput)> {
        let dir = match target.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .map_err(|err| RunnerError::io("failed to create input log directory", err))?;
        let staged = NamedTempFile::new_in(dir)
            .map_err(|err| RunnerError::io("failed to stage input log", err))?;
        let file = staged
            .reopen()
            .map_err(|err| RunnerError::io("failed to open staged input log", err))?;
        let log = Self {
            path: target.to_path_buf(),
            file,
            entries: 0,
        };
        Ok((
            log,
            StagedInput {
                file: staged,
                target: target.to_path_buf(),
            },
        ))
    }

    /// Append one command and flush it to disk immediately.
    pub fn append(&mut self, command: &str) -> io::Result<()> {
        self.file.write_all(command.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.file.flush()?;
        self.entries += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> usize {
        self.entries
    }
}

/// Pending input log created by [`InputLog::staged`].
#[derive(Debug)]
pub struct StagedInput {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedInput {
    /// Everything logged so far.
    pub fn contents(&self) -> RunnerResult<String> {
        fs::read_to_string(self.file.path())
            .map_err(|err| RunnerError::io("failed to read back input log", err))
    }

    /// Replace the target with the staged log.
    pub fn commit(self) -> RunnerResult<PathBuf> {
        let target = self.target;
        self.file.persist(&target).map_err(|err| {
            RunnerError::io(format!("failed to replace {}", target.display()), err.error)
        })?;
        debug!(path = %target.display(), "committed input log");
        Ok(target)
    }
}

/// Forwards a live source to the interpreter while recording every command.
pub struct RecordingChannel<S> {
    source: S,
    log: InputLog,
    transcript: Transcript,
    echo: Option<Box<dyn Write + Send>>,
}

impl<S: CommandSource> RecordingChannel<S> {
    pub fn new(source: S, log: InputLog) -> Self {
        Self {
            source,
            log,
            transcript: Transcript::new(),
            echo: None,
        }
    }

    /// Pass every output fragment through to `echo` as well as capturing it.
    #[must_use]
    pub fn with_echo(mut self, echo: Box<dyn Write + Send>) -> Self {
        self.echo = Some(echo);
        self
    }

    pub fn recorded(&self) -> usize {
        self.log.entries()
    }
}

impl<S: CommandSource> SessionChannel for RecordingChannel<S> {
    fn read_command(&mut self) -> Result<Option<String>, ChannelError> {
        let Some(command) = self.source.next_command().map_err(ChannelError::Source)? else {
            return Ok(None);
        };
        self.log.append(&command).map_err(|source| ChannelError::Log {
            path: self.log.path().to_path_buf(),
            source,
        })?;
        debug!(entry = self.log.entries(), "recorded command");
        Ok(Some(command))
    }

    fn write_output(&mut self, fragment: &str) {
        self.transcript.append(fragment);
        if let Some(echo) = self.echo.as_mut() {
            if let Err(err) = echo.write_all(fragment.as_bytes()).and_then(|()| echo.flush()) {
                warn!(error = %err, "failed to echo interpreter output");
            }
        }
    }

    fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }
}
