//! Execution driver: runs one interpreter against one channel and always
//! returns a transcript.
//!
//! The interpreter runs on its own named thread. Whatever happens there
//! (normal halt, runtime fault, panic, or no result within the time limit)
//! becomes an [`Execution`] value; nothing propagates past [`execute`].

use crate::channel::{ChannelError, SessionChannel, Transcript};
use crate::interpreter::{CancelFlag, Interpreter, InterpreterFault};
use crate::model::ExecutionKind;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Opening line of the diagnostic block appended to faulted transcripts.
pub const FAULT_BLOCK_START: &str = "*** interpreter fault ***";
/// Closing line of the diagnostic block.
pub const FAULT_BLOCK_END: &str = "*** end of fault ***";

/// How often the waiting side checks the abort flag.
const WAIT_SLICE: Duration = Duration::from_millis(50);

#[derive(Clone, Debug, Default)]
pub struct DriverOptions {
    /// Wall-clock limit for the run; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// External abort (e.g. Ctrl-C). Raising it ends the run as a fault.
    pub abort: Option<CancelFlag>,
    /// Suffix for the worker thread name.
    pub label: Option<String>,
}

impl DriverOptions {
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// How a run ended, with everything the interpreter wrote before that.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Execution {
    Completed { transcript: String },
    Faulted { transcript: String, fault: String },
    TimedOut { transcript: String, limit: Duration },
}

impl Execution {
    pub fn kind(&self) -> ExecutionKind {
        match self {
            Self::Completed { .. } => ExecutionKind::Completed,
            Self::Faulted { .. } => ExecutionKind::Faulted,
            Self::TimedOut { .. } => ExecutionKind::TimedOut,
        }
    }

    /// Fault or timeout description, if the run did not complete.
    pub fn fault(&self) -> Option<String> {
        match self {
            Self::Completed { .. } => None,
            Self::Faulted { fault, .. } => Some(fault.clone()),
            Self::TimedOut { limit, .. } => Some(timeout_description(*limit)),
        }
    }

    /// Single transcript: partial output followed by the diagnostic block
    /// when the run did not complete.
    pub fn into_transcript(self) -> String {
        match self {
            Self::Completed { transcript } => transcript,
            Self::Faulted { transcript, fault } => with_fault_block(transcript, &fault),
            Self::TimedOut { transcript, limit } => {
                with_fault_block(transcript, &timeout_description(limit))
            }
        }
    }
}

fn timeout_description(limit: Duration) -> String {
    format!("no result after {} ms; run abandoned", limit.as_millis())
}

fn with_fault_block(mut transcript: String, description: &str) -> String {
    transcript.push('\n');
    transcript.push_str(FAULT_BLOCK_START);
    transcript.push('\n');
    transcript.push_str(description);
    transcript.push('\n');
    transcript.push_str(FAULT_BLOCK_END);
    transcript.push('\n');
    transcript
}

/// Stops handing out commands once the run is cancelled.
struct GuardedChannel {
    inner: Box<dyn SessionChannel>,
    cancel: CancelFlag,
}

impl SessionChannel for GuardedChannel {
    fn read_command(&mut self) -> Result<Option<String>, ChannelError> {
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        self.inner.read_command()
    }

    fn write_output(&mut self, fragment: &str) {
        self.inner.write_output(fragment);
    }

    fn transcript(&self) -> Transcript {
        self.inner.transcript()
    }
}

type RunResult = thread::Result<Result<(), InterpreterFault>>;

/// Run `interpreter` to completion against `channel`.
pub fn execute(
    mut interpreter: Box<dyn Interpreter>,
    channel: Box<dyn SessionChannel>,
    options: &DriverOptions,
) -> Execution {
    let transcript = channel.transcript();
    let cancel = CancelFlag::new();
    let mut guarded = GuardedChannel {
        inner: channel,
        cancel: cancel.clone(),
    };
    let worker_cancel = cancel.clone();
    let (tx, rx) = mpsc::channel::<RunResult>();
    let name = match &options.label {
        Some(label) => format!("replaybox-run-{label}"),
        None => "replaybox-run".to_string(),
    };

    let spawned = thread::Builder::new().name(name).spawn(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            interpreter.run(&mut guarded, &worker_cancel)
        }));
        let _ = tx.send(result);
    });
    let handle = match spawned {
        Ok(handle) => handle,
        Err(err) => {
            return Execution::Faulted {
                transcript: transcript.freeze(),
                fault: format!("worker thread could not be started: {err}"),
            };
        }
    };

    let started = Instant::now();
    loop {
        let wait = match options.timeout {
            Some(limit) => match limit.checked_sub(started.elapsed()) {
                Some(left) => left.min(WAIT_SLICE),
                None => {
                    cancel.cancel();
                    warn!(limit_ms = limit.as_millis(), "interpreter timed out; abandoning run");
                    return Execution::TimedOut {
                        transcript: transcript.freeze(),
                        limit,
                    };
                }
            },
            None => WAIT_SLICE,
        };
        if options.abort.as_ref().is_some_and(CancelFlag::is_cancelled) {
            cancel.cancel();
            warn!("run aborted");
            return Execution::Faulted {
                transcript: transcript.freeze(),
                fault: InterpreterFault::Cancelled.to_string(),
            };
        }
        match rx.recv_timeout(wait) {
            Ok(result) => {
                if handle.join().is_err() {
                    debug!("worker thread ended abnormally after reporting");
                }
                return finish(result, &transcript);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Execution::Faulted {
                    transcript: transcript.freeze(),
                    fault: "interpreter thread ended without a result".to_string(),
                };
            }
        }
    }
}

fn finish(result: RunResult, transcript: &Transcript) -> Execution {
    match result {
        Ok(Ok(())) => Execution::Completed {
            transcript: transcript.freeze(),
        },
        Ok(Err(fault)) => {
            warn!(fault = %fault, "interpreter faulted");
            Execution::Faulted {
                transcript: transcript.freeze(),
                fault: fault.describe(),
            }
        }
        Err(payload) => {
            let fault = InterpreterFault::Panicked(panic_message(payload.as_ref()));
            warn!(fault = %fault, "interpreter panicked");
            Execution::Faulted {
                transcript: transcript.freeze(),
                fault: fault.describe(),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
