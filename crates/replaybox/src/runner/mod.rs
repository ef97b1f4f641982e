//! Single-case and batch verification, plus baseline recording.
//!
//! A [`Runner`] owns everything a run needs: the discovered
//! [`TestRegistry`], a [`ProgramProvider`], an [`InterpreterFactory`] and a
//! [`Comparator`]. Each case gets a fresh program guard, interpreter, channel,
//! and transcript, so cases can run in any order or in parallel.

mod error;
pub mod progress;

pub use error::{ErrorCode, ErrorInfo, RunnerError, RunnerResult};
pub use progress::{NoopProgress, ProgressCallback, ProgressEvent};

use crate::artifacts;
use crate::channel::{parse_input_log, CommandSource, InputLog, RecordingChannel, ReplayChannel};
use crate::compare::{Comparator, Comparison};
use crate::config::{HarnessConfig, DEFAULT_TIMEOUT_MS};
use crate::discovery::TestRegistry;
use crate::driver::{execute, DriverOptions};
use crate::interpreter::{CancelFlag, InterpreterFactory, InterpreterOptions, ProcessInterpreterFactory};
use crate::model::{
    BatchReport, CaseOutcome, CaseReport, ExecutionKind, FailureReason, InconclusiveReason,
    RecordReport, RunId, SessionId, TestCase,
};
use crate::provider::{CompilerProvider, PrebuiltProvider, ProgramProvider};
use std::fs;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct RunnerOptions {
    /// Per-case wall-clock limit; `None` disables it.
    pub timeout: Option<Duration>,
    /// Worker threads for [`Runner::run_all`].
    pub jobs: usize,
    pub progress: Option<Arc<dyn ProgressCallback>>,
    /// Raised to abandon the running case(s), e.g. on Ctrl-C.
    pub abort: Option<CancelFlag>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
            jobs: 1,
            progress: None,
            abort: None,
        }
    }
}

impl RunnerOptions {
    fn emit(&self, event: &ProgressEvent) {
        if let Some(progress) = &self.progress {
            progress.on_progress(event);
        }
    }
}

pub struct Runner {
    registry: TestRegistry,
    provider: Box<dyn ProgramProvider>,
    factory: Box<dyn InterpreterFactory>,
    comparator: Comparator,
    options: RunnerOptions,
}

impl Runner {
    pub fn new(
        registry: TestRegistry,
        provider: Box<dyn ProgramProvider>,
        factory: Box<dyn InterpreterFactory>,
        comparator: Comparator,
    ) -> Self {
        Self {
            registry,
            provider,
            factory,
            comparator,
            options: RunnerOptions::default(),
        }
    }

    /// Discover cases and wire up the process interpreter and optional compiler.
    pub fn from_config(config: &HarnessConfig) -> RunnerResult<Self> {
        config.validate()?;
        let registry = TestRegistry::discover(config)?;
        let provider: Box<dyn ProgramProvider> = match &config.compiler {
            Some(compiler) => Box::new(CompilerProvider::new(compiler.clone())?),
            None => Box::new(PrebuiltProvider),
        };
        let factory = Box::new(ProcessInterpreterFactory::new(config.interpreter.clone())?);
        let comparator = Comparator::from_config(&config.normalization)?;
        Ok(Self::new(registry, provider, factory, comparator).with_options(RunnerOptions {
            timeout: config.timeout(),
            jobs: config.jobs,
            ..RunnerOptions::default()
        }))
    }

    #[must_use]
    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options_mut(&mut self) -> &mut RunnerOptions {
        &mut self.options
    }

    pub fn registry(&self) -> &TestRegistry {
        &self.registry
    }

    pub fn names(&self) -> Vec<String> {
        self.registry.names().map(str::to_string).collect()
    }

    pub fn case(&self, name: &str) -> RunnerResult<&TestCase> {
        self.registry.get(name)
    }

    /// Verify one case by name.
    pub fn run_case(&self, name: &str) -> RunnerResult<CaseReport> {
        let case = self.registry.get(name)?;
        Ok(self.verify(case, 1))
    }

    /// Verify every discovered case. Per-case problems never abort the batch.
    pub fn run_all(&self) -> BatchReport {
        let run_id = RunId::new();
        let started = Instant::now();
        let cases: Vec<&TestCase> = self.registry.cases().collect();
        self.options.emit(&ProgressEvent::BatchStarted {
            run_id,
            total_cases: cases.len(),
        });
        info!(%run_id, cases = cases.len(), jobs = self.options.jobs, "batch started");

        let jobs = self.options.jobs.clamp(1, cases.len().max(1));
        let reports = if jobs == 1 {
            cases
                .iter()
                .enumerate()
                .map(|(index, case)| self.verify(case, index + 1))
                .collect()
        } else {
            self.verify_parallel(&cases, jobs)
        };

        let batch = BatchReport::new(run_id, reports, elapsed_ms(started));
        self.options.emit(&ProgressEvent::BatchFinished {
            run_id,
            counts: batch.counts.clone(),
            duration_ms: batch.duration_ms,
        });
        info!(
            %run_id,
            passed = batch.counts.passed,
            failed = batch.counts.failed,
            inconclusive = batch.counts.inconclusive,
            "batch finished"
        );
        batch
    }

    fn verify_parallel(&self, cases: &[&TestCase], jobs: usize) -> Vec<CaseReport> {
        let next = AtomicUsize::new(0);
        let results = Mutex::new(Vec::with_capacity(cases.len()));
        thread::scope(|scope| {
            for _ in 0..jobs {
                scope.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(case) = cases.get(index) else {
                        return;
                    };
                    let report = self.verify(case, index + 1);
                    results
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(report);
                });
            }
        });
        results.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn verify(&self, case: &TestCase, case_index: usize) -> CaseReport {
        self.options.emit(&ProgressEvent::CaseStarted {
            name: case.name.clone(),
            case_index,
        });
        let started = Instant::now();
        let mut report = CaseReport {
            name: case.name.clone(),
            outcome: CaseOutcome::Passed,
            execution: ExecutionKind::NotRun,
            failure_artifact: None,
            detail: None,
            duration_ms: 0,
        };
        self.judge(case, &mut report);
        report.duration_ms = elapsed_ms(started);

        match &report.outcome {
            CaseOutcome::Failed { .. } => {
                warn!(case = %case.name, execution = ?report.execution, "case failed");
            }
            outcome => info!(case = %case.name, outcome = outcome.label(), "case finished"),
        }
        self.options.emit(&ProgressEvent::CaseFinished {
            report: report.clone(),
        });
        report
    }

    fn judge(&self, case: &TestCase, report: &mut CaseReport) {
        let channel = match ReplayChannel::open(&case.input_path) {
            Ok(channel) => channel,
            Err(err) => {
                report.outcome = CaseOutcome::Inconclusive {
                    reason: InconclusiveReason::MissingInput,
                };
                report.detail = Some(err.message);
                return;
            }
        };

        let guard = match self.provider.acquire(case) {
            Ok(guard) => guard,
            Err(err) => {
                let reason = if err.code == ErrorCode::CompilationFailed {
                    FailureReason::CompilationFailed
                } else {
                    FailureReason::Setup
                };
                report.outcome = CaseOutcome::Failed { reason };
                report.detail = Some(err.to_string());
                self.attach_failure(case, &artifacts::format_build_failure(&err), report);
                return;
            }
        };
        let interpreter = match self.factory.create(&guard, &InterpreterOptions::harness()) {
            Ok(interpreter) => interpreter,
            Err(err) => {
                report.outcome = CaseOutcome::Failed {
                    reason: FailureReason::Setup,
                };
                report.detail = Some(err.to_string());
                self.attach_failure(case, &format!("{err}\n"), report);
                return;
            }
        };

        debug!(case = %case.name, commands = channel.remaining(), "replaying");
        let execution = execute(interpreter, Box::new(channel), &self.driver_options(case));
        drop(guard);
        report.execution = execution.kind();
        report.detail = execution.fault();
        let actual = execution.into_transcript();

        let expected = match fs::read_to_string(&case.expected_path) {
            Ok(expected) => expected,
            Err(err) => {
                debug!(case = %case.name, error = %err, "no usable baseline");
                report.outcome = CaseOutcome::Inconclusive {
                    reason: InconclusiveReason::MissingBaseline,
                };
                self.attach_failure(case, &actual, report);
                return;
            }
        };

        match self.comparator.compare(&expected, &actual) {
            Comparison::Match => {
                report.outcome = CaseOutcome::Passed;
                if let Err(err) = artifacts::remove_stale_failure(case) {
                    warn!(case = %case.name, error = %err, "stale failure artifact kept");
                }
            }
            Comparison::Differs {
                line,
                expected,
                actual: got,
            } => {
                report.outcome = CaseOutcome::Failed {
                    reason: FailureReason::Mismatch { line },
                };
                let diff = format!(
                    "first difference at line {line}: expected {:?}, got {:?}",
                    expected.unwrap_or_default(),
                    got.unwrap_or_default()
                );
                report.detail = Some(match report.detail.take() {
                    Some(fault) => format!("{diff}\n{fault}"),
                    None => diff,
                });
                self.attach_failure(case, &actual, report);
            }
        }
    }

    fn attach_failure(&self, case: &TestCase, text: &str, report: &mut CaseReport) {
        match artifacts::write_failure_artifact(case, text) {
            Ok(path) => report.failure_artifact = Some(path),
            Err(err) => {
                warn!(case = %case.name, error = %err, "could not write failure artifact");
                let note = format!("failure artifact not written: {err}");
                report.detail = Some(match report.detail.take() {
                    Some(detail) => format!("{detail}\n{note}"),
                    None => note,
                });
            }
        }
    }

    fn driver_options(&self, case: &TestCase) -> DriverOptions {
        DriverOptions {
            timeout: self.options.timeout,
            abort: self.options.abort.clone(),
            label: Some(case.name.clone()),
        }
    }

    /// Record a new baseline from a live session.
    ///
    /// Every command taken from `source` is logged as it is consumed. When
    /// the session ends the log replaces `T.in` and the full transcript
    /// replaces `T.out`. Output is passed to `echo` as it arrives. No time
    /// limit applies. A cancelled session leaves both files untouched.
    pub fn record_case<S>(
        &self,
        name: &str,
        source: S,
        echo: Option<Box<dyn Write + Send>>,
    ) -> RunnerResult<RecordReport>
    where
        S: CommandSource + 'static,
    {
        let case = self.registry.get(name)?;
        let session_id = SessionId::new();
        info!(case = %case.name, %session_id, "recording session");

        let guard = self.provider.acquire(case)?;
        let interpreter = self.factory.create(&guard, &InterpreterOptions::harness())?;
        let (log, staged) = InputLog::staged(&case.input_path)?;
        let mut channel = RecordingChannel::new(source, log);
        if let Some(echo) = echo {
            channel = channel.with_echo(echo);
        }

        let options = DriverOptions {
            timeout: None,
            ..self.driver_options(case)
        };
        let execution = execute(interpreter, Box::new(channel), &options);
        drop(guard);
        if self.options.abort.as_ref().is_some_and(CancelFlag::is_cancelled) {
            return Err(RunnerError::new(
                ErrorCode::InterpreterFault,
                "recording cancelled; baseline left unchanged",
                serde_json::json!({ "name": case.name }),
            ));
        }
        let kind = execution.kind();
        if let Some(fault) = execution.fault() {
            warn!(case = %case.name, %fault, "recorded session ended with a fault");
        }
        let commands = parse_input_log(&staged.contents()?).len();
        let input_path = staged.commit()?;
        let baseline_path = artifacts::write_baseline(case, &execution.into_transcript())?;
        if let Err(err) = artifacts::remove_stale_failure(case) {
            warn!(case = %case.name, error = %err, "stale failure artifact kept");
        }

        Ok(RecordReport {
            name: case.name.clone(),
            session_id,
            execution: kind,
            commands,
            input_path,
            baseline_path,
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
