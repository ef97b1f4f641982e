//! Verbose progress output using indicatif.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use replaybox::model::CaseOutcome;
use replaybox::runner::{ProgressCallback, ProgressEvent};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Mutex;

/// Progress callback that reports each case to stderr as it runs.
///
/// Cases may run on several workers at once, so each gets its own spinner.
pub struct VerboseProgress {
    bars: MultiProgress,
    spinners: Mutex<BTreeMap<String, ProgressBar>>,
    total_cases: Mutex<usize>,
}

impl VerboseProgress {
    /// Create a new verbose progress callback.
    pub fn new() -> Self {
        Self {
            bars: MultiProgress::with_draw_target(ProgressDrawTarget::stderr()),
            spinners: Mutex::new(BTreeMap::new()),
            total_cases: Mutex::new(0),
        }
    }

    fn println(&self, line: &str) {
        // Hidden draw targets swallow println (e.g. stderr is not a tty).
        if self.bars.is_hidden() || self.bars.println(line).is_err() {
            let _ = writeln!(std::io::stderr(), "{line}");
        }
    }
}

impl ProgressCallback for VerboseProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::BatchStarted {
                run_id,
                total_cases,
            } => {
                if let Ok(mut total) = self.total_cases.lock() {
                    *total = *total_cases;
                }
                self.println(&format!("batch started: {run_id} ({total_cases} cases)"));
            }
            ProgressEvent::CaseStarted { name, case_index } => {
                let total = self.total_cases.lock().map(|g| *g).unwrap_or(0);
                let pb = self.bars.add(ProgressBar::new_spinner());
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                if total > 0 {
                    pb.set_message(format!("[{case_index}/{total}] {name}"));
                } else {
                    pb.set_message(name.clone());
                }
                pb.enable_steady_tick(std::time::Duration::from_millis(100));

                if let Ok(mut spinners) = self.spinners.lock() {
                    spinners.insert(name.clone(), pb);
                }
            }
            ProgressEvent::CaseFinished { report } => {
                if let Ok(mut spinners) = self.spinners.lock() {
                    if let Some(pb) = spinners.remove(&report.name) {
                        pb.finish_and_clear();
                        self.bars.remove(&pb);
                    }
                }

                let status_icon = match report.outcome {
                    CaseOutcome::Passed => "\x1b[32m✓\x1b[0m",
                    CaseOutcome::Failed { .. } => "\x1b[31m✗\x1b[0m",
                    CaseOutcome::Inconclusive { .. } => "\x1b[33m?\x1b[0m",
                };
                self.println(&format!(
                    "  {status_icon} {} ({}ms)",
                    report.name, report.duration_ms
                ));
                if !report.outcome.is_passed() {
                    if let Some(detail) = &report.detail {
                        for line in detail.lines() {
                            self.println(&format!("      {line}"));
                        }
                    }
                }
            }
            ProgressEvent::BatchFinished {
                run_id: _,
                counts,
                duration_ms,
            } => {
                let status_msg = if counts.failed == 0 {
                    "\x1b[32mpassed\x1b[0m"
                } else {
                    "\x1b[31mfailed\x1b[0m"
                };
                self.println(&format!("batch {status_msg}: {duration_ms}ms total"));
            }
        }
    }
}
