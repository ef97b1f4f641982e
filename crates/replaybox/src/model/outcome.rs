use crate::model::ids::{RunId, SessionId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Version of the batch report format.
pub const REPORT_VERSION: u32 = 1;

/// Why a case failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Normalized transcripts differ, starting at `line` (1-based).
    Mismatch { line: usize },
    /// The program under test could not be built.
    CompilationFailed,
    /// The program could not be loaded or the interpreter not created.
    Setup,
}

/// Why a case could not be judged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconclusiveReason {
    /// No recorded input; nothing to replay.
    MissingInput,
    /// Executed, but there is no accepted baseline to compare against.
    MissingBaseline,
}

/// Terminal state of one case.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseOutcome {
    Passed,
    Failed { reason: FailureReason },
    Inconclusive { reason: InconclusiveReason },
}

impl CaseOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed { .. } => "failed",
            Self::Inconclusive { .. } => "inconclusive",
        }
    }
}

/// How the interpreter run ended, if it ran at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    NotRun,
    Completed,
    Faulted,
    TimedOut,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    pub name: String,
    pub outcome: CaseOutcome,
    pub execution: ExecutionKind,
    /// Written failure artifact, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_artifact: Option<PathBuf>,
    /// Human-readable detail (fault text, build diagnostics, differing lines).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub duration_ms: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub passed: usize,
    pub failed: usize,
    pub inconclusive: usize,
}

/// Results of a batch, sorted by case name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchReport {
    pub report_version: u32,
    pub run_id: RunId,
    pub cases: Vec<CaseReport>,
    pub counts: BatchCounts,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn new(run_id: RunId, mut cases: Vec<CaseReport>, duration_ms: u64) -> Self {
        cases.sort_by(|a, b| a.name.cmp(&b.name));
        let mut counts = BatchCounts::default();
        for case in &cases {
            match case.outcome {
                CaseOutcome::Passed => counts.passed += 1,
                CaseOutcome::Failed { .. } => counts.failed += 1,
                CaseOutcome::Inconclusive { .. } => counts.inconclusive += 1,
            }
        }
        Self {
            report_version: REPORT_VERSION,
            run_id,
            cases,
            counts,
            duration_ms,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.counts.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|case| case.outcome.is_failed())
    }
}

/// Result of recording a new baseline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordReport {
    pub name: String,
    pub session_id: SessionId,
    pub execution: ExecutionKind,
    pub commands: usize,
    pub input_path: PathBuf,
    pub baseline_path: PathBuf,
}
