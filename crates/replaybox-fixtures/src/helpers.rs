//! Common test helper functions.
//!
//! These utilities reduce boilerplate in integration tests by providing
//! standard implementations for temp directories and case files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use replaybox::config::HarnessConfig;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Create a unique temporary directory for a test.
///
/// The directory name includes a timestamp and a per-process counter to
/// avoid collisions between parallel tests. The directory is created
/// immediately.
///
/// # Example
///
/// ```ignore
/// let dir = temp_dir("record");
/// // dir is something like /tmp/replaybox-record-1703520000000-0
/// ```
#[must_use]
pub fn temp_dir(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    dir.push(format!(
        "replaybox-{prefix}-{stamp}-{}-{sequence}",
        std::process::id()
    ));

    fs::create_dir_all(&dir).expect("failed to create temp directory");

    dir
}

/// Write a harness config as JSON.
pub fn write_config(path: &Path, config: &HarnessConfig) {
    let data = serde_json::to_vec_pretty(config).expect("failed to serialize config");
    fs::write(path, data).expect("failed to write config file");
}

/// Files making up one test case, written beside each other.
#[derive(Debug, Clone)]
pub struct CaseFiles<'a> {
    pub name: &'a str,
    pub extension: &'a str,
    pub program: &'a str,
    pub input: Option<&'a str>,
    pub baseline: Option<&'a str>,
}

impl<'a> CaseFiles<'a> {
    /// A compiled `.ulx` program with no fixtures yet.
    #[must_use]
    pub fn new(name: &'a str, program: &'a str) -> Self {
        Self {
            name,
            extension: "ulx",
            program,
            input: None,
            baseline: None,
        }
    }

    #[must_use]
    pub fn with_extension(mut self, extension: &'a str) -> Self {
        self.extension = extension;
        self
    }

    #[must_use]
    pub fn with_input(mut self, input: &'a str) -> Self {
        self.input = Some(input);
        self
    }

    #[must_use]
    pub fn with_baseline(mut self, baseline: &'a str) -> Self {
        self.baseline = Some(baseline);
        self
    }

    /// Write into `dir`; returns the definition file path.
    pub fn write(&self, dir: &Path) -> PathBuf {
        fs::create_dir_all(dir).expect("failed to create case directory");
        let program = dir.join(format!("{}.{}", self.name, self.extension));
        fs::write(&program, self.program).expect("failed to write program");
        if let Some(input) = self.input {
            fs::write(dir.join(format!("{}.in", self.name)), input).expect("failed to write input");
        }
        if let Some(baseline) = self.baseline {
            fs::write(dir.join(format!("{}.out", self.name)), baseline)
                .expect("failed to write baseline");
        }
        program
    }
}
