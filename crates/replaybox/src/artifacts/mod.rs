//! Files written beside a test definition and batch report output.
//!
//! Verification only ever writes `T.fail`; `T.out` is written by recording.
//! Transcript files are replaced atomically so an interrupted write never
//! leaves a truncated baseline behind.

use crate::model::TestCase;
use crate::runner::{RunnerError, RunnerResult};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Write the actual transcript of a failed or unjudged run to `T.fail`.
pub fn write_failure_artifact(case: &TestCase, transcript: &str) -> RunnerResult<PathBuf> {
    replace_file(&case.failure_path, transcript.as_bytes())?;
    debug!(case = %case.name, path = %case.failure_path.display(), "wrote failure artifact");
    Ok(case.failure_path.clone())
}

/// Accept `transcript` as the new baseline `T.out`.
pub fn write_baseline(case: &TestCase, transcript: &str) -> RunnerResult<PathBuf> {
    replace_file(&case.expected_path, transcript.as_bytes())?;
    debug!(case = %case.name, path = %case.expected_path.display(), "wrote baseline");
    Ok(case.expected_path.clone())
}

/// Delete a `T.fail` left by an earlier run. Returns whether one existed.
pub fn remove_stale_failure(case: &TestCase) -> RunnerResult<bool> {
    match fs::remove_file(&case.failure_path) {
        Ok(()) => {
            debug!(case = %case.name, "removed stale failure artifact");
            Ok(true)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(RunnerError::io(
            format!("failed to remove {}", case.failure_path.display()),
            err,
        )),
    }
}

/// Render build diagnostics for `T.fail`, keeping both streams verbatim.
pub fn format_build_failure(err: &RunnerError) -> String {
    let mut text = format!("{}\n", err.message);
    if let Some(stdout) = err.build_stdout().filter(|s| !s.is_empty()) {
        text.push_str("--- compiler stdout ---\n");
        text.push_str(stdout);
        if !stdout.ends_with('\n') {
            text.push('\n');
        }
    }
    if let Some(stderr) = err.build_stderr().filter(|s| !s.is_empty()) {
        text.push_str("--- compiler stderr ---\n");
        text.push_str(stderr);
        if !stderr.ends_with('\n') {
            text.push('\n');
        }
    }
    text
}

/// Write any serializable report as pretty JSON.
pub fn write_json_report<T: Serialize>(path: &Path, value: &T) -> RunnerResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|err| RunnerError::io("failed to create report directory", err))?;
    }
    let mut data = serde_json::to_vec_pretty(value)
        .map_err(|err| RunnerError::protocol("failed to serialize report", err))?;
    data.push(b'\n');
    replace_file(path, &data)
}

fn replace_file(path: &Path, data: &[u8]) -> RunnerResult<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)
        .map_err(|err| RunnerError::io(format!("failed to stage {}", path.display()), err))?;
    file.write_all(data)
        .and_then(|()| file.flush())
        .map_err(|err| RunnerError::io(format!("failed to write {}", path.display()), err))?;
    file.persist(path).map_err(|err| {
        warn!(path = %path.display(), error = %err, "could not replace file");
        RunnerError::io(format!("failed to replace {}", path.display()), err.error)
    })?;
    Ok(())
}
