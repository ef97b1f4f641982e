//! Obtaining the program under test.
//!
//! A [`ProgramProvider`] turns a [`TestCase`] into loadable program bytes,
//! compiling from source when needed. The returned [`ProgramGuard`] owns any
//! temporary build output and removes it when dropped, on every exit path.

use crate::config::CompilerConfig;
use crate::model::{ProgramForm, TestCase};
use crate::runner::{RunnerError, RunnerResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Placeholder in compiler arguments replaced by the source path.
pub const SOURCE_PLACEHOLDER: &str = "{source}";
/// Placeholder in compiler arguments replaced by the output path.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Loaded program plus ownership of its temporary build directory.
#[derive(Debug)]
pub struct ProgramGuard {
    name: String,
    path: PathBuf,
    bytes: Vec<u8>,
    build_dir: Option<TempDir>,
}

impl ProgramGuard {
    /// Wrap a program that needs no cleanup.
    pub fn prebuilt(name: impl Into<String>, path: PathBuf, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            path,
            bytes,
            build_dir: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether dropping this guard deletes a temporary build.
    pub fn is_temporary(&self) -> bool {
        self.build_dir.is_some()
    }
}

impl Drop for ProgramGuard {
    fn drop(&mut self) {
        if let Some(dir) = self.build_dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!(case = %self.name, dir = %path.display(), "released build output"),
                Err(err) => {
                    warn!(case = %self.name, dir = %path.display(), error = %err, "failed to remove build output");
                }
            }
        }
    }
}

/// Produces program bytes for a test case.
pub trait ProgramProvider: Send + Sync {
    fn acquire(&self, case: &TestCase) -> RunnerResult<ProgramGuard>;
}

fn read_program(case: &TestCase, path: &Path) -> RunnerResult<Vec<u8>> {
    fs::read(path).map_err(|err| {
        RunnerError::new(
            crate::runner::ErrorCode::Io,
            format!("failed to read program for '{}'", case.name),
            serde_json::json!({ "path": path.display().to_string(), "source": err.to_string() }),
        )
    })
}

/// Loads compiled programs as they are; cannot build sources.
#[derive(Clone, Debug, Default)]
pub struct PrebuiltProvider;

impl ProgramProvider for PrebuiltProvider {
    fn acquire(&self, case: &TestCase) -> RunnerResult<ProgramGuard> {
        match case.form {
            ProgramForm::Compiled => {
                let bytes = read_program(case, &case.program)?;
                Ok(ProgramGuard::prebuilt(&case.name, case.program.clone(), bytes))
            }
            ProgramForm::Source => Err(RunnerError::compilation_failed(
                format!("'{}' is a source program and no compiler is configured", case.name),
                "",
                "",
            )),
        }
    }
}

/// Builds source programs with an external compiler into a temporary directory.
#[derive(Clone, Debug)]
pub struct CompilerProvider {
    config: CompilerConfig,
}

impl CompilerProvider {
    pub fn new(config: CompilerConfig) -> RunnerResult<Self> {
        if config.command.trim().is_empty() {
            return Err(RunnerError::config("compiler command is empty"));
        }
        Ok(Self { config })
    }

    fn compile(&self, case: &TestCase) -> RunnerResult<ProgramGuard> {
        let build_dir = tempfile::Builder::new()
            .prefix(&format!("replaybox-{}-", case.name))
            .tempdir()
            .map_err(|err| RunnerError::io("failed to create build directory", err))?;
        let output = build_dir
            .path()
            .join(format!("{}.{}", case.name, self.config.output_extension));
        let source = case.program.display().to_string();
        let target = output.display().to_string();
        let args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|arg| {
                arg.replace(SOURCE_PLACEHOLDER, &source)
                    .replace(OUTPUT_PLACEHOLDER, &target)
            })
            .collect();

        debug!(case = %case.name, command = %self.config.command, "compiling program");
        let result = Command::new(&self.config.command)
            .args(&args)
            .output()
            .map_err(|err| {
                RunnerError::compilation_failed(
                    format!("compiler '{}' could not be started: {err}", self.config.command),
                    "",
                    "",
                )
            })?;
        let stdout = String::from_utf8_lossy(&result.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
        if !result.status.success() {
            return Err(RunnerError::compilation_failed(
                format!("compiling '{}' failed ({})", case.name, result.status),
                stdout,
                stderr,
            ));
        }
        if !output.is_file() {
            return Err(RunnerError::compilation_failed(
                format!("compiler produced no output for '{}'", case.name),
                stdout,
                stderr,
            ));
        }
        let bytes = read_program(case, &output)?;
        Ok(ProgramGuard {
            name: case.name.clone(),
            path: output,
            bytes,
            build_dir: Some(build_dir),
        })
    }
}

impl ProgramProvider for CompilerProvider {
    fn acquire(&self, case: &TestCase) -> RunnerResult<ProgramGuard> {
        match case.form {
            ProgramForm::Compiled => PrebuiltProvider.acquire(case),
            ProgramForm::Source => self.compile(case),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ErrorCode;

    fn case_in(dir: &Path, file: &str, form: ProgramForm) -> TestCase {
        let path = dir.join(file);
        TestCase::from_definition(&path, form).unwrap_or_else(|| panic!("bad definition {file}"))
    }

    #[test]
    fn prebuilt_reads_compiled_program() {
        let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
        fs::write(dir.path().join("greet.ulx"), b"GLUL").unwrap_or_else(|err| panic!("{err}"));
        let case = case_in(dir.path(), "greet.ulx", ProgramForm::Compiled);
        let guard = PrebuiltProvider
            .acquire(&case)
            .unwrap_or_else(|err| panic!("acquire: {err}"));
        assert_eq!(guard.bytes(), b"GLUL");
        assert!(!guard.is_temporary());
    }

    #[test]
    fn prebuilt_rejects_source_programs() {
        let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let case = case_in(dir.path(), "greet.inf", ProgramForm::Source);
        let Err(err) = PrebuiltProvider.acquire(&case) else {
            panic!("source should not load without a compiler");
        };
        assert_eq!(err.code, ErrorCode::CompilationFailed);
    }

    #[cfg(unix)]
    #[test]
    fn compiler_output_is_removed_when_guard_drops() {
        let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
        fs::write(dir.path().join("greet.inf"), b"story").unwrap_or_else(|err| panic!("{err}"));
        let case = case_in(dir.path(), "greet.inf", ProgramForm::Source);
        let provider = CompilerProvider::new(CompilerConfig {
            command: "/bin/cp".to_string(),
            args: vec!["{source}".to_string(), "{output}".to_string()],
            output_extension: "ulx".to_string(),
        })
        .unwrap_or_else(|err| panic!("provider: {err}"));

        let guard = provider
            .acquire(&case)
            .unwrap_or_else(|err| panic!("acquire: {err}"));
        let built = guard.path().to_path_buf();
        assert!(guard.is_temporary());
        assert_eq!(guard.bytes(), b"story");
        assert!(built.exists());
        drop(guard);
        assert!(!built.exists());
    }

    #[cfg(unix)]
    #[test]
    fn compiler_failure_captures_both_streams() {
        let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let case = case_in(dir.path(), "broken.inf", ProgramForm::Source);
        let provider = CompilerProvider::new(CompilerConfig {
            command: "/bin/sh".to_string(),
            args: vec![
                "-c".to_string(),
                "echo compiling; echo 'line 3: syntax error' >&2; exit 1".to_string(),
            ],
            output_extension: "ulx".to_string(),
        })
        .unwrap_or_else(|err| panic!("provider: {err}"));

        let Err(err) = provider.acquire(&case) else {
            panic!("compile should fail");
        };
        assert_eq!(err.code, ErrorCode::CompilationFailed);
        assert_eq!(err.build_stdout(), Some("compiling\n"));
        assert_eq!(err.build_stderr(), Some("line 3: syntax error\n"));
    }
}
