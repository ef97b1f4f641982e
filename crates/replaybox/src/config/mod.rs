//! Harness configuration, loaded from JSON or YAML.

use crate::compare::Comparator;
use crate::interpreter::PROGRAM_PLACEHOLDER;
use crate::model::{NormalizationConfig, ProgramForm};
use crate::provider::{OUTPUT_PLACEHOLDER, SOURCE_PLACEHOLDER};
use crate::runner::{RunnerError, RunnerResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "replaybox.json";
/// Per-case wall-clock limit unless configured otherwise.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// How to launch the virtual machine for one program.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterConfig {
    pub command: String,
    /// Arguments; `{program}` is replaced by the program path.
    #[serde(default = "default_interpreter_args")]
    pub args: Vec<String>,
    /// Appended when the run must be deterministic (fixed random seed).
    #[serde(default)]
    pub deterministic_args: Vec<String>,
}

/// How to build a source program.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    pub command: String,
    /// Arguments; `{source}` and `{output}` are replaced by paths.
    pub args: Vec<String>,
    #[serde(default = "default_output_extension")]
    pub output_extension: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default = "default_cases_root")]
    pub cases_root: PathBuf,
    pub interpreter: InterpreterConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler: Option<CompilerConfig>,
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,
    #[serde(default = "default_program_extensions")]
    pub program_extensions: Vec<String>,
    /// Zero disables the limit.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default)]
    pub normalization: NormalizationConfig,
}

fn default_cases_root() -> PathBuf {
    PathBuf::from("tests")
}

fn default_interpreter_args() -> Vec<String> {
    vec![PROGRAM_PLACEHOLDER.to_string()]
}

fn default_output_extension() -> String {
    "ulx".to_string()
}

fn default_source_extensions() -> Vec<String> {
    vec!["inf".to_string(), "ni".to_string()]
}

fn default_program_extensions() -> Vec<String> {
    ["ulx", "gblorb", "z5", "z8"]
        .iter()
        .map(|ext| (*ext).to_string())
        .collect()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_jobs() -> usize {
    1
}

impl HarnessConfig {
    /// Defaults for everything except the interpreter.
    pub fn new(interpreter: InterpreterConfig) -> Self {
        Self {
            cases_root: default_cases_root(),
            interpreter,
            compiler: None,
            source_extensions: default_source_extensions(),
            program_extensions: default_program_extensions(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            jobs: default_jobs(),
            normalization: NormalizationConfig::default(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then_some(Duration::from_millis(self.timeout_ms))
    }

    /// Classify a file by extension, or `None` if it does not define a test.
    pub fn form_of(&self, path: &Path) -> Option<ProgramForm> {
        let ext = path.extension()?.to_str()?;
        let matches = |known: &[String]| known.iter().any(|k| k.eq_ignore_ascii_case(ext));
        if matches(&self.source_extensions) {
            Some(ProgramForm::Source)
        } else if matches(&self.program_extensions) {
            Some(ProgramForm::Compiled)
        } else {
            None
        }
    }

    /// Resolve a relative `cases_root` against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.cases_root.is_relative() {
            self.cases_root = base.join(&self.cases_root);
        }
    }

    pub fn validate(&self) -> RunnerResult<()> {
        if self.interpreter.command.trim().is_empty() {
            return Err(RunnerError::config("interpreter.command must not be empty"));
        }
        if !self
            .interpreter
            .args
            .iter()
            .any(|arg| arg.contains(PROGRAM_PLACEHOLDER))
        {
            return Err(RunnerError::config(format!(
                "interpreter.args must contain the {PROGRAM_PLACEHOLDER} placeholder"
            )));
        }
        if let Some(compiler) = &self.compiler {
            if compiler.command.trim().is_empty() {
                return Err(RunnerError::config("compiler.command must not be empty"));
            }
            for placeholder in [SOURCE_PLACEHOLDER, OUTPUT_PLACEHOLDER] {
                if !compiler.args.iter().any(|arg| arg.contains(placeholder)) {
                    return Err(RunnerError::config(format!(
                        "compiler.args must contain the {placeholder} placeholder"
                    )));
                }
            }
            if compiler.output_extension.is_empty() {
                return Err(RunnerError::config("compiler.output_extension must not be empty"));
            }
        }
        if self.jobs == 0 {
            return Err(RunnerError::config("jobs must be at least 1"));
        }
        if self.source_extensions.is_empty() && self.program_extensions.is_empty() {
            return Err(RunnerError::config("no test definition extensions configured"));
        }
        if let Some(ext) = self
            .source_extensions
            .iter()
            .find(|ext| self.program_extensions.contains(ext))
        {
            return Err(RunnerError::config(format!(
                "extension '{ext}' is listed as both source and program"
            )));
        }
        Comparator::from_config(&self.normalization)?;
        Ok(())
    }
}

/// Load a config file; `.yaml`/`.yml` parse as YAML, anything else as JSON.
///
/// A relative `cases_root` is resolved against the file's directory.
pub fn load_config_file(path: &Path) -> RunnerResult<HarnessConfig> {
    let data = fs::read_to_string(path).map_err(|err| {
        RunnerError::io(format!("failed to read config file {}", path.display()), err)
    })?;
    let name = path.to_string_lossy();
    let mut config: HarnessConfig = if name.ends_with(".yaml") || name.ends_with(".yml") {
        serde_yml::from_str(&data).map_err(|err| RunnerError::protocol("failed to parse yaml config", err))?
    } else {
        serde_json::from_str(&data).map_err(|err| RunnerError::protocol("failed to parse json config", err))?
    };
    if let Some(dir) = path.parent() {
        config.resolve_paths(dir);
    }
    config.validate()?;
    Ok(config)
}
