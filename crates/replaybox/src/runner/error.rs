use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

pub type RunnerResult<T> = Result<T, RunnerError>;

/// Stable error codes surfaced in reports and mapped to process exit codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Recorded input or expected output file is absent or unreadable.
    #[serde(rename = "E_MISSING_FIXTURE")]
    MissingFixture,
    /// The program under test could not be built from source.
    #[serde(rename = "E_COMPILATION_FAILED")]
    CompilationFailed,
    /// The interpreter raised a runtime fault.
    #[serde(rename = "E_INTERPRETER_FAULT")]
    InterpreterFault,
    /// Normalized transcripts differ.
    #[serde(rename = "E_COMPARISON_MISMATCH")]
    ComparisonMismatch,
    /// No test case with the requested name was discovered.
    #[serde(rename = "E_UNKNOWN_CASE")]
    UnknownCase,
    /// Two test definitions share a base name.
    #[serde(rename = "E_DUPLICATE_CASE")]
    DuplicateCase,
    /// Harness configuration is invalid.
    #[serde(rename = "E_CONFIG")]
    Config,
    /// Filesystem or process I/O failed.
    #[serde(rename = "E_IO")]
    Io,
    /// A file could not be parsed or serialized.
    #[serde(rename = "E_PROTOCOL")]
    Protocol,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingFixture => "E_MISSING_FIXTURE",
            Self::CompilationFailed => "E_COMPILATION_FAILED",
            Self::InterpreterFault => "E_INTERPRETER_FAULT",
            Self::ComparisonMismatch => "E_COMPARISON_MISMATCH",
            Self::UnknownCase => "E_UNKNOWN_CASE",
            Self::DuplicateCase => "E_DUPLICATE_CASE",
            Self::Config => "E_CONFIG",
            Self::Io => "E_IO",
            Self::Protocol => "E_PROTOCOL",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        let parsed = match code {
            "E_MISSING_FIXTURE" => Self::MissingFixture,
            "E_COMPILATION_FAILED" => Self::CompilationFailed,
            "E_INTERPRETER_FAULT" => Self::InterpreterFault,
            "E_COMPARISON_MISMATCH" => Self::ComparisonMismatch,
            "E_UNKNOWN_CASE" => Self::UnknownCase,
            "E_DUPLICATE_CASE" => Self::DuplicateCase,
            "E_CONFIG" => Self::Config,
            "E_IO" => Self::Io,
            "E_PROTOCOL" => Self::Protocol,
            _ => return None,
        };
        Some(parsed)
    }

    /// Process exit code used by the CLI when this error ends a command.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::ComparisonMismatch => 1,
            Self::Config => 2,
            Self::InterpreterFault => 6,
            Self::Protocol => 9,
            Self::Io => 10,
            Self::MissingFixture => 11,
            Self::CompilationFailed => 12,
            Self::UnknownCase => 13,
            Self::DuplicateCase => 14,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error payload written into JSON reports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

#[derive(Debug)]
pub struct RunnerError {
    pub code: ErrorCode,
    pub message: String,
    pub context: Option<Value>,
}

impl RunnerError {
    pub fn new(code: ErrorCode, message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self {
            code,
            message: message.into(),
            context: context.into(),
        }
    }

    pub fn io(message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::Io,
            message,
            serde_json::json!({ "source": err.to_string() }),
        )
    }

    pub fn protocol(message: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::Protocol,
            message,
            serde_json::json!({ "source": err.to_string() }),
        )
    }

    pub fn missing_fixture(message: impl Into<String>, path: &Path) -> Self {
        Self::new(
            ErrorCode::MissingFixture,
            message,
            serde_json::json!({ "path": path.display().to_string() }),
        )
    }

    /// Build failure; both captured streams are kept verbatim.
    pub fn compilation_failed(
        message: impl Into<String>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::CompilationFailed,
            message,
            serde_json::json!({ "stdout": stdout.into(), "stderr": stderr.into() }),
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Config, message, None)
    }

    pub fn unknown_case(name: &str) -> Self {
        Self::new(
            ErrorCode::UnknownCase,
            format!("no test case named '{name}'"),
            serde_json::json!({ "name": name }),
        )
    }

    pub fn duplicate_case(name: &str, first: &Path, second: &Path) -> Self {
        Self::new(
            ErrorCode::DuplicateCase,
            format!("test case name '{name}' is defined twice"),
            serde_json::json!({
                "name": name,
                "first": first.display().to_string(),
                "second": second.display().to_string(),
            }),
        )
    }

    /// Captured build stdout, if this is a compilation failure.
    pub fn build_stdout(&self) -> Option<&str> {
        self.context_str("stdout")
    }

    /// Captured build stderr, if this is a compilation failure.
    pub fn build_stderr(&self) -> Option<&str> {
        self.context_str("stderr")
    }

    fn context_str(&self, key: &str) -> Option<&str> {
        self.context.as_ref()?.get(key)?.as_str()
    }

    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }

    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code,
            message: self.message.clone(),
            context: self.context.clone(),
        }
    }
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RunnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl Diagnostic for RunnerError {}
