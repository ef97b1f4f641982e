//! Fluent builder for harness configurations used in tests.
//!
//! # Example
//!
//! ```ignore
//! use replaybox_fixtures::{temp_dir, ConfigBuilder};
//!
//! let dir = temp_dir("example");
//! let config = ConfigBuilder::new(&dir, "/usr/local/bin/glulxe")
//!     .with_deterministic_args(vec!["--rngseed".into(), "1".into()])
//!     .with_timeout_ms(5000)
//!     .build();
//! ```

use std::path::Path;

use replaybox::config::{CompilerConfig, HarnessConfig, InterpreterConfig};
use replaybox::model::NormalizationRule;

/// Fluent builder for [`HarnessConfig`].
///
/// Starts from the harness defaults with the cases root set and a short
/// timeout suitable for tests.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: HarnessConfig,
}

impl ConfigBuilder {
    /// Interpreter `command {program}` over cases in `cases_root`.
    #[must_use]
    pub fn new(cases_root: &Path, command: &str) -> Self {
        let mut config = HarnessConfig::new(InterpreterConfig {
            command: command.to_string(),
            args: vec!["{program}".to_string()],
            deterministic_args: Vec::new(),
        });
        config.cases_root = cases_root.to_path_buf();
        config.timeout_ms = 10_000;
        Self { config }
    }

    /// Interpreter is `/bin/sh -c SCRIPT {program}`; the program path is `$0`.
    #[must_use]
    pub fn shell(cases_root: &Path, script: &str) -> Self {
        Self::new(cases_root, "/bin/sh").with_args(vec![
            "-c".to_string(),
            script.to_string(),
            "{program}".to_string(),
        ])
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.config.interpreter.args = args;
        self
    }

    #[must_use]
    pub fn with_deterministic_args(mut self, args: Vec<String>) -> Self {
        self.config.interpreter.deterministic_args = args;
        self
    }

    #[must_use]
    pub fn with_compiler(mut self, command: &str, args: Vec<String>) -> Self {
        self.config.compiler = Some(CompilerConfig {
            command: command.to_string(),
            args,
            output_extension: "ulx".to_string(),
        });
        self
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.config.jobs = jobs;
        self
    }

    #[must_use]
    pub fn strict(mut self) -> Self {
        self.config.normalization.strict = true;
        self
    }

    #[must_use]
    pub fn with_rule(mut self, pattern: &str, replace: &str) -> Self {
        self.config.normalization.rules.push(NormalizationRule {
            pattern: pattern.to_string(),
            replace: replace.to_string(),
        });
        self
    }

    #[must_use]
    pub fn build(self) -> HarnessConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_builder_produces_valid_config() {
        let dir = std::env::temp_dir();
        let config = ConfigBuilder::shell(&dir, "cat").with_jobs(3).build();
        assert_eq!(config.interpreter.command, "/bin/sh");
        assert_eq!(config.interpreter.args.last().map(String::as_str), Some("{program}"));
        assert_eq!(config.jobs, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rules_and_strict_are_carried() {
        let dir = std::env::temp_dir();
        let config = ConfigBuilder::new(&dir, "glulxe")
            .with_rule(r"turn \d+", "turn N")
            .strict()
            .build();
        assert!(config.normalization.strict);
        assert_eq!(config.normalization.rules.len(), 1);
    }
}
