//! Transcript normalization and comparison.
//!
//! Interpreter output embeds tokens that change from build to build without
//! changing behavior: the story serial number, the compiler build identifier,
//! and the library/version banner (in two toolchain formats). [`Comparator`]
//! erases those tokens from both transcripts and then requires the remainder
//! to be byte-for-byte identical, whitespace and line endings included.
//!
//! # Key Types
//!
//! - [`Comparator`] - Normalizing comparator; pure, holds only compiled rules
//! - [`Comparison`] - Result of one comparison, never cached
//!
//! # Example
//!
//! ```
//! use replaybox::compare::Comparator;
//!
//! let comparator = Comparator::standard();
//! let expected = "Release 1 / Serial number 040101 / Inform v6.30 Library 6/11\n";
//! let actual = "Release 1 / Serial number 160518 / Inform v6.33 Library 6/12N\n";
//! assert!(!comparator.differs(expected, actual));
//! assert!(comparator.differs("You see a room.\n", "You see a hall.\n"));
//! ```

use crate::model::{NormalizationConfig, NormalizationRule, MAX_REGEX_PATTERN_LEN};
use crate::runner::{RunnerError, RunnerResult};
use regex::{Regex, RegexBuilder};
use serde::Serialize;

/// Compiled program size cap for any normalization pattern.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Built-in volatile-token patterns. Matches are erased.
const STANDARD_PATTERNS: &[&str] = &[
    // six-digit serial number, e.g. "Serial number 160518"
    r"serial number \d{6}",
    // compiler build identifier, e.g. "Inform 7 build 6M62"
    r"inform 7 build \w+",
    r"\bbuild \d[a-z]\d{2}\b",
    // library/version token, parenthesized format: "(I6/v6.33 lib 6/12N)"
    r"\(I6/v\d+\.\d+ lib \d+/\d+\w*( \w+)?\)",
    // library/version token, banner format: "Inform v6.30 Library 6/11"
    r"inform v\d+\.\d+ library \d+/\d+\w*",
];

/// Compile a user or built-in pattern with length and size limits.
///
/// Patterns are matched case-insensitively.
pub fn compile_safe_regex(pattern: &str) -> RunnerResult<Regex> {
    if pattern.len() > MAX_REGEX_PATTERN_LEN {
        return Err(RunnerError::config(format!(
            "normalization pattern exceeds {MAX_REGEX_PATTERN_LEN} characters"
        )));
    }
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|err| RunnerError::config(format!("invalid normalization pattern '{pattern}': {err}")))
}

#[derive(Clone, Debug)]
struct CompiledRule {
    regex: Regex,
    replace: String,
}

/// Outcome of comparing an expected transcript with an actual one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Comparison {
    Match,
    /// First differing line (1-based) with both normalized lines; a side is
    /// `None` when that transcript has fewer lines.
    Differs {
        line: usize,
        expected: Option<String>,
        actual: Option<String>,
    },
}

impl Comparison {
    pub fn differs(&self) -> bool {
        matches!(self, Self::Differs { .. })
    }
}

/// Normalizing transcript comparator.
#[derive(Clone, Debug)]
pub struct Comparator {
    rules: Vec<CompiledRule>,
}

impl Comparator {
    /// Comparator with the built-in volatile-token rules.
    pub fn standard() -> Self {
        let rules = STANDARD_PATTERNS
            .iter()
            .filter_map(|pattern| compile_safe_regex(pattern).ok())
            .map(|regex| CompiledRule {
                regex,
                replace: String::new(),
            })
            .collect();
        Self { rules }
    }

    /// Exact comparison, no normalization at all.
    pub fn strict() -> Self {
        Self { rules: Vec::new() }
    }

    /// Build from configuration: built-in rules plus user rules, or nothing when strict.
    pub fn from_config(config: &NormalizationConfig) -> RunnerResult<Self> {
        if config.strict {
            return Ok(Self::strict());
        }
        Self::standard().with_rules(&config.rules)
    }

    /// Append user rules, applied after the existing ones.
    pub fn with_rules(mut self, rules: &[NormalizationRule]) -> RunnerResult<Self> {
        for rule in rules {
            self.rules.push(CompiledRule {
                regex: compile_safe_regex(&rule.pattern)?,
                replace: rule.replace.clone(),
            });
        }
        Ok(self)
    }

    pub fn normalize(&self, text: &str) -> String {
        let mut normalized = text.to_string();
        for rule in &self.rules {
            normalized = rule
                .regex
                .replace_all(&normalized, rule.replace.as_str())
                .into_owned();
        }
        normalized
    }

    pub fn compare(&self, expected: &str, actual: &str) -> Comparison {
        let expected = self.normalize(expected);
        let actual = self.normalize(actual);
        if expected == actual {
            return Comparison::Match;
        }
        first_difference(&expected, &actual)
    }

    pub fn differs(&self, expected: &str, actual: &str) -> bool {
        self.compare(expected, actual).differs()
    }
}

impl Default for Comparator {
    fn default() -> Self {
        Self::standard()
    }
}

/// Locate the first differing line. Lines keep their terminators so that a
/// `\r\n` versus `\n` difference is reported on the line where it occurs.
fn first_difference(expected: &str, actual: &str) -> Comparison {
    let mut expected_lines = expected.split_inclusive('\n');
    let mut actual_lines = actual.split_inclusive('\n');
    let mut line = 1;
    loop {
        match (expected_lines.next(), actual_lines.next()) {
            (Some(left), Some(right)) if left == right => line += 1,
            (None, None) => {
                // Only reachable when both inputs are equal.
                return Comparison::Differs {
                    line,
                    expected: None,
                    actual: None,
                };
            }
            (left, right) => {
                return Comparison::Differs {
                    line,
                    expected: left.map(str::to_string),
                    actual: right.map(str::to_string),
                };
            }
        }
    }
}
