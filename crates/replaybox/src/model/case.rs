use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Suffix of the recorded input log.
pub const INPUT_SUFFIX: &str = "in";
/// Suffix of the accepted baseline transcript.
pub const EXPECTED_SUFFIX: &str = "out";
/// Suffix of the transcript written on mismatch, fault, or missing baseline.
pub const FAILURE_SUFFIX: &str = "fail";

/// Whether a test definition must be built before the interpreter can load it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramForm {
    /// Needs a compile step.
    Source,
    /// Loadable by the interpreter as-is.
    Compiled,
}

/// Immutable descriptor of one test case and its fixture files.
///
/// All paths share the test's base name and directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub program: PathBuf,
    pub form: ProgramForm,
    pub input_path: PathBuf,
    pub expected_path: PathBuf,
    pub failure_path: PathBuf,
}

impl TestCase {
    /// Build a descriptor from a definition file, deriving fixture paths by suffix.
    ///
    /// Returns `None` when the file has no usable base name.
    pub fn from_definition(program: &Path, form: ProgramForm) -> Option<Self> {
        let name = program.file_stem()?.to_str()?.to_string();
        if name.is_empty() {
            return None;
        }
        let dir = program.parent().unwrap_or_else(|| Path::new(""));
        Some(Self {
            input_path: dir.join(format!("{name}.{INPUT_SUFFIX}")),
            expected_path: dir.join(format!("{name}.{EXPECTED_SUFFIX}")),
            failure_path: dir.join(format!("{name}.{FAILURE_SUFFIX}")),
            program: program.to_path_buf(),
            form,
            name,
        })
    }

    pub fn has_input(&self) -> bool {
        self.input_path.is_file()
    }

    pub fn has_baseline(&self) -> bool {
        self.expected_path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_paths_share_base_name_and_directory() {
        let case = TestCase::from_definition(Path::new("/cases/rooms/greet.inf"), ProgramForm::Source);
        let Some(case) = case else {
            panic!("expected a descriptor");
        };
        assert_eq!(case.name, "greet");
        assert_eq!(case.input_path, Path::new("/cases/rooms/greet.in"));
        assert_eq!(case.expected_path, Path::new("/cases/rooms/greet.out"));
        assert_eq!(case.failure_path, Path::new("/cases/rooms/greet.fail"));
    }

    #[test]
    fn definition_without_stem_is_rejected() {
        assert!(TestCase::from_definition(Path::new("/"), ProgramForm::Compiled).is_none());
    }
}
