//! Test case discovery over a cases directory tree.

use crate::config::HarnessConfig;
use crate::model::{ProgramForm, TestCase};
use crate::runner::{RunnerError, RunnerResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Discovered test cases keyed by unique base name.
#[derive(Clone, Debug, Default)]
pub struct TestRegistry {
    cases: BTreeMap<String, TestCase>,
}

impl TestRegistry {
    /// Scan `config.cases_root` recursively for test definitions.
    pub fn discover(config: &HarnessConfig) -> RunnerResult<Self> {
        Self::discover_with(&config.cases_root, |path| config.form_of(path))
    }

    /// Scan `root` recursively, classifying files with `classify`.
    pub fn discover_with<F>(root: &Path, classify: F) -> RunnerResult<Self>
    where
        F: Fn(&Path) -> Option<ProgramForm>,
    {
        if !root.is_dir() {
            return Err(RunnerError::new(
                crate::runner::ErrorCode::Config,
                format!("cases root {} is not a readable directory", root.display()),
                serde_json::json!({ "path": root.display().to_string() }),
            ));
        }
        let mut definitions = Vec::new();
        collect_definitions(root, &classify, &mut definitions)?;
        let cases = definitions
            .into_iter()
            .filter_map(|(path, form)| TestCase::from_definition(&path, form));
        let registry = Self::from_cases(cases)?;
        debug!(root = %root.display(), cases = registry.len(), "discovered test cases");
        Ok(registry)
    }

    /// Build a registry from known cases, rejecting duplicate names.
    pub fn from_cases<I>(cases: I) -> RunnerResult<Self>
    where
        I: IntoIterator<Item = TestCase>,
    {
        let mut registry = Self::default();
        for case in cases {
            if let Some(existing) = registry.cases.get(&case.name) {
                return Err(RunnerError::duplicate_case(
                    &case.name,
                    &existing.program,
                    &case.program,
                ));
            }
            registry.cases.insert(case.name.clone(), case);
        }
        Ok(registry)
    }

    /// Case names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cases.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> RunnerResult<&TestCase> {
        self.cases
            .get(name)
            .ok_or_else(|| RunnerError::unknown_case(name))
    }

    pub fn cases(&self) -> impl Iterator<Item = &TestCase> {
        self.cases.values()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

fn collect_definitions<F>(
    root: &Path,
    classify: &F,
    out: &mut Vec<(PathBuf, ProgramForm)>,
) -> RunnerResult<()>
where
    F: Fn(&Path) -> Option<ProgramForm>,
{
    let entries = fs::read_dir(root)
        .map_err(|err| RunnerError::io(format!("failed to read {}", root.display()), err))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|err| RunnerError::io(format!("failed to read {}", root.display()), err))?;
        paths.push(entry.path());
    }
    collect_paths(paths, classify, out);
    Ok(())
}

/// Below the root an unreadable directory is skipped, not fatal.
fn collect_subdir<F>(dir: &Path, classify: &F, out: &mut Vec<(PathBuf, ProgramForm)>)
where
    F: Fn(&Path) -> Option<ProgramForm>,
{
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "skipping unreadable directory");
            return;
        }
    };
    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) => paths.push(entry.path()),
            Err(err) => warn!(dir = %dir.display(), error = %err, "skipping unreadable entry"),
        }
    }
    collect_paths(paths, classify, out);
}

fn collect_paths<F>(mut paths: Vec<PathBuf>, classify: &F, out: &mut Vec<(PathBuf, ProgramForm)>)
where
    F: Fn(&Path) -> Option<ProgramForm>,
{
    paths.sort();
    for path in paths {
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            collect_subdir(&path, classify, out);
        } else if let Some(form) = classify(&path) {
            out.push((path, form));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ErrorCode;

    fn classify(path: &Path) -> Option<ProgramForm> {
        match path.extension()?.to_str()? {
            "inf" => Some(ProgramForm::Source),
            "ulx" => Some(ProgramForm::Compiled),
            _ => None,
        }
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap_or_else(|err| panic!("mkdir: {err}"));
        }
        fs::write(path, b"").unwrap_or_else(|err| panic!("write: {err}"));
    }

    #[test]
    fn discovers_definitions_recursively_and_ignores_fixtures() {
        let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
        touch(&dir.path().join("greet.inf"));
        touch(&dir.path().join("greet.in"));
        touch(&dir.path().join("greet.out"));
        touch(&dir.path().join("rooms/cellar.ulx"));
        touch(&dir.path().join(".hidden/secret.inf"));

        let registry = TestRegistry::discover_with(dir.path(), classify)
            .unwrap_or_else(|err| panic!("discover: {err}"));
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["cellar", "greet"]);
        let cellar = registry.get("cellar").unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(cellar.form, ProgramForm::Compiled);
        assert_eq!(cellar.expected_path, dir.path().join("rooms/cellar.out"));
    }

    #[test]
    fn duplicate_base_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
        touch(&dir.path().join("a/greet.inf"));
        touch(&dir.path().join("b/greet.ulx"));
        let Err(err) = TestRegistry::discover_with(dir.path(), classify) else {
            panic!("duplicate should be rejected");
        };
        assert_eq!(err.code, ErrorCode::DuplicateCase);
    }

    #[test]
    fn missing_root_is_fatal() {
        let Err(err) = TestRegistry::discover_with(Path::new("/nonexistent/cases"), classify) else {
            panic!("missing root should fail");
        };
        assert_eq!(err.code, ErrorCode::Config);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subdirectory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
        touch(&dir.path().join("greet.inf"));
        let locked = dir.path().join("locked");
        touch(&locked.join("cellar.ulx"));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000))
            .unwrap_or_else(|err| panic!("chmod: {err}"));

        let result = TestRegistry::discover_with(dir.path(), classify);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))
            .unwrap_or_else(|err| panic!("chmod: {err}"));

        let registry = result.unwrap_or_else(|err| panic!("discover: {err}"));
        assert!(registry.names().any(|name| name == "greet"));
    }

    #[test]
    fn unknown_name_is_reported() {
        let registry = TestRegistry::default();
        let Err(err) = registry.get("nope") else {
            panic!("lookup should fail");
        };
        assert_eq!(err.code, ErrorCode::UnknownCase);
    }
}
