// Harness configuration shared by every grading run
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_RUN_DIR: &str = "/grade/run";

/// Where the harness finds its inputs and drops its outputs
///
/// Relative paths are resolved against `run_dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub run_dir: PathBuf,
    /// File naming the output document path; consumed on read
    pub descriptor: PathBuf,
    /// Placeholder file written next to every successful run
    pub diagnostic: PathBuf,
    /// Run-wide captured output text; consumed on read
    pub output_capture: PathBuf,
    /// Where the failure document goes if the descriptor is unreadable
    pub fallback_output: PathBuf,
    pub student_code: Option<PathBuf>,
    /// Stop starting new tests once a run is marked done grading
    pub stop_when_done: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            run_dir: PathBuf::from(DEFAULT_RUN_DIR),
            descriptor: PathBuf::from("filenames/output-fname.txt"),
            diagnostic: PathBuf::from("results_test.json"),
            output_capture: PathBuf::from("output.txt"),
            fallback_output: PathBuf::from("results.json"),
            student_code: None,
            stop_when_done: false,
        }
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rooted at `run_dir`, everything else default
    pub fn in_dir(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
            ..Self::default()
        }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.run_dir.join(path)
        }
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.resolve(&self.descriptor)
    }

    pub fn diagnostic_path(&self) -> PathBuf {
        self.resolve(&self.diagnostic)
    }

    pub fn output_capture_path(&self) -> PathBuf {
        self.resolve(&self.output_capture)
    }

    pub fn fallback_output_path(&self) -> PathBuf {
        self.resolve(&self.fallback_output)
    }

    pub fn student_code_path(&self) -> Option<PathBuf> {
        self.student_code.as_deref().map(|p| self.resolve(p))
    }

    /// Apply overrides from a variable lookup (usually `std::env::var`)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("AUTOGRADE_RUN_DIR") {
            self.run_dir = PathBuf::from(dir);
        }
        if let Some(code) = lookup("AUTOGRADE_STUDENT_CODE") {
            self.student_code = Some(PathBuf::from(code));
        }
        if let Some(flag) = lookup("AUTOGRADE_STOP_WHEN_DONE") {
            self.stop_when_done = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_resolve_under_run_dir() {
        let config = HarnessConfig::new();
        assert_eq!(
            config.descriptor_path(),
            PathBuf::from("/grade/run/filenames/output-fname.txt")
        );
        assert_eq!(config.output_capture_path(), PathBuf::from("/grade/run/output.txt"));
        assert!(!config.stop_when_done);
    }

    #[test]
    fn test_absolute_paths_kept() {
        let mut config = HarnessConfig::in_dir("/tmp/run");
        config.diagnostic = PathBuf::from("/var/log/diag.json");
        assert_eq!(config.diagnostic_path(), PathBuf::from("/var/log/diag.json"));
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("AUTOGRADE_RUN_DIR", "/srv/grade"),
            ("AUTOGRADE_STUDENT_CODE", "submission.py"),
            ("AUTOGRADE_STOP_WHEN_DONE", "TRUE"),
        ]
        .into_iter()
        .collect();

        let mut config = HarnessConfig::new();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.run_dir, PathBuf::from("/srv/grade"));
        assert_eq!(
            config.student_code_path(),
            Some(PathBuf::from("/srv/grade/submission.py"))
        );
        assert!(config.stop_when_done);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: HarnessConfig =
            serde_json::from_str(r#"{"run_dir": "/tmp/x", "stop_when_done": true}"#).unwrap();
        assert_eq!(config.run_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.diagnostic, PathBuf::from("results_test.json"));
        assert!(config.stop_when_done);
    }
}
