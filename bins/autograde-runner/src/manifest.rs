/// Manifest Suite - Command-Driven Test Cases
///
/// **Core Responsibility:**
/// Load a suite from a JSON manifest where every test is an external
/// command, and translate each command's exit into a `TestOutcome`.
///
/// **Exit Code Protocol:**
/// - 0: passed (failed if `expected_output` is set and stdout differs)
/// - 1: failed
/// - 77: do not run
/// - 78: grading complete
/// - 79: student code raised; stderr is the traceback
/// - anything else, signals, spawn errors: the grading code broke
///
/// A stdout line `@points <fraction>` reports partial credit; the last
/// one wins. Output is compared after trimming surrounding whitespace.
///
/// Captured stdout/stderr never reaches the console.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::{debug, info};

use crate::suite::{TestCase, TestOptions, TestOutcome, TestSuite};

pub const EXIT_PASSED: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_DO_NOT_RUN: i32 = 77;
pub const EXIT_GRADING_COMPLETE: i32 = 78;
pub const EXIT_STUDENT_FAULT: i32 = 79;

const POINTS_MARKER: &str = "@points";

fn default_iters() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestTest {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub options: TestOptions,
    pub command: CommandSpec,
    #[serde(default)]
    pub expected_output: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_iters")]
    pub total_iters: usize,
    #[serde(default)]
    pub total_points: Option<f64>,
    #[serde(default)]
    pub setup: Option<CommandSpec>,
    #[serde(default)]
    pub teardown: Option<CommandSpec>,
    pub tests: Vec<ManifestTest>,
}

pub struct ManifestSuite {
    manifest: Manifest,
    work_dir: PathBuf,
}

impl ManifestSuite {
    /// Load a manifest; commands run from the manifest's directory
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Test manifest not found: {}", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read test manifest {}", path.display()))?;
        let manifest: Manifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse test manifest {}", path.display()))?;

        let work_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        info!(
            manifest = %path.display(),
            tests = manifest.tests.len(),
            total_iters = manifest.total_iters,
            "Loaded test manifest"
        );
        Ok(Self::new(manifest, work_dir))
    }

    pub fn new(manifest: Manifest, work_dir: PathBuf) -> Self {
        Self { manifest, work_dir }
    }

    fn execute(&self, command: &CommandSpec, iteration: usize) -> std::io::Result<Output> {
        Command::new(&command.program)
            .args(&command.args)
            .current_dir(&self.work_dir)
            .env("ITERATION", iteration.to_string())
            .stdin(Stdio::null())
            .output()
    }

    /// Run a setup or teardown hook; the error is its traceback
    fn run_hook(&self, hook: Option<&CommandSpec>, iteration: usize) -> Result<(), String> {
        let Some(hook) = hook else {
            return Ok(());
        };
        let output = self
            .execute(hook, iteration)
            .map_err(|e| format!("Failed to spawn `{}`: {}", hook.program, e))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(failure_trace(&output))
        }
    }
}

impl TestSuite for ManifestSuite {
    fn total_iters(&self) -> usize {
        self.manifest.total_iters
    }

    fn total_points(&self) -> f64 {
        self.manifest
            .total_points
            .unwrap_or_else(|| self.manifest.tests.iter().map(|t| t.options.points).sum())
    }

    fn cases(&self) -> Vec<TestCase> {
        self.manifest
            .tests
            .iter()
            .map(|t| TestCase {
                id: t.id.clone(),
                description: t.description.clone(),
                options: t.options.clone(),
            })
            .collect()
    }

    fn set_up(&mut self, iteration: usize) -> Result<(), String> {
        self.run_hook(self.manifest.setup.as_ref(), iteration)
    }

    fn run_case(&mut self, case: &TestCase, iteration: usize) -> TestOutcome {
        let Some(test) = self.manifest.tests.iter().find(|t| t.id == case.id) else {
            return TestOutcome::body_fault(format!("No manifest entry for test `{}`", case.id));
        };

        let output = match self.execute(&test.command, iteration) {
            Ok(output) => output,
            Err(e) => {
                return TestOutcome::body_fault(format!(
                    "Failed to spawn `{}`: {}",
                    test.command.program, e
                ));
            }
        };
        debug!(
            test = %case.id,
            exit_code = ?output.status.code(),
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "Test command exited"
        );

        classify_output(&output, test.expected_output.as_deref())
    }

    fn tear_down(&mut self, iteration: usize) -> Result<(), String> {
        self.run_hook(self.manifest.teardown.as_ref(), iteration)
    }
}

/// Last reported partial-credit fraction, validated to [0, 1]
fn reported_fraction(stdout: &str) -> Result<Option<f64>, String> {
    let mut fraction = None;
    for line in stdout.lines() {
        let Some(value) = line.trim().strip_prefix(POINTS_MARKER) else {
            continue;
        };
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| format!("Invalid partial credit `{}`", value.trim()))?;
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(format!("Partial credit {} outside [0, 1]", value));
        }
        fraction = Some(value);
    }
    Ok(fraction)
}

/// Stdout with partial-credit marker lines removed, trimmed
fn program_output(stdout: &str) -> String {
    stdout
        .lines()
        .filter(|line| !line.trim().starts_with(POINTS_MARKER))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn failure_trace(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.trim().is_empty() {
        match output.status.code() {
            Some(code) => format!("Command exited with status {}", code),
            None => "Command terminated by signal".to_string(),
        }
    } else {
        stderr.into_owned()
    }
}

pub fn classify_output(output: &Output, expected_output: Option<&str>) -> TestOutcome {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let fraction = match reported_fraction(&stdout) {
        Ok(fraction) => fraction,
        Err(msg) => return TestOutcome::body_fault(msg),
    };

    match output.status.code() {
        Some(EXIT_PASSED) => match expected_output {
            Some(expected) if program_output(&stdout) != expected.trim() => {
                TestOutcome::Failed(fraction)
            }
            _ => TestOutcome::Passed(fraction),
        },
        Some(EXIT_FAILED) => TestOutcome::Failed(fraction),
        Some(EXIT_DO_NOT_RUN) => TestOutcome::Skipped,
        Some(EXIT_GRADING_COMPLETE) => TestOutcome::Aborted(fraction),
        Some(EXIT_STUDENT_FAULT) => TestOutcome::StudentFault(failure_trace(output)),
        _ => TestOutcome::body_fault(failure_trace(output)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::Phase;
    use uuid::Uuid;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    fn suite_of(tests: Vec<ManifestTest>) -> ManifestSuite {
        let manifest = Manifest {
            total_iters: 1,
            total_points: None,
            setup: None,
            teardown: None,
            tests,
        };
        ManifestSuite::new(manifest, std::env::temp_dir())
    }

    fn shell_test(id: &str, script: &str, expected_output: Option<&str>) -> ManifestTest {
        ManifestTest {
            id: id.to_string(),
            description: None,
            options: TestOptions::default(),
            command: sh(script),
            expected_output: expected_output.map(str::to_string),
        }
    }

    fn run_one(script: &str, expected_output: Option<&str>) -> TestOutcome {
        let mut suite = suite_of(vec![shell_test("test_x", script, expected_output)]);
        let case = suite.cases().remove(0);
        suite.run_case(&case, 0)
    }

    #[test]
    fn test_reported_fraction() {
        assert_eq!(reported_fraction("hello\n"), Ok(None));
        assert_eq!(reported_fraction("@points 0.5\n"), Ok(Some(0.5)));
        assert_eq!(reported_fraction("@points 0.2\nx\n@points 0.7"), Ok(Some(0.7)));
        assert!(reported_fraction("@points 1.5").is_err());
        assert!(reported_fraction("@points nan").is_err());
        assert!(reported_fraction("@points lots").is_err());
    }

    #[test]
    fn test_program_output_strips_markers() {
        assert_eq!(program_output("  42\n@points 0.5\n"), "42");
    }

    #[test]
    fn test_exit_code_protocol() {
        assert_eq!(run_one("exit 0", None), TestOutcome::Passed(None));
        assert_eq!(run_one("exit 1", None), TestOutcome::Failed(None));
        assert_eq!(run_one("exit 77", None), TestOutcome::Skipped);
        assert_eq!(run_one("exit 78", None), TestOutcome::Aborted(None));
        assert_eq!(
            run_one("echo 'ZeroDivisionError' >&2; exit 79", None),
            TestOutcome::StudentFault("ZeroDivisionError\n".to_string())
        );
        assert_eq!(
            run_one("exit 3", None),
            TestOutcome::body_fault("Command exited with status 3")
        );
    }

    #[test]
    fn test_expected_output_comparison() {
        assert_eq!(run_one("echo '  120 '", Some("120")), TestOutcome::Passed(None));
        assert_eq!(run_one("echo 121", Some("120")), TestOutcome::Failed(None));
    }

    #[test]
    fn test_partial_credit_from_stdout() {
        assert_eq!(
            run_one("echo '@points 0.25'; exit 1", None),
            TestOutcome::Failed(Some(0.25))
        );
        assert_eq!(
            run_one("echo 6; echo '@points 0.5'", Some("6")),
            TestOutcome::Passed(Some(0.5))
        );
    }

    #[test]
    fn test_invalid_fraction_is_grading_error() {
        match run_one("echo '@points 2'", None) {
            TestOutcome::HarnessFault { phase, trace } => {
                assert_eq!(phase, Phase::Body);
                assert!(trace.contains("outside [0, 1]"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_missing_program_is_grading_error() {
        let mut suite = suite_of(vec![ManifestTest {
            command: CommandSpec {
                program: format!("autograde-missing-{}", Uuid::new_v4()),
                args: vec![],
            },
            ..shell_test("test_x", "", None)
        }]);
        let case = suite.cases().remove(0);

        match suite.run_case(&case, 0) {
            TestOutcome::HarnessFault { phase, trace } => {
                assert_eq!(phase, Phase::Body);
                assert!(trace.starts_with("Failed to spawn"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_setup_hook_failure_reports_trace() {
        let mut suite = suite_of(vec![]);
        suite.manifest.setup = Some(sh("echo 'fixture missing' >&2; exit 2"));

        assert_eq!(suite.set_up(0), Err("fixture missing\n".to_string()));
        assert_eq!(suite.tear_down(0), Ok(()));
    }

    #[test]
    fn test_iteration_exported_to_command() {
        let mut suite = suite_of(vec![shell_test("test_x", "test \"$ITERATION\" = 2", None)]);
        let case = suite.cases().remove(0);

        assert_eq!(suite.run_case(&case, 2), TestOutcome::Passed(None));
        assert_eq!(suite.run_case(&case, 1), TestOutcome::Failed(None));
    }

    #[test]
    fn test_parse_manifest_defaults() {
        let manifest: Manifest = serde_json::from_str(
            r#"{"tests": [
                {"id": "test_a", "command": {"program": "true"}},
                {"id": "test_b", "points": 3, "name": "B", "command": {"program": "true"}}
            ]}"#,
        )
        .unwrap();
        let suite = ManifestSuite::new(manifest, PathBuf::from("."));

        assert_eq!(suite.total_iters(), 1);
        assert_eq!(suite.total_points(), 4.0);
        let cases = suite.cases();
        assert_eq!(cases[0].display_name(), "test_a");
        assert_eq!(cases[1].display_name(), "B");
        assert_eq!(cases[1].options.points, 3.0);
    }

    #[test]
    fn test_load_missing_manifest() {
        let err = ManifestSuite::load(Path::new("/nonexistent/tests.json"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("Test manifest not found"));
    }
}
