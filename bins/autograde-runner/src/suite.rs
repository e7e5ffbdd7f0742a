/// Suite Contract - What the Harness Needs From Test Authors
///
/// **Core Responsibility:**
/// Describe a fixed suite of instructor-authored test cases and run them
/// one at a time, reporting each result as a `TestOutcome`.
///
/// **Critical Architectural Boundary:**
/// - Suites know HOW to run a test (sandbox, process, in-process, ...)
/// - Suites do NOT score anything
/// - The classifier turns outcomes into points
///
/// Per-test weight and display name live in an explicit `TestOptions`
/// registration record instead of being discovered at runtime.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::OutcomeClassifier;

fn default_points() -> f64 {
    1.0
}

/// Declared weight and optional display name of one test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOptions {
    #[serde(default = "default_points")]
    pub points: f64,
    #[serde(default)]
    pub name: Option<String>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            points: default_points(),
            name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub id: String,
    pub description: Option<String>,
    pub options: TestOptions,
}

impl TestCase {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            options: TestOptions::default(),
        }
    }

    pub fn with_points(mut self, points: f64) -> Self {
        self.options.points = points;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Explicit name, else description, else the raw identifier
    pub fn display_name(&self) -> &str {
        self.options
            .name
            .as_deref()
            .or(self.description.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Where a harness fault happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Outside any test body: suite setup or teardown
    Setup,
    /// Inside a single test body
    Body,
}

/// Result of running a single test
///
/// Fractions are partial-credit values in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub enum TestOutcome {
    Passed(Option<f64>),
    Failed(Option<f64>),
    /// Do-not-run: excluded from scoring entirely
    Skipped,
    /// Grading complete: scored as a failure, nothing more should count
    Aborted(Option<f64>),
    /// The student's submission raised; carries its traceback
    StudentFault(String),
    /// The grading code itself broke
    HarnessFault { phase: Phase, trace: String },
}

impl TestOutcome {
    pub fn setup_fault(trace: impl Into<String>) -> Self {
        TestOutcome::HarnessFault {
            phase: Phase::Setup,
            trace: trace.into(),
        }
    }

    pub fn body_fault(trace: impl Into<String>) -> Self {
        TestOutcome::HarnessFault {
            phase: Phase::Body,
            trace: trace.into(),
        }
    }

    /// Short label for logs; never includes captured text
    pub fn kind(&self) -> &'static str {
        match self {
            TestOutcome::Passed(_) => "passed",
            TestOutcome::Failed(_) => "failed",
            TestOutcome::Skipped => "skipped",
            TestOutcome::Aborted(_) => "aborted",
            TestOutcome::StudentFault(_) => "student_fault",
            TestOutcome::HarnessFault { phase: Phase::Setup, .. } => "setup_fault",
            TestOutcome::HarnessFault { phase: Phase::Body, .. } => "body_fault",
        }
    }
}

/// A loaded test suite
///
/// `set_up` and `tear_down` errors carry a traceback and are reported as
/// setup-phase faults.
pub trait TestSuite {
    /// How many times the whole suite is executed
    fn total_iters(&self) -> usize;

    /// Points possible for one full grading run, as declared by the suite
    fn total_points(&self) -> f64;

    fn cases(&self) -> Vec<TestCase>;

    fn set_up(&mut self, _iteration: usize) -> Result<(), String> {
        Ok(())
    }

    fn run_case(&mut self, case: &TestCase, iteration: usize) -> TestOutcome;

    fn tear_down(&mut self, _iteration: usize) -> Result<(), String> {
        Ok(())
    }
}

/// Execute every case of `suite` once, feeding events to `classifier`
///
/// With `stop_when_done`, no new case starts after the classifier has
/// marked the run done grading.
pub fn run_suite(
    suite: &mut dyn TestSuite,
    iteration: usize,
    classifier: &mut OutcomeClassifier<'_>,
    stop_when_done: bool,
) -> Result<()> {
    if let Err(trace) = suite.set_up(iteration) {
        warn!(iteration, "Suite setup failed; no tests will run");
        classifier.record(TestOutcome::setup_fault(trace))?;
        return Ok(());
    }

    let cases = suite.cases();
    info!(iteration, tests = cases.len(), "Running suite");

    for case in &cases {
        if stop_when_done && classifier.done_grading() {
            info!(iteration, test = %case.display_name(), "Done grading; skipping remaining tests");
            break;
        }

        classifier.start_test(case);
        let outcome = suite.run_case(case, iteration);
        debug!(iteration, test = %case.display_name(), outcome = outcome.kind(), "Test finished");
        classifier.record(outcome)?;
        classifier.stop_test();
    }

    if let Err(trace) = suite.tear_down(iteration) {
        warn!(iteration, "Suite teardown failed");
        classifier.record(TestOutcome::setup_fault(trace))?;
    }

    Ok(())
}
