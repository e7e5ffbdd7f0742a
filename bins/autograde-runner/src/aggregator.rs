/// Run Aggregator - Iterations to a Grading Document
///
/// **Core Responsibility:**
/// Drive every iteration of a suite, merge the per-iteration records and
/// assemble the `GradingResult` written for the grading platform.
///
/// **Scoring Rules:**
/// - One iteration: its records are the result, unchanged
/// - Several iterations: points and max points summed per test name
/// - max_points comes from the suite declaration, not the records
/// - score = earned / max_points, or 0.0 when max_points is not positive
///
/// **Safety Net:**
/// `run_with_safety_net` always writes a document. Any error or panic,
/// including a suite that fails to load, produces
/// `{succeeded: false, score: 0.0, output: <failure text>}` at the path a
/// successful run would have used.

use anyhow::{bail, Context, Result};
use autograde_common::config::HarnessConfig;
use autograde_common::types::{AggregatedResultSet, GradingResult, RunResultSet, TestRecord};
use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::artifacts;
use crate::classifier::OutcomeClassifier;
use crate::feedback::{FeedbackSink, FileFeedback};
use crate::suite::{run_suite, TestSuite};

/// Placeholder body of the diagnostic file
pub(crate) const DIAGNOSTIC_BODY: &str = r#"{"a": 1, "b": 2}"#;

/// Execute `suite` once per declared iteration, each with a fresh classifier
pub fn run_iterations(
    suite: &mut dyn TestSuite,
    config: &HarnessConfig,
    feedback: &mut dyn FeedbackSink,
) -> Result<Vec<RunResultSet>> {
    let total_iters = suite.total_iters();
    if total_iters == 0 {
        bail!("Suite declares zero iterations");
    }

    let student_code = config.student_code_path();
    let mut runs = Vec::with_capacity(total_iters);
    for iteration in 0..total_iters {
        let mut classifier = OutcomeClassifier::new(&mut *feedback, student_code.clone());
        run_suite(suite, iteration, &mut classifier, config.stop_when_done)?;

        let done = classifier.done_grading();
        let results = classifier.into_results();
        info!(iteration, tests = results.len(), done_grading = done, "Iteration complete");
        runs.push(results);
    }
    Ok(runs)
}

/// Combine per-iteration records into the final test list
pub fn merge(mut runs: Vec<RunResultSet>) -> Vec<TestRecord> {
    if runs.len() == 1 {
        return runs.remove(0).into_records();
    }

    let mut merged = AggregatedResultSet::new();
    for run in &runs {
        for record in run.records() {
            merged.add(record);
        }
    }
    merged.into_records()
}

pub fn compute_score(earned: f64, max_points: f64) -> f64 {
    if max_points > 0.0 {
        earned / max_points
    } else {
        warn!(max_points, "Suite declares no points; score defaults to 0");
        0.0
    }
}

/// Run all iterations and build the document, consuming artifacts
pub fn grade(
    suite: &mut dyn TestSuite,
    config: &HarnessConfig,
    feedback: &mut dyn FeedbackSink,
) -> Result<GradingResult> {
    let total_iters = suite.total_iters();
    let runs = run_iterations(suite, config, feedback)?;
    let mut records = merge(runs);

    let max_points = suite.total_points();
    let earned: f64 = records.iter().map(TestRecord::earned).sum();
    let score = compute_score(earned, max_points);

    artifacts::attach_test_files(&config.run_dir, &mut records)?;

    let mut result = GradingResult::success(records, score, max_points);
    result.output = artifacts::take_output_capture(&config.output_capture_path())?;
    for image in artifacts::take_iteration_images(&config.run_dir, total_iters)? {
        result.push_image(image);
    }

    info!(
        score,
        earned,
        max_points,
        images = result.images.len(),
        "Grading complete"
    );
    Ok(result)
}

/// Read and remove the descriptor naming the output document path
pub fn read_output_target(config: &HarnessConfig) -> Result<PathBuf> {
    let descriptor = config.descriptor_path();
    let content = fs::read_to_string(&descriptor)
        .with_context(|| format!("Failed to read output descriptor {}", descriptor.display()))?;
    fs::remove_file(&descriptor)
        .with_context(|| format!("Failed to remove output descriptor {}", descriptor.display()))?;

    let target = content.trim();
    if target.is_empty() {
        bail!("Output descriptor {} is empty", descriptor.display());
    }
    Ok(config.resolve(Path::new(target)))
}

pub fn write_document(path: &Path, result: &GradingResult) -> Result<()> {
    let payload = serde_json::to_string(result).context("Failed to serialize grading result")?;
    fs::write(path, payload)
        .with_context(|| format!("Failed to write grading result {}", path.display()))
}

pub fn write_diagnostic(config: &HarnessConfig) -> Result<()> {
    let path = config.diagnostic_path();
    fs::write(&path, DIAGNOSTIC_BODY)
        .with_context(|| format!("Failed to write diagnostic file {}", path.display()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panic: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panic: {}", msg)
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Grade the suite produced by `load`, always leaving a document behind
///
/// Returns the document that was written. Only an error writing the
/// failure document itself escapes.
pub fn run_with_safety_net<L>(config: &HarnessConfig, load: L) -> Result<GradingResult>
where
    L: FnOnce() -> Result<Box<dyn TestSuite>>,
{
    let mut target: Option<PathBuf> = None;
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| -> Result<GradingResult> {
        let path = read_output_target(config)?;
        target = Some(path.clone());

        let mut suite = load().context("Failed to load test suite")?;
        let mut feedback = FileFeedback::new(&config.run_dir);
        let result = grade(suite.as_mut(), config, &mut feedback)?;

        write_diagnostic(config)?;
        write_document(&path, &result)?;
        info!(path = %path.display(), "Grading result written");
        Ok(result)
    }));

    let failure = match attempt {
        Ok(Ok(result)) => return Ok(result),
        Ok(Err(e)) => format!("{:?}", e),
        Err(payload) => panic_message(payload.as_ref()),
    };

    let path = target.unwrap_or_else(|| config.fallback_output_path());
    error!(path = %path.display(), "Grading failed; writing failure result");
    let result = GradingResult::failure(failure);
    write_document(&path, &result)?;
    Ok(result)
}
