/// Outcome Classifier - Test Outcomes to Scored Records
///
/// **Core Responsibility:**
/// Turn start / outcome / stop events for each test into `TestRecord`s.
///
/// **Scoring Rules:**
/// - Passed, no fraction: full `max_points`
/// - Failed or Aborted, no fraction: 0
/// - Any reported fraction `f`: `max_points * f`, pass or fail alike
/// - Skipped: `points = max_points = 0`, so it counts toward nothing
///
/// **Special Signals:**
/// - Aborted and StudentFault mark the run done grading (advisory only)
/// - StudentFault replaces the running test's record with a synthetic one
/// - A setup-phase HarnessFault throws away every record of this run
/// - A body-phase HarnessFault zeroes only the running test
///
/// Feedback text goes through a `FeedbackSink`; nothing captured from a
/// test is ever written back to the console.

use anyhow::{Context, Result};
use autograde_common::types::{
    RunResultSet, TestRecord, INTERNAL_ERROR_TEST, STUDENT_EXCEPTION_TEST,
};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::feedback::{render_student_code, FeedbackSink};
use crate::suite::{Phase, TestCase, TestOutcome};

pub const GRADING_ERROR_MESSAGE: &str = "The grading code failed -- sorry about that!\n\n\
This may be an issue with your code.\n\
If so, you can take a look at the traceback below to help debug.\n\
If you believe this is an issue with the grading code,\n\
please notify the course staff.\n\n\
The error traceback is below:\n";

pub const INTERNAL_ERROR_MESSAGE: &str = "The grading code was not able to run.\n\
Please notify the course staff and include this entire message,\n\
including the traceback below.\n\n\
The error traceback is:\n";

/// Points earned out of `max_points` given an optional partial-credit
/// fraction and the all-or-nothing default
fn award(max_points: f64, fraction: Option<f64>, full_credit: bool) -> f64 {
    match fraction {
        Some(f) => max_points * f,
        None if full_credit => max_points,
        None => 0.0,
    }
}

/// Collects the records of one suite iteration
pub struct OutcomeClassifier<'a> {
    results: RunResultSet,
    done_grading: bool,
    feedback: &'a mut dyn FeedbackSink,
    student_code: Option<PathBuf>,
}

impl<'a> OutcomeClassifier<'a> {
    pub fn new(feedback: &'a mut dyn FeedbackSink, student_code: Option<PathBuf>) -> Self {
        Self {
            results: RunResultSet::new(),
            done_grading: false,
            feedback,
            student_code,
        }
    }

    pub fn start_test(&mut self, case: &TestCase) {
        let name = case.display_name();
        debug!(test = %name, max_points = case.options.points, "Test started");
        self.results
            .push(TestRecord::started(name, case.options.points));
    }

    pub fn record(&mut self, outcome: TestOutcome) -> Result<()> {
        match outcome {
            TestOutcome::Passed(fraction) => {
                let current = self.current()?;
                current.points = Some(award(current.max_points, fraction, true));
            }
            TestOutcome::Failed(fraction) => {
                let current = self.current()?;
                current.points = Some(award(current.max_points, fraction, false));
            }
            TestOutcome::Aborted(fraction) => {
                self.done_grading = true;
                let current = self.current()?;
                current.points = Some(award(current.max_points, fraction, false));
                info!(test = %current.name, "Grading complete signalled");
            }
            TestOutcome::Skipped => {
                let current = self.current()?;
                current.points = Some(0.0);
                current.max_points = 0.0;
                debug!(test = %current.name, "Test excluded from scoring");
            }
            TestOutcome::StudentFault(trace) => self.student_fault(&trace),
            TestOutcome::HarnessFault {
                phase: Phase::Setup,
                trace,
            } => self.setup_fault(&trace),
            TestOutcome::HarnessFault {
                phase: Phase::Body,
                trace,
            } => {
                let current = self.current()?;
                current.points = Some(0.0);
                let name = current.name.clone();
                warn!(test = %name, "Grading code raised inside a test");
                self.send_feedback(&name, &format!("{}{}", GRADING_ERROR_MESSAGE, trace));
            }
        }
        Ok(())
    }

    /// Captured output stays captured; only bookkeeping happens here
    pub fn stop_test(&mut self) {
        if let Some(current) = self.results.records().last() {
            debug!(test = %current.name, points = ?current.points, "Test stopped");
        }
    }

    pub fn done_grading(&self) -> bool {
        self.done_grading
    }

    pub fn results(&self) -> &[TestRecord] {
        self.results.records()
    }

    pub fn into_results(self) -> RunResultSet {
        self.results
    }

    fn current(&mut self) -> Result<&mut TestRecord> {
        self.results
            .current_mut()
            .context("Test outcome reported before any test started")
    }

    /// Feedback is best effort; the scored record stands either way
    fn send_feedback(&mut self, test_name: &str, text: &str) {
        if let Err(e) = self.feedback.add_feedback(test_name, text) {
            warn!(test = %test_name, error = %e, "Could not store feedback");
        }
    }

    fn student_fault(&mut self, trace: &str) {
        self.done_grading = true;
        if let Some(interrupted) = self.results.pop_current() {
            warn!(test = %interrupted.name, "Student code raised an exception");
        }
        self.results.push(TestRecord::synthetic(STUDENT_EXCEPTION_TEST));

        let mut text = format!("{}\n\nYour code:\n\n", trace);
        if let Some(path) = &self.student_code {
            match render_student_code(path) {
                Ok(listing) => text.push_str(&listing),
                Err(e) => {
                    warn!(error = %e, "Could not render student code");
                    text.push_str("(submission unavailable)\n");
                }
            }
        }
        self.send_feedback(STUDENT_EXCEPTION_TEST, &text);
    }

    fn setup_fault(&mut self, trace: &str) {
        self.done_grading = true;
        warn!(
            discarded = self.results.len(),
            "Grading code failed outside a test; discarding results"
        );
        self.results
            .reset_to(TestRecord::synthetic(INTERNAL_ERROR_TEST));
        self.send_feedback(
            INTERNAL_ERROR_TEST,
            &format!("{}{}", INTERNAL_ERROR_MESSAGE, trace),
        );
    }
}
