use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::paths;

/// Name of the synthetic record inserted when the student's code raised
pub const STUDENT_EXCEPTION_TEST: &str = "Your code raised an Exception";

/// Name of the synthetic record that replaces a run broken during setup
pub const INTERNAL_ERROR_TEST: &str = "Internal Grading Error";

/// A file attached to a single test in the result document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileEntry {
    Image { name: String, imgsrc: String },
    Text { name: String, text_output: String },
}

/// One entry per test case per iteration
///
/// `points` stays `None` from test start until an outcome is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub name: String,
    pub max_points: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<f64>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

impl TestRecord {
    /// A record for a test that has started but not concluded
    pub fn started(name: impl Into<String>, max_points: f64) -> Self {
        Self {
            name: name.into(),
            max_points,
            points: None,
            files: Vec::new(),
        }
    }

    /// A harness-inserted record worth one point, none of them earned
    pub fn synthetic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_points: 1.0,
            points: Some(0.0),
            files: Vec::new(),
        }
    }

    pub fn earned(&self) -> f64 {
        self.points.unwrap_or(0.0)
    }
}

/// Ordered records of a single suite execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResultSet {
    records: Vec<TestRecord>,
}

impl RunResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: TestRecord) {
        self.records.push(record);
    }

    /// The record of the most recently started test
    pub fn current_mut(&mut self) -> Option<&mut TestRecord> {
        self.records.last_mut()
    }

    pub fn pop_current(&mut self) -> Option<TestRecord> {
        self.records.pop()
    }

    /// Discard every record collected so far and keep only `record`
    pub fn reset_to(&mut self, record: TestRecord) {
        self.records.clear();
        self.records.push(record);
    }

    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<TestRecord> {
        self.records
    }
}

/// Per-name point totals summed across iterations
///
/// Names keep the order in which they were first seen.
#[derive(Debug, Clone, Default)]
pub struct AggregatedResultSet {
    order: Vec<String>,
    totals: HashMap<String, (f64, f64)>,
}

impl AggregatedResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: &TestRecord) {
        if !self.totals.contains_key(&record.name) {
            self.order.push(record.name.clone());
        }
        let entry = self.totals.entry(record.name.clone()).or_insert((0.0, 0.0));
        entry.0 += record.earned();
        entry.1 += record.max_points;
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn into_records(self) -> Vec<TestRecord> {
        let Self { order, totals } = self;
        order
            .into_iter()
            .filter_map(|name| {
                let (points, max_points) = totals.get(&name).copied()?;
                Some(TestRecord {
                    name,
                    max_points,
                    points: Some(points),
                    files: Vec::new(),
                })
            })
            .collect()
    }
}

/// The document handed to the grading platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<Vec<TestRecord>>,
    pub score: f64,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_images: Option<usize>,
    /// Run-wide images keyed `image_<k>`
    #[serde(flatten)]
    pub images: BTreeMap<String, String>,
}

impl GradingResult {
    pub fn success(tests: Vec<TestRecord>, score: f64, max_points: f64) -> Self {
        Self {
            tests: Some(tests),
            score,
            succeeded: true,
            max_points: Some(max_points),
            output: None,
            num_images: Some(0),
            images: BTreeMap::new(),
        }
    }

    /// Minimal document written when grading itself blew up
    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            tests: None,
            score: 0.0,
            succeeded: false,
            max_points: None,
            output: Some(output.into()),
            num_images: None,
            images: BTreeMap::new(),
        }
    }

    /// Append a run-wide image under the next global index
    pub fn push_image(&mut self, imgsrc: String) {
        let index = self.images.len();
        self.images.insert(paths::run_image_key(index), imgsrc);
        self.num_images = Some(self.images.len());
    }
}
