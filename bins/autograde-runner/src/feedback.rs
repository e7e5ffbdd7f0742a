// Human-readable feedback attached to individual tests
use anyhow::{Context, Result};
use autograde_common::paths;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Destination for feedback text, keyed by test display name
pub trait FeedbackSink {
    fn add_feedback(&mut self, test_name: &str, text: &str) -> Result<()>;
}

/// Appends feedback to `feedback_<name>.txt` in the run directory, where
/// the aggregator later picks it up
pub struct FileFeedback {
    run_dir: PathBuf,
}

impl FileFeedback {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }
}

impl FeedbackSink for FileFeedback {
    fn add_feedback(&mut self, test_name: &str, text: &str) -> Result<()> {
        let path = self.run_dir.join(paths::test_feedback_file(test_name));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open feedback file {}", path.display()))?;
        file.write_all(text.as_bytes())
            .with_context(|| format!("Failed to write feedback file {}", path.display()))?;
        Ok(())
    }
}

/// Line-numbered listing of the student's submission
pub fn render_student_code(path: &Path) -> Result<String> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read student code {}", path.display()))?;

    let width = source.lines().count().max(1).to_string().len();
    let mut listing = String::new();
    for (idx, line) in source.lines().enumerate() {
        listing.push_str(&format!("{:>width$} | {}\n", idx + 1, line, width = width));
    }
    Ok(listing)
}


#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("autograde-feedback-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_file_feedback_appends() {
        let dir = scratch_dir();
        let mut sink = FileFeedback::new(&dir);

        sink.add_feedback("Addition", "first\n").unwrap();
        sink.add_feedback("Addition", "second\n").unwrap();

        let text = fs::read_to_string(dir.join("feedback_Addition.txt")).unwrap();
        assert_eq!(text, "first\nsecond\n");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_render_student_code_numbers_lines() {
        let dir = scratch_dir();
        let path = dir.join("student.py");
        fs::write(&path, "def f():\n    return 1\n").unwrap();

        let listing = render_student_code(&path).unwrap();
        assert_eq!(listing, "1 | def f():\n2 |     return 1\n");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_render_student_code_missing_file() {
        let err = render_student_code(Path::new("/nonexistent/student.py")).unwrap_err();
        assert!(err.to_string().contains("Failed to read student code"));
    }
}
