// Side-channel artifacts dropped by test code into the run directory.
// Every file is read once and removed right away so a re-run never
// picks up stale output.
use anyhow::{Context, Result};
use autograde_common::paths;
use autograde_common::types::{FileEntry, TestRecord};
use base64::{engine::general_purpose, Engine as _};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Read and delete `path`; `None` if nothing readable sits there
///
/// A path that cannot even be looked up (name too long, parent not a
/// directory, ...) counts as absent. Only a file that exists but cannot
/// be read or removed is an error.
fn take_file(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Ok(None),
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                debug!(file = %path.display(), error = %e, "Artifact lookup failed; treating as absent");
            }
            return Ok(None);
        }
    }

    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    debug!(file = %path.display(), bytes = bytes.len(), "Consumed artifact");
    Ok(Some(bytes))
}

/// Image files may already hold an encoded image source; raw PNG bytes
/// are turned into a data URI
fn image_source(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(e.as_bytes())
        ),
    }
}

/// Attach each test's image and feedback file, if present
pub fn attach_test_files(run_dir: &Path, records: &mut [TestRecord]) -> Result<()> {
    for record in records.iter_mut() {
        let image_name = paths::test_image_file(&record.name);
        if let Some(bytes) = take_file(&run_dir.join(&image_name))? {
            record.files.push(FileEntry::Image {
                name: image_name,
                imgsrc: image_source(bytes),
            });
        }

        let feedback_name = paths::test_feedback_file(&record.name);
        if let Some(bytes) = take_file(&run_dir.join(&feedback_name))? {
            record.files.push(FileEntry::Text {
                name: feedback_name,
                text_output: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
    }
    Ok(())
}

/// Run-wide captured output; empty captures count as absent
pub fn take_output_capture(path: &Path) -> Result<Option<String>> {
    Ok(take_file(path)?
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .filter(|text| !text.is_empty()))
}

/// Numbered run-wide images, iteration by iteration, each scan stopping
/// at the first missing index
pub fn take_iteration_images(run_dir: &Path, total_iters: usize) -> Result<Vec<String>> {
    let mut images = Vec::new();
    for iteration in 0..total_iters {
        let mut n = 0;
        while let Some(bytes) = take_file(&run_dir.join(paths::iteration_image_file(iteration, n)))? {
            images.push(image_source(bytes));
            n += 1;
        }
    }
    Ok(images)
}
