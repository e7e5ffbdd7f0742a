/// Side-channel file naming - defines only naming, not I/O
/// Keeps test authors' helpers and the harness agreeing on where
/// per-test and per-iteration artifacts are dropped.

pub const IMAGE_PREFIX: &str = "image";
pub const FEEDBACK_PREFIX: &str = "feedback";

/// A test name as a single path component: `/` and NUL become `_`
pub fn file_component(test_name: &str) -> String {
    test_name
        .chars()
        .map(|c| if c == '/' || c == '\0' { '_' } else { c })
        .collect()
}

/// Image produced by the test named `test_name`
///
/// Note: a test named like `<iter>_<n>` shares its file with the
/// numbered run-wide image `iteration_image_file(iter, n)`. Whichever
/// consumer looks first takes the file.
pub fn test_image_file(test_name: &str) -> String {
    format!("{}_{}.png", IMAGE_PREFIX, file_component(test_name))
}

/// Free-form feedback text for the test named `test_name`
pub fn test_feedback_file(test_name: &str) -> String {
    format!("{}_{}.txt", FEEDBACK_PREFIX, file_component(test_name))
}

/// The `n`th run-wide image dropped during iteration `iteration`
pub fn iteration_image_file(iteration: usize, n: usize) -> String {
    format!("{}_{}_{}.png", IMAGE_PREFIX, iteration, n)
}

/// Document key of the `k`th run-wide image across all iterations
pub fn run_image_key(k: usize) -> String {
    format!("{}_{}", IMAGE_PREFIX, k)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_test_file_names() {
        assert_eq!(test_image_file("plot"), "image_plot.png");
        assert_eq!(test_feedback_file("plot"), "feedback_plot.txt");
    }

    #[test]
    fn test_names_become_single_component() {
        assert_eq!(file_component("add/subtract"), "add_subtract");
        assert_eq!(file_component("nul\0byte"), "nul_byte");
        assert_eq!(test_feedback_file("a/b/c"), "feedback_a_b_c.txt");
        assert_eq!(test_image_file("x/y"), "image_x_y.png");
        assert_eq!(file_component("Your code raised an Exception"), "Your code raised an Exception");
    }

    #[test]
    fn test_iteration_image_naming() {
        assert_eq!(iteration_image_file(0, 0), "image_0_0.png");
        assert_eq!(iteration_image_file(2, 13), "image_2_13.png");
    }

    #[test]
    fn test_run_image_key_deterministic() {
        assert_eq!(run_image_key(4), run_image_key(4));
        assert_eq!(run_image_key(0), "image_0");
    }
}
