use std::path::Path;
use std::time::Duration;

use aav3_core::{TestOutcome, TestRecord};

use crate::python_syntax::truncate;

/// If any test-looking file exists (`test_*.py` or `*_test.py`), run the
/// platform's unit-test discovery runner in the workspace (spec.md §4.6.2).
pub async fn run(
    workspace_dir: &Path,
    files_created: &[String],
    timeout_sec: u64,
    python_available: bool,
) -> Vec<TestRecord> {
    let has_tests = files_created.iter().any(|p| is_test_file(p));
    if !has_tests {
        return Vec::new();
    }

    if !python_available {
        return vec![TestRecord {
            test_name: "unittest_discover".to_string(),
            suite: "python_unit".to_string(),
            result: TestOutcome::Skip,
            stdout_excerpt: String::new(),
            stderr_excerpt: String::new(),
            exit_code: None,
            duration_ms: 0,
            reason: Some("python3 not available".to_string()),
        }];
    }

    let started = std::time::Instant::now();
    let outcome = aav3_process::run(
        "python3",
        &["-m", "unittest", "discover", "-s", "."],
        workspace_dir,
        Duration::from_secs(timeout_sec),
    )
    .await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let record = match outcome {
        Ok(o) if o.timed_out => TestRecord {
            test_name: "unittest_discover".to_string(),
            suite: "python_unit".to_string(),
            result: TestOutcome::Fail,
            stdout_excerpt: truncate(&o.stdout),
            stderr_excerpt: truncate(&o.stderr),
            exit_code: None,
            duration_ms,
            reason: Some("timeout".to_string()),
        },
        Ok(o) if o.exit_code == Some(0) => TestRecord {
            test_name: "unittest_discover".to_string(),
            suite: "python_unit".to_string(),
            result: TestOutcome::Pass,
            stdout_excerpt: truncate(&o.stdout),
            stderr_excerpt: truncate(&o.stderr),
            exit_code: o.exit_code,
            duration_ms,
            reason: None,
        },
        Ok(o) => TestRecord {
            test_name: "unittest_discover".to_string(),
            suite: "python_unit".to_string(),
            result: TestOutcome::Fail,
            stdout_excerpt: truncate(&o.stdout),
            stderr_excerpt: truncate(&o.stderr),
            exit_code: o.exit_code,
            duration_ms,
            reason: None,
        },
        Err(e) => TestRecord {
            test_name: "unittest_discover".to_string(),
            suite: "python_unit".to_string(),
            result: TestOutcome::Fail,
            stdout_excerpt: String::new(),
            stderr_excerpt: e.to_string(),
            exit_code: None,
            duration_ms,
            reason: Some("launch_failed".to_string()),
        },
    };
    vec![record]
}

fn is_test_file(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    (name.starts_with("test_") || name.ends_with("_test.py")) && name.ends_with(".py")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_test_prefix_and_suffix_conventions() {
        assert!(is_test_file("test_hello.py"));
        assert!(is_test_file("hello_test.py"));
        assert!(!is_test_file("hello.py"));
    }

    #[tokio::test]
    async fn returns_no_records_when_no_test_files() {
        let dir = tempfile::tempdir().unwrap();
        let records = run(dir.path(), &["hello.py".to_string()], 5, true).await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn skips_when_python_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let records = run(dir.path(), &["test_hello.py".to_string()], 5, false).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].result, TestOutcome::Skip);
    }
}
