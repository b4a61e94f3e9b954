use std::path::Path;
use std::time::Duration;

use aav3_core::{TestOutcome, TestRecord};

/// For each `*.py` in `files_created`, compile it to bytecode without
/// executing it. Pass iff exit code 0 (spec.md §4.6.1).
pub async fn run(
    workspace_dir: &Path,
    files_created: &[String],
    timeout_sec: u64,
    python_available: bool,
) -> Vec<TestRecord> {
    let py_files: Vec<&String> = files_created.iter().filter(|p| p.ends_with(".py")).collect();
    if py_files.is_empty() {
        return Vec::new();
    }

    let mut records = Vec::new();
    for path in py_files {
        if !python_available {
            records.push(TestRecord {
                test_name: path.clone(),
                suite: "python_syntax".to_string(),
                result: TestOutcome::Skip,
                stdout_excerpt: String::new(),
                stderr_excerpt: String::new(),
                exit_code: None,
                duration_ms: 0,
                reason: Some("python3 not available".to_string()),
            });
            continue;
        }

        let started = std::time::Instant::now();
        let outcome = aav3_process::run(
            "python3",
            &["-m", "py_compile", path],
            workspace_dir,
            Duration::from_secs(timeout_sec),
        )
        .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        records.push(match outcome {
            Ok(o) if o.timed_out => TestRecord {
                test_name: path.clone(),
                suite: "python_syntax".to_string(),
                result: TestOutcome::Fail,
                stdout_excerpt: truncate(&o.stdout),
                stderr_excerpt: truncate(&o.stderr),
                exit_code: None,
                duration_ms,
                reason: Some("timeout".to_string()),
            },
            Ok(o) if o.exit_code == Some(0) => TestRecord {
                test_name: path.clone(),
                suite: "python_syntax".to_string(),
                result: TestOutcome::Pass,
                stdout_excerpt: truncate(&o.stdout),
                stderr_excerpt: truncate(&o.stderr),
                exit_code: o.exit_code,
                duration_ms,
                reason: None,
            },
            Ok(o) => TestRecord {
                test_name: path.clone(),
                suite: "python_syntax".to_string(),
                result: TestOutcome::Fail,
                stdout_excerpt: truncate(&o.stdout),
                stderr_excerpt: truncate(&o.stderr),
                exit_code: o.exit_code,
                duration_ms,
                reason: None,
            },
            Err(e) => TestRecord {
                test_name: path.clone(),
                suite: "python_syntax".to_string(),
                result: TestOutcome::Fail,
                stdout_excerpt: String::new(),
                stderr_excerpt: e.to_string(),
                exit_code: None,
                duration_ms,
                reason: Some("launch_failed".to_string()),
            },
        });
    }
    records
}

pub(crate) fn truncate(s: &str) -> String {
    const LIMIT: usize = 2000;
    if s.len() <= LIMIT {
        s.to_string()
    } else {
        let mut end = LIMIT;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
