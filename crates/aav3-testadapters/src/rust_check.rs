use std::path::Path;
use std::time::Duration;

use aav3_core::{TestOutcome, TestRecord};

use crate::python_syntax::truncate;

const RUST_CHECK_TIMEOUT_SEC: u64 = 300;

/// If `Cargo.toml` is present and Rust is available, run a compile check
/// (spec.md §4.6.3).
pub async fn run(workspace_dir: &Path, rust_available: bool) -> Vec<TestRecord> {
    if !workspace_dir.join("Cargo.toml").is_file() {
        return Vec::new();
    }

    if !rust_available {
        return vec![TestRecord {
            test_name: "cargo_check".to_string(),
            suite: "rust_check".to_string(),
            result: TestOutcome::Skip,
            stdout_excerpt: String::new(),
            stderr_excerpt: String::new(),
            exit_code: None,
            duration_ms: 0,
            reason: Some("rust not available".to_string()),
        }];
    }

    let started = std::time::Instant::now();
    let outcome = aav3_process::run(
        "cargo",
        &["check", "--offline"],
        workspace_dir,
        Duration::from_secs(RUST_CHECK_TIMEOUT_SEC),
    )
    .await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let record = match outcome {
        Ok(o) if o.timed_out => TestRecord {
            test_name: "cargo_check".to_string(),
            suite: "rust_check".to_string(),
            result: TestOutcome::Fail,
            stdout_excerpt: truncate(&o.stdout),
            stderr_excerpt: truncate(&o.stderr),
            exit_code: None,
            duration_ms,
            reason: Some("timeout".to_string()),
        },
        Ok(o) if o.exit_code == Some(0) => TestRecord {
            test_name: "cargo_check".to_string(),
            suite: "rust_check".to_string(),
            result: TestOutcome::Pass,
            stdout_excerpt: truncate(&o.stdout),
            stderr_excerpt: truncate(&o.stderr),
            exit_code: o.exit_code,
            duration_ms,
            reason: None,
        },
        Ok(o) => TestRecord {
            test_name: "cargo_check".to_string(),
            suite: "rust_check".to_string(),
            result: TestOutcome::Fail,
            stdout_excerpt: truncate(&o.stdout),
            stderr_excerpt: truncate(&o.stderr),
            exit_code: o.exit_code,
            duration_ms,
            reason: None,
        },
        Err(e) => TestRecord {
            test_name: "cargo_check".to_string(),
            suite: "rust_check".to_string(),
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
