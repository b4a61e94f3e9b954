use std::path::Path;
use std::time::Duration;

use aav3_core::{TestOutcome, TestRecord};

use crate::python_syntax::truncate;

/// For each `*Dockerfile*` in `files_created`, if Docker is available,
/// build with `-f <relative-path>` and `.` as the build context
/// (`workspace_dir`). Never build if Docker is missing (spec.md §4.6.4).
pub async fn run(
    workspace_dir: &Path,
    files_created: &[String],
    session_id: &str,
    timeout_sec: u64,
    docker_available: bool,
) -> Vec<TestRecord> {
    let dockerfiles: Vec<&String> = files_created
        .iter()
        .filter(|p| p.rsplit('/').next().unwrap_or(p).contains("Dockerfile"))
        .collect();
    if dockerfiles.is_empty() {
        return Vec::new();
    }

    let mut records = Vec::new();
    for (index, path) in dockerfiles.iter().enumerate() {
        if !docker_available {
            records.push(TestRecord {
                test_name: path.to_string(),
                suite: "docker".to_string(),
                result: TestOutcome::Skip,
                stdout_excerpt: String::new(),
                stderr_excerpt: String::new(),
                exit_code: None,
                duration_ms: 0,
                reason: Some("docker not available".to_string()),
            });
            continue;
        }

        let tag = format!("aav3-session-{session_id}-{index}");
        let started = std::time::Instant::now();
        let outcome = aav3_process::run(
            "docker",
            &["build", "-f", path, "-t", &tag, "."],
            workspace_dir,
            Duration::from_secs(timeout_sec),
        )
        .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        records.push(match outcome {
            Ok(o) if o.timed_out => TestRecord {
                test_name: path.to_string(),
                suite: "docker".to_string(),
                result: TestOutcome::Fail,
                stdout_excerpt: truncate(&o.stdout),
                stderr_excerpt: truncate(&o.stderr),
                exit_code: None,
                duration_ms,
                reason: Some("timeout".to_string()),
            },
            Ok(o) if o.exit_code == Some(0) => TestRecord {
                test_name: path.to_string(),
                suite: "docker".to_string(),
                result: TestOutcome::Pass,
                stdout_excerpt: truncate(&o.stdout),
                stderr_excerpt: truncate(&o.stderr),
                exit_code: o.exit_code,
                duration_ms,
                reason: None,
            },
            Ok(o) => TestRecord {
                test_name: path.to_string(),
                suite: "docker".to_string(),
                result: TestOutcome::Fail,
                stdout_excerpt: truncate(&o.stdout),
                stderr_excerpt: truncate(&o.stderr),
                exit_code: o.exit_code,
                duration_ms,
                reason: None,
            },
            Err(e) => TestRecord {
                test_name: path.to_string(),
                suite: "docker".to_string(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn skips_every_dockerfile_when_docker_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let records = run(dir.path(), &["Dockerfile".to_string()], "abc123", 600, false).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].result, TestOutcome::Skip);
        assert_ne!(records[0].result, TestOutcome::Fail);
    }

    #[tokio::test]
    async fn returns_no_records_without_any_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        let records = run(dir.path(), &["main.py".to_string()], "abc123", 600, true).await;
        assert!(records.is_empty());
    }
}
