use std::path::Path;
use std::time::Duration;

use aav3_core::{TestOutcome, TestRecord};

const SBOM_TIMEOUT_SEC: u64 = 60;

/// If `syft` is present use it; else derive a minimal SBOM from the
/// language ecosystem. A degraded SBOM is never a failure (spec.md
/// §4.6.6).
pub async fn generate(workspace_dir: &Path, syft_available: bool) -> TestRecord {
    if syft_available {
        let started = std::time::Instant::now();
        let outcome = aav3_process::run(
            "syft",
            &[workspace_dir.to_string_lossy().as_ref(), "-o", "json"],
            workspace_dir,
            Duration::from_secs(SBOM_TIMEOUT_SEC),
        )
        .await;
        let duration_ms = started.elapsed().as_millis() as u64;
        return match outcome {
            Ok(o) if o.exit_code == Some(0) && !o.timed_out => TestRecord {
                test_name: "sbom_syft".to_string(),
                suite: "security_sbom".to_string(),
                result: TestOutcome::Pass,
                stdout_excerpt: "syft SBOM generated".to_string(),
                stderr_excerpt: String::new(),
                exit_code: o.exit_code,
                duration_ms,
                reason: None,
            },
            _ => degraded_sbom(workspace_dir, duration_ms),
        };
    }
    degraded_sbom(workspace_dir, 0)
}

fn degraded_sbom(workspace_dir: &Path, duration_ms: u64) -> TestRecord {
    let mut ecosystems = Vec::new();
    if workspace_dir.join("requirements.txt").is_file() {
        ecosystems.push("python:requirements.txt");
    }
    if workspace_dir.join("package.json").is_file() {
        ecosystems.push("node:package.json");
    }
    if workspace_dir.join("Cargo.lock").is_file() {
        ecosystems.push("rust:Cargo.lock");
    }

    TestRecord {
        test_name: "sbom_degraded".to_string(),
        suite: "security_sbom".to_string(),
        result: TestOutcome::Pass,
        stdout_excerpt: if ecosystems.is_empty() {
            "no ecosystem manifests found; empty degraded SBOM".to_string()
        } else {
            format!("degraded SBOM derived from: {}", ecosystems.join(", "))
        },
        stderr_excerpt: String::new(),
        exit_code: None,
        duration_ms,
        reason: Some("syft not available".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn degraded_sbom_is_never_a_failure_even_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let record = generate(dir.path(), false).await;
        assert_eq!(record.result, TestOutcome::Pass);
    }

    #[tokio::test]
    async fn degraded_sbom_names_found_ecosystem_manifests() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.lock"), "").unwrap();
        let record = generate(dir.path(), false).await;
        assert!(record.stdout_excerpt.contains("Cargo.lock"));
    }
}
