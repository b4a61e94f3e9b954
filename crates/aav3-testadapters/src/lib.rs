//! Execute objective tests against the workspace: syntax, build, runtime,
//! GPU smoke, security scan. Produce per-test pass/fail records (spec.md
//! §4.6).

pub mod docker_build;
pub mod gpu_smoke;
pub mod python_syntax;
pub mod python_unit_tests;
pub mod rust_check;
pub mod security;

use std::path::Path;

use aav3_core::{EnvironmentCapabilities, TestRecord, TestResult};

/// Per-round adapter timeouts sourced from ConfigResolver (spec.md §4.9).
/// `rust_check` and the GPU/security sub-suites use fixed constants per
/// spec.md §4.6, not configurable options.
#[derive(Debug, Clone, Copy)]
pub struct AdapterTimeouts {
    pub python_syntax_timeout_sec: u64,
    pub docker_build_timeout_sec: u64,
    pub unit_test_timeout_sec: u64,
}

impl Default for AdapterTimeouts {
    fn default() -> Self {
        Self {
            python_syntax_timeout_sec: 30,
            docker_build_timeout_sec: 600,
            unit_test_timeout_sec: 120,
        }
    }
}

/// Run every adapter against `files_created` (workspace-relative paths) and
/// aggregate into one `TestResult`, applying the verdict rule: any fail ->
/// needs_fixes; else pass (spec.md §4.6 aggregation rule).
pub async fn run_all(
    workspace_dir: &Path,
    files_created: &[String],
    env: &EnvironmentCapabilities,
    session_id: &str,
    timeouts: AdapterTimeouts,
) -> TestResult {
    let mut records: Vec<TestRecord> = Vec::new();

    records.extend(
        python_syntax::run(
            workspace_dir,
            files_created,
            timeouts.python_syntax_timeout_sec,
            env.languages.python.available,
        )
        .await,
    );
    records.extend(
        python_unit_tests::run(
            workspace_dir,
            files_created,
            timeouts.unit_test_timeout_sec,
            env.languages.python.available,
        )
        .await,
    );
    records.extend(rust_check::run(workspace_dir, env.languages.rust.available).await);
    records.extend(
        docker_build::run(
            workspace_dir,
            files_created,
            session_id,
            timeouts.docker_build_timeout_sec,
            env.docker.available,
        )
        .await,
    );
    records.extend(gpu_smoke::run(workspace_dir, &env.gpu).await);
    records.extend(security::run(workspace_dir, &env.security).await);

    TestResult::from_records(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aav3_core::Verdict;

    #[tokio::test]
    async fn environment_gating_never_emits_a_docker_fail_without_docker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM scratch").unwrap();

        let env = EnvironmentCapabilities::default();
        let result = run_all(
            dir.path(),
            &["Dockerfile".to_string()],
            &env,
            "session123",
            AdapterTimeouts::default(),
        )
        .await;

        let docker_records: Vec<_> = result
            .issues_found
            .iter()
            .filter(|r| r.suite == "docker")
            .collect();
        assert!(!docker_records.is_empty());
        assert!(docker_records.iter().all(|r| r.result != aav3_core::TestOutcome::Fail));
    }

    #[tokio::test]
    async fn trivial_success_scenario_passes_with_clean_python_module() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.py"), "def greet(name):\n    return 'Hello, ' + name\n").unwrap();
        std::fs::write(
            dir.path().join("test_hello.py"),
            "import unittest\nfrom hello import greet\n\nclass T(unittest.TestCase):\n    def test_greet(self):\n        self.assertEqual(greet('a'), 'Hello, a')\n",
        )
        .unwrap();

        let mut env = EnvironmentCapabilities::default();
        // This scenario only asserts behavior when python3 genuinely is not
        // installed on the host running this test binary; when it is, the
        // live adapters exercise the real interpreter instead.
        env.languages.python.available = aav3_process::is_installed("python3");

        let result = run_all(
            dir.path(),
            &["hello.py".to_string(), "test_hello.py".to_string()],
            &env,
            "session123",
            AdapterTimeouts::default(),
        )
        .await;

        if env.languages.python.available {
            assert_eq!(result.verdict, Verdict::Pass);
        }
    }
}
