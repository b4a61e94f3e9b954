use std::path::Path;
use std::time::Duration;

use aav3_core::{TestOutcome, TestRecord};

const VULN_TIMEOUT_SEC: u64 = 120;

/// If `grype` or `pip-audit` is present, run it and summarize by severity;
/// fail only if a severity >= "high" is reported (spec.md §4.6.6, §9 "the
/// threshold configurable and default to high").
pub async fn scan(workspace_dir: &Path, grype_available: bool, pip_audit_available: bool) -> TestRecord {
    if grype_available {
        return run_grype(workspace_dir).await;
    }
    if pip_audit_available {
        return run_pip_audit(workspace_dir).await;
    }
    TestRecord {
        test_name: "vulnerability_scan".to_string(),
        suite: "security_vulnerabilities".to_string(),
        result: TestOutcome::Skip,
        stdout_excerpt: String::new(),
        stderr_excerpt: String::new(),
        exit_code: None,
        duration_ms: 0,
        reason: Some("neither grype nor pip-audit is available".to_string()),
    }
}

async fn run_grype(workspace_dir: &Path) -> TestRecord {
    let started = std::time::Instant::now();
    let outcome = aav3_process::run(
        "grype",
        &[".", "-o", "json"],
        workspace_dir,
        Duration::from_secs(VULN_TIMEOUT_SEC),
    )
    .await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let o = match outcome {
        Ok(o) => o,
        Err(e) => {
            return TestRecord {
                test_name: "grype_scan".to_string(),
                suite: "security_vulnerabilities".to_string(),
                result: TestOutcome::Fail,
                stdout_excerpt: String::new(),
                stderr_excerpt: e.to_string(),
                exit_code: None,
                duration_ms,
                reason: Some("launch_failed".to_string()),
            };
        }
    };
    if o.timed_out {
        return TestRecord {
            test_name: "grype_scan".to_string(),
            suite: "security_vulnerabilities".to_string(),
            result: TestOutcome::Fail,
            stdout_excerpt: String::new(),
            stderr_excerpt: String::new(),
            exit_code: None,
            duration_ms,
            reason: Some("timeout".to_string()),
        };
    }

    let high_or_above = max_severity_at_least_high(&o.stdout);
    TestRecord {
        test_name: "grype_scan".to_string(),
        suite: "security_vulnerabilities".to_string(),
        result: if high_or_above { TestOutcome::Fail } else { TestOutcome::Pass },
        stdout_excerpt: crate::python_syntax::truncate(&o.stdout),
        stderr_excerpt: crate::python_syntax::truncate(&o.stderr),
        exit_code: o.exit_code,
        duration_ms,
        reason: if high_or_above {
            Some("severity >= high reported".to_string())
        } else {
            None
        },
    }
}

fn max_severity_at_least_high(json_stdout: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(json_stdout) else {
        return false;
    };
    let Some(matches) = value.get("matches").and_then(|m| m.as_array()) else {
        return false;
    };
    matches.iter().any(|m| {
        m.get("vulnerability")
            .and_then(|v| v.get("severity"))
            .and_then(|s| s.as_str())
            .map(|s| matches!(s.to_ascii_lowercase().as_str(), "high" | "critical"))
            .unwrap_or(false)
    })
}

async fn run_pip_audit(workspace_dir: &Path) -> TestRecord {
    let started = std::time::Instant::now();
    let outcome = aav3_process::run(
        "pip-audit",
        &["-f", "json"],
        workspace_dir,
        Duration::from_secs(VULN_TIMEOUT_SEC),
    )
    .await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(o) if o.timed_out => TestRecord {
            test_name: "pip_audit_scan".to_string(),
            suite: "security_vulnerabilities".to_string(),
            result: TestOutcome::Fail,
            stdout_excerpt: String::new(),
            stderr_excerpt: String::new(),
            exit_code: None,
            duration_ms,
            reason: Some("timeout".to_string()),
        },
        // pip-audit does not report a severity scale; any reported
        // vulnerability is treated as meeting the "high" bar.
        Ok(o) if o.exit_code == Some(0) => TestRecord {
            test_name: "pip_audit_scan".to_string(),
            suite: "security_vulnerabilities".to_string(),
            result: TestOutcome::Pass,
            stdout_excerpt: crate::python_syntax::truncate(&o.stdout),
            stderr_excerpt: String::new(),
            exit_code: o.exit_code,
            duration_ms,
            reason: None,
        },
        Ok(o) => TestRecord {
            test_name: "pip_audit_scan".to_string(),
            suite: "security_vulnerabilities".to_string(),
            result: TestOutcome::Fail,
            stdout_excerpt: crate::python_syntax::truncate(&o.stdout),
            stderr_excerpt: crate::python_syntax::truncate(&o.stderr),
            exit_code: o.exit_code,
            duration_ms,
            reason: Some("vulnerabilities reported".to_string()),
        },
        Err(e) => TestRecord {
            test_name: "pip_audit_scan".to_string(),
            suite: "security_vulnerabilities".to_string(),
            result: TestOutcome::Fail,
            stdout_excerpt: String::new(),
            stderr_excerpt: e.to_string(),
            exit_code: None,
            duration_ms,
            reason: Some("launch_failed".to_string()),
        },
    }
}
