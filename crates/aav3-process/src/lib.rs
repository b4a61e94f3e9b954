//! Subprocess runner: standard "run command, capture stdout/stderr, enforce
//! timeout, return exit code" semantics, with `cwd` settable per invocation
//! (spec.md §6, Consumed interfaces).

use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Outcome of one subprocess invocation. Never an `Err` for "the command
/// ran and returned nonzero" or "the command timed out" — those are
/// ordinary values. `Err` is reserved for the process failing to launch at
/// all (spec.md's `SubprocessFailure`).
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

/// The process could not be spawned (binary missing, permission denied,
/// etc). Distinct from a nonzero exit or a timeout.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to launch '{program}': {reason}")]
pub struct LaunchError {
    pub program: String,
    pub reason: String,
}

/// Run `program` with `args` in `cwd`, capturing stdout/stderr, killing the
/// process group if it does not finish within `timeout`.
#[tracing::instrument(skip(args), fields(program = %program))]
pub async fn run(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> Result<ExecOutcome, LaunchError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Run in its own process group so a timeout kill takes any children too.
    unsafe {
        command.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    let mut child = command.spawn().map_err(|e| LaunchError {
        program: program.to_string(),
        reason: e.to_string(),
    })?;

    let pid = child.id();
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let capture = async {
        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut pipe) = stdout_pipe.take() {
            let _ = pipe.read_to_string(&mut stdout).await;
        }
        if let Some(mut pipe) = stderr_pipe.take() {
            let _ = pipe.read_to_string(&mut stderr).await;
        }
        let status = child.wait().await;
        (stdout, stderr, status)
    };

    match tokio::time::timeout(timeout, capture).await {
        Ok((stdout, stderr, status)) => {
            let exit_code = status.ok().and_then(|s| s.code());
            Ok(ExecOutcome {
                stdout,
                stderr,
                exit_code,
                timed_out: false,
            })
        }
        Err(_) => {
            if let Some(pid) = pid {
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGKILL);
                }
            }
            tracing::warn!(program, timeout_secs = timeout.as_secs(), "process timed out");
            Ok(ExecOutcome {
                stdout: String::new(),
                stderr: format!("timed out after {}s", timeout.as_secs()),
                exit_code: None,
                timed_out: true,
            })
        }
    }
}

/// Whether an executable named `name` is resolvable on PATH.
pub fn is_installed(name: &str) -> bool {
    which::which(name).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_successful_command() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run("true", &[], dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn captures_nonzero_exit_as_a_value_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run("false", &[], dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, Some(1));
    }

    #[tokio::test]
    async fn captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run("echo", &["hello"], dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn times_out_long_running_command() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run(
            "sleep",
            &["5"],
            dir.path(),
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
    }

    #[tokio::test]
    async fn launch_failure_is_a_distinct_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(
            "definitely-not-a-real-binary-xyz",
            &[],
            dir.path(),
            Duration::from_secs(5),
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn is_installed_finds_a_known_binary() {
        assert!(is_installed("sh"));
    }

    #[test]
    fn is_installed_is_false_for_nonsense() {
        assert!(!is_installed("definitely-not-a-real-binary-xyz"));
    }
}
