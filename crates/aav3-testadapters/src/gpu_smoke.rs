use std::path::Path;
use std::time::Duration;

use aav3_core::{GpuCapability, TestOutcome, TestRecord};

use crate::python_syntax::truncate;

const GPU_SUBTEST_TIMEOUT_SEC: u64 = 30;

const SUBTESTS: [&str; 5] = [
    "nvidia_smi",
    "nvcc_present",
    "cuda_hello_world",
    "tensorflow_gpu_device",
    "pytorch_cuda_available",
];

/// Five sub-tests, each in its own short-timeout subprocess. Missing GPU ->
/// all sub-tests skipped, not failed (spec.md §4.6.5).
pub async fn run(workspace_dir: &Path, gpu: &GpuCapability) -> Vec<TestRecord> {
    if !gpu.nvidia {
        return SUBTESTS
            .iter()
            .map(|name| skip_record(name, "no NVIDIA GPU detected"))
            .collect();
    }

    vec![
        run_subtest(
            workspace_dir,
            "nvidia_smi",
            "nvidia-smi",
            &[],
        )
        .await,
        run_subtest(workspace_dir, "nvcc_present", "nvcc", &["--version"]).await,
        run_cuda_hello_world(workspace_dir).await,
        run_tensorflow_check(workspace_dir).await,
        run_pytorch_check(workspace_dir).await,
    ]
}

fn skip_record(name: &str, reason: &str) -> TestRecord {
    TestRecord {
        test_name: name.to_string(),
        suite: "gpu_smoke".to_string(),
        result: TestOutcome::Skip,
        stdout_excerpt: String::new(),
        stderr_excerpt: String::new(),
        exit_code: None,
        duration_ms: 0,
        reason: Some(reason.to_string()),
    }
}

async fn run_subtest(workspace_dir: &Path, name: &str, bin: &str, args: &[&str]) -> TestRecord {
    if !aav3_process::is_installed(bin) {
        return skip_record(name, &format!("{bin} not available"));
    }
    let started = std::time::Instant::now();
    let outcome = aav3_process::run(
        bin,
        args,
        workspace_dir,
        Duration::from_secs(GPU_SUBTEST_TIMEOUT_SEC),
    )
    .await;
    record_from_outcome(name, outcome, started.elapsed().as_millis() as u64)
}

fn record_from_outcome(
    name: &str,
    outcome: Result<aav3_process::ExecOutcome, aav3_process::LaunchError>,
    duration_ms: u64,
) -> TestRecord {
    match outcome {
        Ok(o) if o.timed_out => TestRecord {
            test_name: name.to_string(),
            suite: "gpu_smoke".to_string(),
            result: TestOutcome::Fail,
            stdout_excerpt: truncate(&o.stdout),
            stderr_excerpt: truncate(&o.stderr),
            exit_code: None,
            duration_ms,
            reason: Some("timeout".to_string()),
        },
        Ok(o) if o.exit_code == Some(0) => TestRecord {
            test_name: name.to_string(),
            suite: "gpu_smoke".to_string(),
            result: TestOutcome::Pass,
            stdout_excerpt: truncate(&o.stdout),
            stderr_excerpt: truncate(&o.stderr),
            exit_code: o.exit_code,
            duration_ms,
            reason: None,
        },
        Ok(o) => TestRecord {
            test_name: name.to_string(),
            suite: "gpu_smoke".to_string(),
            result: TestOutcome::Fail,
            stdout_excerpt: truncate(&o.stdout),
            stderr_excerpt: truncate(&o.stderr),
            exit_code: o.exit_code,
            duration_ms,
            reason: None,
        },
        Err(e) => TestRecord {
            test_name: name.to_string(),
            suite: "gpu_smoke".to_string(),
            result: TestOutcome::Fail,
            stdout_excerpt: String::new(),
            stderr_excerpt: e.to_string(),
            exit_code: None,
            duration_ms,
            reason: Some("launch_failed".to_string()),
        },
    }
}

async fn run_cuda_hello_world(workspace_dir: &Path) -> TestRecord {
    if !aav3_process::is_installed("nvcc") {
        return skip_record("cuda_hello_world", "nvcc not available");
    }
    // A minimal CUDA program that launches one no-op kernel and exits 0.
    let source = "__global__ void noop() {}\nint main() { noop<<<1,1>>>(); return 0; }\n";
    let src_path = workspace_dir.join(".aav3_cuda_hello.cu");
    let bin_path = workspace_dir.join(".aav3_cuda_hello");
    if std::fs::write(&src_path, source).is_err() {
        return skip_record("cuda_hello_world", "failed to write probe source");
    }

    let started = std::time::Instant::now();
    let compile = aav3_process::run(
        "nvcc",
        &[
            src_path.to_string_lossy().as_ref(),
            "-o",
            bin_path.to_string_lossy().as_ref(),
        ],
        workspace_dir,
        Duration::from_secs(GPU_SUBTEST_TIMEOUT_SEC),
    )
    .await;

    let record = match compile {
        Ok(o) if o.exit_code == Some(0) && !o.timed_out => {
            let run_outcome = aav3_process::run(
                bin_path.to_string_lossy().as_ref(),
                &[],
                workspace_dir,
                Duration::from_secs(GPU_SUBTEST_TIMEOUT_SEC),
            )
            .await;
            record_from_outcome(
                "cuda_hello_world",
                run_outcome,
                started.elapsed().as_millis() as u64,
            )
        }
        other => record_from_outcome(
            "cuda_hello_world",
            other,
            started.elapsed().as_millis() as u64,
        ),
    };

    let _ = std::fs::remove_file(&src_path);
    let _ = std::fs::remove_file(&bin_path);
    record
}

async fn run_tensorflow_check(workspace_dir: &Path) -> TestRecord {
    if !aav3_process::is_installed("python3") {
        return skip_record("tensorflow_gpu_device", "python3 not available");
    }
    let started = std::time::Instant::now();
    let outcome = aav3_process::run(
        "python3",
        &[
            "-c",
            "import sys, tensorflow as tf; sys.exit(0 if len(tf.config.list_physical_devices('GPU')) >= 1 else 1)",
        ],
        workspace_dir,
        Duration::from_secs(GPU_SUBTEST_TIMEOUT_SEC),
    )
    .await;
    record_from_outcome(
        "tensorflow_gpu_device",
        outcome,
        started.elapsed().as_millis() as u64,
    )
}

async fn run_pytorch_check(workspace_dir: &Path) -> TestRecord {
    if !aav3_process::is_installed("python3") {
        return skip_record("pytorch_cuda_available", "python3 not available");
    }
    let started = std::time::Instant::now();
    let outcome = aav3_process::run(
        "python3",
        &["-c", "import sys, torch; sys.exit(0 if torch.cuda.is_available() else 1)"],
        workspace_dir,
        Duration::from_secs(GPU_SUBTEST_TIMEOUT_SEC),
    )
    .await;
    record_from_outcome(
        "pytorch_cuda_available",
        outcome,
        started.elapsed().as_millis() as u64,
    )
}
