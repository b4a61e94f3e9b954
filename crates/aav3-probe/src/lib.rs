//! Preflight capability scan of the host. Every probe is bounded by a short
//! timeout; a probe that times out or fails is recorded as "not available"
//! with nothing more — probe failure never aborts the session (spec.md
//! §4.5).

use std::time::Duration;

use aav3_core::{
    DockerCapability, EnvironmentCapabilities, GpuCapability, LanguageCapabilities,
    MultimediaCapabilities, NetworkCapabilities, SecurityCapabilities, ToolVersion,
};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const NETWORK_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the full capability scan and render the constraint block.
pub async fn probe() -> EnvironmentCapabilities {
    let cwd = std::env::temp_dir();

    let docker = probe_docker(&cwd).await;
    let gpu = probe_gpu(&cwd).await;
    let languages = probe_languages(&cwd).await;
    let security = probe_security(&cwd).await;
    let network = probe_network().await;
    let multimedia = probe_multimedia(&cwd).await;

    let mut caps = EnvironmentCapabilities {
        docker,
        gpu,
        languages,
        security,
        network,
        multimedia,
        summary: String::new(),
    };
    caps.summary = render_constraint_block(&caps);
    caps
}

async fn version_of(cwd: &std::path::Path, bin: &str, args: &[&str]) -> ToolVersion {
    if !aav3_process::is_installed(bin) {
        return ToolVersion::default();
    }
    match aav3_process::run(bin, args, cwd, PROBE_TIMEOUT).await {
        Ok(outcome) if outcome.exit_code == Some(0) && !outcome.timed_out => {
            let version = outcome
                .stdout
                .lines()
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            ToolVersion {
                available: true,
                version,
            }
        }
        _ => ToolVersion::default(),
    }
}

async fn probe_docker(cwd: &std::path::Path) -> DockerCapability {
    let version = version_of(cwd, "docker", &["--version"]).await;
    if !version.available {
        return DockerCapability::default();
    }
    let compose = aav3_process::run("docker", &["compose", "version"], cwd, PROBE_TIMEOUT)
        .await
        .map(|o| o.exit_code == Some(0))
        .unwrap_or(false);
    let buildx = aav3_process::run("docker", &["buildx", "version"], cwd, PROBE_TIMEOUT)
        .await
        .map(|o| o.exit_code == Some(0))
        .unwrap_or(false);
    DockerCapability {
        available: true,
        compose,
        buildx,
        version: version.version,
    }
}

async fn probe_gpu(cwd: &std::path::Path) -> GpuCapability {
    let mut gpu = GpuCapability::default();

    if aav3_process::is_installed("nvidia-smi") {
        if let Ok(outcome) = aav3_process::run(
            "nvidia-smi",
            &["--query-gpu=name", "--format=csv,noheader"],
            cwd,
            PROBE_TIMEOUT,
        )
        .await
        {
            if outcome.exit_code == Some(0) && !outcome.timed_out {
                gpu.nvidia = true;
                gpu.devices = outcome
                    .stdout
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect();
            }
        }
        if let Ok(outcome) = aav3_process::run("nvcc", &["--version"], cwd, PROBE_TIMEOUT).await {
            if outcome.exit_code == Some(0) {
                gpu.cuda_version = outcome
                    .stdout
                    .lines()
                    .find(|l| l.to_lowercase().contains("release"))
                    .map(str::trim)
                    .map(str::to_string);
            }
        }
    }

    if aav3_process::is_installed("rocm-smi") {
        if let Ok(outcome) = aav3_process::run("rocm-smi", &[], cwd, PROBE_TIMEOUT).await {
            gpu.amd = outcome.exit_code == Some(0);
        }
    }

    gpu.apple = cfg!(target_os = "macos");

    gpu
}

async fn probe_languages(cwd: &std::path::Path) -> LanguageCapabilities {
    LanguageCapabilities {
        python: version_of(cwd, "python3", &["--version"]).await,
        node: version_of(cwd, "node", &["--version"]).await,
        rust: version_of(cwd, "rustc", &["--version"]).await,
        go: version_of(cwd, "go", &["version"]).await,
        java: version_of(cwd, "java", &["--version"]).await,
    }
}

async fn probe_security(cwd: &std::path::Path) -> SecurityCapabilities {
    SecurityCapabilities {
        git: version_of(cwd, "git", &["--version"]).await,
        grep: version_of(cwd, "grep", &["--version"]).await,
        trivy: version_of(cwd, "trivy", &["--version"]).await,
        syft: version_of(cwd, "syft", &["version"]).await,
        grype: version_of(cwd, "grype", &["version"]).await,
        pip_audit: version_of(cwd, "pip-audit", &["--version"]).await,
    }
}

async fn probe_multimedia(cwd: &std::path::Path) -> MultimediaCapabilities {
    let imagemagick = if aav3_process::is_installed("magick") {
        version_of(cwd, "magick", &["--version"]).await
    } else {
        version_of(cwd, "convert", &["--version"]).await
    };
    MultimediaCapabilities {
        ffmpeg: version_of(cwd, "ffmpeg", &["-version"]).await,
        imagemagick,
        opencv: probe_opencv(cwd).await,
    }
}

async fn probe_opencv(cwd: &std::path::Path) -> ToolVersion {
    if !aav3_process::is_installed("pkg-config") {
        return ToolVersion::default();
    }
    match aav3_process::run(
        "pkg-config",
        &["--modversion", "opencv4"],
        cwd,
        PROBE_TIMEOUT,
    )
    .await
    {
        Ok(outcome) if outcome.exit_code == Some(0) => ToolVersion {
            available: true,
            version: outcome.stdout.lines().next().map(str::trim).map(str::to_string),
        },
        _ => ToolVersion::default(),
    }
}

async fn probe_network() -> NetworkCapabilities {
    NetworkCapabilities {
        internet: tcp_reachable("1.1.1.1:443").await,
        github: tcp_reachable("github.com:443").await,
        pypi: tcp_reachable("pypi.org:443").await,
        npm: tcp_reachable("registry.npmjs.org:443").await,
    }
}

async fn tcp_reachable(addr: &str) -> bool {
    let connect = async {
        tokio::net::TcpStream::connect(addr)
            .await
            .map(|_| true)
            .unwrap_or(false)
    };
    tokio::time::timeout(NETWORK_TIMEOUT, connect)
        .await
        .unwrap_or(false)
}

/// Render a constraint paragraph for the Planner prompt, one line per
/// capability, with negative findings phrased as prohibitions (spec.md
/// §4.5).
pub fn render_constraint_block(caps: &EnvironmentCapabilities) -> String {
    let mut lines = Vec::new();

    if caps.docker.available {
        lines.push(format!(
            "\u{2713} Docker available ({}): Docker builds and container-based tests are allowed.",
            caps.docker.version.as_deref().unwrap_or("unknown version")
        ));
    } else {
        lines.push(
            "\u{26a0} Docker NOT available: do not propose Docker builds or container-based tests."
                .to_string(),
        );
    }

    if caps.gpu.nvidia {
        let cuda = caps.gpu.cuda_version.as_deref().unwrap_or("unknown");
        lines.push(format!(
            "\u{2713} NVIDIA GPU present (CUDA {cuda}): CUDA/TensorFlow/PyTorch GPU tests are allowed."
        ));
    } else if caps.gpu.any_present() {
        lines.push("\u{2713} Non-NVIDIA GPU present: CUDA-specific tests are not applicable.".to_string());
    } else {
        lines.push("\u{26a0} No GPU detected: do not propose GPU-dependent code or tests.".to_string());
    }

    for (name, tv) in [
        ("Python", &caps.languages.python),
        ("Node.js", &caps.languages.node),
        ("Rust", &caps.languages.rust),
        ("Go", &caps.languages.go),
        ("Java", &caps.languages.java),
    ] {
        if tv.available {
            lines.push(format!(
                "\u{2713} {name} available ({}).",
                tv.version.as_deref().unwrap_or("unknown version")
            ));
        } else {
            lines.push(format!("\u{26a0} {name} NOT available: do not propose {name} code."));
        }
    }

    if !caps.network.internet {
        lines.push(
            "\u{26a0} No general internet connectivity detected: do not propose steps that fetch external resources."
                .to_string(),
        );
    } else {
        if !caps.network.github {
            lines.push("\u{26a0} GitHub unreachable: do not propose cloning or fetching from GitHub.".to_string());
        }
        if !caps.network.pypi {
            lines.push("\u{26a0} PyPI unreachable: do not propose `pip install` from the network.".to_string());
        }
        if !caps.network.npm {
            lines.push("\u{26a0} npm registry unreachable: do not propose `npm install` from the network.".to_string());
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_caps() -> EnvironmentCapabilities {
        EnvironmentCapabilities::default()
    }

    #[test]
    fn constraint_block_prohibits_docker_when_unavailable() {
        let caps = base_caps();
        let block = render_constraint_block(&caps);
        assert!(block.contains("Docker NOT available"));
    }

    #[test]
    fn constraint_block_allows_docker_when_available() {
        let mut caps = base_caps();
        caps.docker.available = true;
        caps.docker.version = Some("24.0.0".to_string());
        let block = render_constraint_block(&caps);
        assert!(block.contains("Docker available"));
        assert!(!block.contains("NOT available"));
    }

    #[test]
    fn constraint_block_allows_gpu_tests_when_nvidia_present() {
        let mut caps = base_caps();
        caps.gpu.nvidia = true;
        caps.gpu.cuda_version = Some("12.4".to_string());
        let block = render_constraint_block(&caps);
        assert!(block.contains("NVIDIA GPU present"));
        assert!(block.contains("CUDA/TensorFlow/PyTorch GPU tests are allowed"));
    }

    #[test]
    fn constraint_block_prohibits_gpu_when_absent() {
        let caps = base_caps();
        let block = render_constraint_block(&caps);
        assert!(block.contains("No GPU detected"));
    }

    #[tokio::test]
    async fn probe_does_not_panic_and_yields_a_summary() {
        let caps = probe().await;
        assert!(!caps.summary.is_empty());
    }
}
