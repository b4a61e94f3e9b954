pub mod sbom;
pub mod secrets;
pub mod vulnerabilities;

use std::path::Path;

use aav3_core::{SecurityCapabilities, TestRecord};

/// Composed of three independently-reported sub-suites: secrets, SBOM, and
/// vulnerabilities (spec.md §4.6.6).
pub async fn run(workspace_dir: &Path, security: &SecurityCapabilities) -> Vec<TestRecord> {
    let mut records = secrets::scan(workspace_dir);
    records.push(sbom::generate(workspace_dir, security.syft.available).await);
    records.push(
        vulnerabilities::scan(
            workspace_dir,
            security.grype.available,
            security.pip_audit.available,
        )
        .await,
    );
    records
}
