//! A concrete `AttestationVerifier` that shells out to the `gh` CLI's
//! artifact-attestation verifier. Kept separate from `ccsa-installer` for the
//! same reason as [`crate::github`]: the manager crate only needs the trait.

use std::io::Write;
use std::process::Command;

use ccsa_installer::{AttestationVerifier, InstallError, InstallResult};

/// Verifies a downloaded asset's provenance by invoking an external command
/// (`gh attestation verify <file> --repo <repo>` by default) against a
/// temporary copy of the bytes.
pub struct CommandAttestationVerifier {
    program: String,
    repo: String,
}

impl CommandAttestationVerifier {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            program: std::env::var("CCSUBAGENTS_ATTESTATION_CMD").unwrap_or_else(|_| "gh".to_string()),
            repo: repo.into(),
        }
    }
}

impl AttestationVerifier for CommandAttestationVerifier {
    fn verify(&self, asset_name: &str, bytes: &[u8]) -> InstallResult<()> {
        let mut tmp = tempfile::NamedTempFile::new()
            .map_err(|e| InstallError::Internal(format!("failed to stage {asset_name} for attestation: {e}")))?;
        tmp.write_all(bytes)
            .map_err(|e| InstallError::Internal(format!("failed to stage {asset_name} for attestation: {e}")))?;

        let output = Command::new(&self.program)
            .args(["attestation", "verify"])
            .arg(tmp.path())
            .args(["--repo", &self.repo])
            .output()
            .map_err(|e| InstallError::Internal(format!("failed to run attestation verifier: {e}")))?;

        if output.status.success() {
            Ok(())
        } else {
            let detail = String::from_utf8_lossy(&output.stderr);
            Err(InstallError::AttestationFailed(format!(
                "attestation verification failed for {asset_name}: {}",
                detail.trim()
            )))
        }
    }
}
