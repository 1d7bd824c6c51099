//! External collaborators the installer orchestrates but does not itself
//! implement: release-metadata fetch and attestation verification. Both are
//! narrow trait boundaries so the orchestration logic is fully testable
//! against fakes; a real HTTP-backed implementation is a separately-gated
//! concern outside this crate.

use crate::error::InstallResult;

#[derive(Debug, Clone)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

#[derive(Debug, Clone)]
pub struct Release {
    pub id: String,
    pub tag_name: String,
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

pub trait ReleaseFetcher {
    /// Fetch the latest release's metadata for `repo`.
    fn fetch_latest(&self, repo: &str) -> InstallResult<Release>;

    /// Download one asset's raw bytes.
    fn download_asset(&self, asset: &ReleaseAsset) -> InstallResult<Vec<u8>>;
}

pub trait AttestationVerifier {
    /// Verify `bytes` as the named release asset. Any failure is fatal to
    /// the install/update unless verification was explicitly skipped by the
    /// caller.
    fn verify(&self, asset_name: &str, bytes: &[u8]) -> InstallResult<()>;
}

#[cfg(test)]
pub mod fakes {
    use super::*;
    use std::collections::HashMap;

    /// A fetcher backed by an in-memory table, for manager tests.
    pub struct FakeReleaseFetcher {
        pub release: Release,
        pub assets: HashMap<String, Vec<u8>>,
    }

    impl ReleaseFetcher for FakeReleaseFetcher {
        fn fetch_latest(&self, _repo: &str) -> InstallResult<Release> {
            Ok(self.release.clone())
        }

        fn download_asset(&self, asset: &ReleaseAsset) -> InstallResult<Vec<u8>> {
            self.assets
                .get(&asset.name)
                .cloned()
                .ok_or_else(|| crate::error::InstallError::NotFound(asset.name.clone()))
        }
    }

    pub struct AlwaysVerifies;

    impl AttestationVerifier for AlwaysVerifies {
        fn verify(&self, _asset_name: &str, _bytes: &[u8]) -> InstallResult<()> {
            Ok(())
        }
    }

    pub struct AlwaysFails;

    impl AttestationVerifier for AlwaysFails {
        fn verify(&self, asset_name: &str, _bytes: &[u8]) -> InstallResult<()> {
            Err(crate::error::InstallError::AttestationFailed(format!(
                "Error: attestation verification failed for {asset_name}"
            )))
        }
    }
}
