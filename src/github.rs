//! A concrete `ReleaseFetcher`: GitHub's releases API over a blocking
//! `reqwest` client. The installer crate only depends on the
//! [`ccsa_installer::ReleaseFetcher`] trait so its orchestration logic stays
//! testable against fakes (see `manager.rs`'s tests); this is the thin,
//! separately-gated real implementation the binary wires in.

use std::time::Duration;

use serde::Deserialize;

use ccsa_installer::{InstallError, InstallResult, Release, ReleaseAsset, ReleaseFetcher};

const USER_AGENT: &str = concat!("ccsubagents/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GitHubReleaseFetcher {
    client: reqwest::blocking::Client,
    token: Option<String>,
}

impl GitHubReleaseFetcher {
    /// Build a fetcher, reading `GITHUB_TOKEN` for authenticated requests
    /// (raises GitHub's unauthenticated rate limit; absent is fine for
    /// public repos).
    pub fn from_env() -> InstallResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InstallError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            token: std::env::var("GITHUB_TOKEN").ok(),
        })
    }

    fn authorize(&self, req: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubRelease {
    id: u64,
    tag_name: String,
    assets: Vec<GitHubAsset>,
}

#[derive(Debug, Deserialize)]
struct GitHubAsset {
    name: String,
    browser_download_url: String,
}

impl ReleaseFetcher for GitHubReleaseFetcher {
    fn fetch_latest(&self, repo: &str) -> InstallResult<Release> {
        let url = format!("https://api.github.com/repos/{repo}/releases/latest");
        let req = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        let response = self
            .authorize(req)
            .send()
            .map_err(|e| InstallError::Internal(format!("release metadata request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(InstallError::Internal(format!(
                "release metadata request for {repo} returned {}",
                response.status()
            )));
        }
        let parsed: GitHubRelease = response
            .json()
            .map_err(|e| InstallError::Internal(format!("malformed release metadata: {e}")))?;
        Ok(Release {
            id: parsed.id.to_string(),
            tag_name: parsed.tag_name,
            assets: parsed
                .assets
                .into_iter()
                .map(|a| ReleaseAsset {
                    name: a.name,
                    browser_download_url: a.browser_download_url,
                })
                .collect(),
        })
    }

    fn download_asset(&self, asset: &ReleaseAsset) -> InstallResult<Vec<u8>> {
        let req = self
            .client
            .get(&asset.browser_download_url)
            .header("Accept", "application/octet-stream");
        let response = self
            .authorize(req)
            .send()
            .map_err(|e| InstallError::Internal(format!("asset download failed: {e}")))?;
        if !response.status().is_success() {
            return Err(InstallError::Internal(format!(
                "asset {} download returned {}",
                asset.name,
                response.status()
            )));
        }
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| InstallError::Internal(format!("failed to read asset body: {e}")))
    }
}
