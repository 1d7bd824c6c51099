//! Per-session subspace selection from the client's filesystem "roots".
//!
//! The server asks the client for its roots and, on success, targets a
//! subspace named `<base>/<sha256(sorted normalized roots)>`; on any
//! failure (timeout, transport error, JSON-RPC error, empty/invalid root
//! list) it falls back to the base store root directly.

use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;

use ccsa_store::ArtifactService;

use crate::mcp::transport::{Outbound, OutboundError};

pub const ROOTS_LIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Normalize one client-reported root URI: require scheme `file`, lowercase
/// the host, and accept only an empty host or `localhost` (this is a
/// single-host store — any other host names a filesystem we can't see and
/// is dropped), `path.Clean` the path, and require it be absolute. Returns
/// `None` if the root should be dropped.
pub fn normalize_root(raw: &str) -> Option<String> {
    let rest = raw.strip_prefix("file://")?;
    let (host, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    let host = host.to_ascii_lowercase();
    if !host.is_empty() && host != "localhost" {
        return None;
    }
    if !path.starts_with('/') {
        return None;
    }
    let cleaned = clean_path(path);
    if !cleaned.starts_with('/') {
        return None;
    }
    Some(format!("file://{cleaned}"))
}

/// A minimal `path.Clean`-equivalent: collapses `.` and `..` components and
/// repeated slashes, without ever climbing above the root for an absolute
/// path.
fn clean_path(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    format!("/{}", out.join("/"))
}

/// Normalize, dedupe and sort a raw list of root URIs (as reported by
/// `roots/list`). Returns `None` if the list is empty after normalization.
pub fn normalize_roots(raw_uris: &[String]) -> Option<Vec<String>> {
    let mut normalized: Vec<String> = raw_uris.iter().filter_map(|u| normalize_root(u)).collect();
    if normalized.is_empty() {
        return None;
    }
    normalized.sort();
    normalized.dedup();
    Some(normalized)
}

/// `SHA-256(join("\n", sortedRoots))`, lowercase hex.
pub fn roots_hash(sorted_roots: &[String]) -> String {
    let joined = sorted_roots.join("\n");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hex::encode(hasher.finalize())
}

/// Lazily resolves and holds the session's current artifact service,
/// switching it atomically under a session lock (`resolveMu` in the spec).
pub struct SubspaceResolver {
    base_root: PathBuf,
    state: RwLock<State>,
}

struct State {
    service: std::sync::Arc<ArtifactService>,
    resolved: bool,
}

impl SubspaceResolver {
    pub fn new(base_root: PathBuf) -> Self {
        let service = std::sync::Arc::new(ArtifactService::new(base_root.clone()));
        Self {
            base_root,
            state: RwLock::new(State {
                service,
                resolved: false,
            }),
        }
    }

    /// The current service, resolving the subspace first if it never has
    /// been (unless `force`, which always re-resolves).
    pub fn service(
        &self,
        force: bool,
        initialized: bool,
        roots_capability: bool,
        outbound: &Outbound,
    ) -> std::sync::Arc<ArtifactService> {
        {
            let guard = self.state.read().unwrap();
            if guard.resolved && !force {
                return guard.service.clone();
            }
        }
        if initialized && roots_capability {
            self.resolve(outbound);
        } else {
            let mut guard = self.state.write().unwrap();
            guard.resolved = true;
        }
        self.state.read().unwrap().service.clone()
    }

    fn resolve(&self, outbound: &Outbound) {
        let target = match outbound.call("roots/list", None, ROOTS_LIST_TIMEOUT) {
            Ok(value) => {
                let uris: Vec<String> = value
                    .get("roots")
                    .and_then(|r| r.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|root| root.get("uri").and_then(|u| u.as_str()))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                normalize_roots(&uris).map(|sorted| self.base_root.join(roots_hash(&sorted)))
            }
            Err(OutboundError::Timeout) => {
                tracing::warn!("roots/list timed out; falling back to the global subspace");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "roots/list failed; falling back to the global subspace");
                None
            }
        };

        let root = target.unwrap_or_else(|| self.base_root.clone());
        let mut guard = self.state.write().unwrap();
        guard.service = std::sync::Arc::new(ArtifactService::new(root));
        guard.resolved = true;
    }
}
