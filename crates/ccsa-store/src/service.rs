//! The artifact service: normalizes and validates inputs, then delegates to
//! the file store.

use chrono::{TimeZone, Utc};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::error::StoreResult;
use crate::file_store::FileStore;
use crate::model::{clamp_limit, validate_name, Artifact, ArtifactKind, Selector};
use crate::refgen::generate_ref;

pub struct SaveTextParams {
    pub name: String,
    pub text: String,
    pub mime_type: Option<String>,
    pub expected_prev_ref: Option<String>,
}

pub struct SaveBlobParams {
    pub name: String,
    pub data: Vec<u8>,
    pub mime_type: String,
    pub filename: Option<String>,
    pub expected_prev_ref: Option<String>,
}

pub struct ArtifactService {
    store: FileStore,
}

impl ArtifactService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            store: FileStore::new(root),
        }
    }

    pub fn store_root(&self) -> &std::path::Path {
        self.store.root()
    }

    pub fn save_text(&self, params: SaveTextParams) -> StoreResult<Artifact> {
        let name = validate_name(&params.name)?;
        let mime_type = params
            .mime_type
            .unwrap_or_else(|| "text/plain; charset=utf-8".to_string());
        self.save(
            name,
            params.text.into_bytes(),
            mime_type,
            None,
            params.expected_prev_ref,
        )
    }

    pub fn save_blob(&self, params: SaveBlobParams) -> StoreResult<Artifact> {
        let name = validate_name(&params.name)?;
        self.save(
            name,
            params.data,
            params.mime_type,
            params.filename,
            params.expected_prev_ref,
        )
    }

    fn save(
        &self,
        name: String,
        payload: Vec<u8>,
        mime_type: String,
        filename: Option<String>,
        expected_prev_ref: Option<String>,
    ) -> StoreResult<Artifact> {
        let r = generate_ref()?;
        let sha256 = sha256_hex(&payload);
        let artifact = Artifact {
            ref_: r,
            name,
            kind: ArtifactKind::from_mime(&mime_type),
            mime_type,
            filename,
            size_bytes: payload.len() as u64,
            sha256,
            created_at: now_truncated_to_second(),
            prev_ref: None,
        };
        self.store.save(artifact, &payload, expected_prev_ref)
    }

    pub fn resolve(&self, name: &str) -> StoreResult<String> {
        let name = validate_name(name)?;
        self.store.resolve(&name)
    }

    pub fn get(&self, selector: Selector) -> StoreResult<(Artifact, Vec<u8>)> {
        selector.validate()?;
        self.store.get(&selector)
    }

    pub fn delete(&self, selector: Selector) -> StoreResult<Artifact> {
        selector.validate()?;
        self.store.delete(&selector)
    }

    pub fn list(&self, prefix: &str, limit: i64) -> StoreResult<Vec<Artifact>> {
        let limit = clamp_limit(limit)?;
        self.store.list(prefix, limit)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn now_truncated_to_second() -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(Utc::now().timestamp(), 0).unwrap()
}
