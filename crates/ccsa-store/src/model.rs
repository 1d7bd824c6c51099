//! Artifact data model: the content record, its kind, selectors, and the
//! on-disk alias index envelope.

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{StoreError, StoreResult};

/// The ref format regex: `YYYYMMDDThhmmssZ-<16 hex>`.
fn ref_regex() -> Regex {
    Regex::new(r"^\d{8}T\d{6}Z-[0-9a-f]{16}$").expect("static pattern is valid")
}

/// Schema version stamped on every persisted JSON document this crate owns.
pub const SCHEMA_VERSION: u32 = 1;
pub const NAMES_SCHEMA_ID: &str = "ccsubagents/names@1";

pub const MAX_NAME_BYTES: usize = 200;
pub const DEFAULT_LIST_LIMIT: usize = 200;
pub const MAX_LIST_LIMIT: usize = 1000;

/// The kind of content an artifact carries, derived from its MIME type at
/// save time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Text,
    File,
    Image,
}

impl ArtifactKind {
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            ArtifactKind::Image
        } else if mime.starts_with("text/") {
            ArtifactKind::Text
        } else {
            ArtifactKind::File
        }
    }
}

/// A stored artifact's metadata record (`meta/<ref>.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "ref")]
    pub ref_: String,
    #[serde(default)]
    pub name: String,
    pub kind: ArtifactKind,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(rename = "sizeBytes")]
    pub size_bytes: u64,
    pub sha256: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "prevRef", default, skip_serializing_if = "Option::is_none")]
    pub prev_ref: Option<String>,
}

/// A reference to an artifact: by stable ref, or by current name.
/// Exactly one of the two must be set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Ref(String),
    Name(String),
}

impl Selector {
    pub fn validate(&self) -> StoreResult<()> {
        match self {
            Selector::Ref(r) => validate_ref(r),
            Selector::Name(n) => validate_name(n).map(|_| ()),
        }
    }
}

/// Trim and validate a user-supplied name: non-empty after trim, valid
/// UTF-8 (guaranteed by `&str`), at most 200 bytes, no control characters.
pub fn validate_name(raw: &str) -> StoreResult<String> {
    let trimmed = raw.trim().to_string();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidInput("name must not be empty".into()));
    }
    if trimmed.len() > MAX_NAME_BYTES {
        return Err(StoreError::InvalidInput(format!(
            "name exceeds {MAX_NAME_BYTES} bytes"
        )));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(StoreError::InvalidInput(
            "name must not contain control characters".into(),
        ));
    }
    Ok(trimmed)
}

pub fn validate_ref(raw: &str) -> StoreResult<()> {
    if ref_regex().is_match(raw) {
        Ok(())
    } else {
        Err(StoreError::InvalidInput(format!("malformed ref: {raw}")))
    }
}

pub fn clamp_limit(limit: i64) -> StoreResult<usize> {
    if limit <= 0 {
        Ok(DEFAULT_LIST_LIMIT)
    } else if limit as usize > MAX_LIST_LIMIT {
        Err(StoreError::InvalidInput(format!(
            "limit must not exceed {MAX_LIST_LIMIT}"
        )))
    } else {
        Ok(limit as usize)
    }
}

/// `names.json`: the alias index mapping a name to its latest ref.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasIndex {
    pub version: u32,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    pub names: BTreeMap<String, String>,
}

impl Default for AliasIndex {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            updated_at: Utc::now(),
            names: BTreeMap::new(),
        }
    }
}
