//! The installer's tracked-state journal (`tracked.json`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::atomic::write_atomic;
use crate::error::{InstallError, InstallResult};

pub const CURRENT_TRACKED_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Managed {
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsEdit {
    pub file: PathBuf,
    pub agent_path: String,
    pub added: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpEdit {
    pub file: PathBuf,
    pub key: String,
    pub touched: bool,
    pub had_previous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoreEdit {
    pub file: PathBuf,
    pub added_lines: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonEdits {
    #[serde(default)]
    pub settings: Vec<SettingsEdit>,
    #[serde(default)]
    pub mcp: Vec<McpEdit>,
}

impl JsonEdits {
    /// Find the settings edit that applies to `target_file`, honoring the
    /// legacy compatibility rule: an older tracked state may hold a single
    /// settings edit with an empty `file`, recorded before per-file tracking
    /// existed. That lone edit matches any current target file.
    pub fn settings_edit_for<'a>(&'a self, target_file: &Path) -> Option<&'a SettingsEdit> {
        if let Some(e) = self.settings.iter().find(|e| e.file == target_file) {
            return Some(e);
        }
        if self.settings.len() == 1 && self.settings[0].file.as_os_str().is_empty() {
            return Some(&self.settings[0]);
        }
        None
    }

    pub fn mcp_edit_for<'a>(&'a self, target_file: &Path) -> Option<&'a McpEdit> {
        if let Some(e) = self.mcp.iter().find(|e| e.file == target_file) {
            return Some(e);
        }
        if self.mcp.len() == 1 && self.mcp[0].file.as_os_str().is_empty() {
            return Some(&self.mcp[0]);
        }
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalInstall {
    pub repo: String,
    pub release_id: String,
    pub release_tag: String,
    pub installed_at: DateTime<Utc>,
    #[serde(default)]
    pub managed: Managed,
    #[serde(default)]
    pub json_edits: JsonEdits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalMode {
    Personal,
    Team,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalInstall {
    pub root: PathBuf,
    pub mode: LocalMode,
    #[serde(default)]
    pub binary_only: bool,
    #[serde(default)]
    pub managed: Managed,
    #[serde(default)]
    pub json_edits: JsonEdits,
    #[serde(default)]
    pub ignore_edits: Vec<IgnoreEdit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedState {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalInstall>,
    #[serde(default)]
    pub local: Vec<LocalInstall>,
}

impl Default for TrackedState {
    fn default() -> Self {
        Self {
            version: CURRENT_TRACKED_VERSION,
            global: None,
            local: Vec::new(),
        }
    }
}

impl TrackedState {
    pub fn is_empty(&self) -> bool {
        self.global.is_none() && self.local.is_empty()
    }

    /// Load `tracked.json`, promoting any older schema version in place.
    /// A missing file is a fresh install (`Ok(None)`); a present-but-corrupt
    /// file is fatal, per the installer's invalid-state contract.
    pub fn load(path: &Path) -> InstallResult<Option<Self>> {
        match fs::read(path) {
            Ok(bytes) => {
                let mut state: TrackedState = serde_json::from_slice(&bytes).map_err(|_| {
                    InstallError::InvalidState {
                        path: path.display().to_string(),
                    }
                })?;
                if state.version < CURRENT_TRACKED_VERSION {
                    state.version = CURRENT_TRACKED_VERSION;
                }
                Ok(Some(state))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist via same-directory temp + rename, or remove the file once
    /// both Global and Local are empty.
    pub fn save(&self, path: &Path) -> InstallResult<()> {
        if self.is_empty() {
            match fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        } else {
            let bytes = serde_json::to_vec_pretty(self)?;
            write_atomic(path, &bytes, 0o644)
        }
    }

    pub fn local_mut(&mut self, root: &Path) -> Option<&mut LocalInstall> {
        self.local.iter_mut().find(|l| l.root == root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_missing_is_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracked.json");
        assert!(TrackedState::load(&path).unwrap().is_none());
    }

    #[test]
    fn load_corrupt_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracked.json");
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            TrackedState::load(&path).unwrap_err(),
            InstallError::InvalidState { .. }
        ));
    }

    #[test]
    fn save_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracked.json");
        let mut state = TrackedState::default();
        state.global = Some(GlobalInstall {
            repo: "example/ccsubagents".to_string(),
            release_id: "1".to_string(),
            release_tag: "v1.0.0".to_string(),
            installed_at: Utc::now(),
            managed: Managed::default(),
            json_edits: JsonEdits::default(),
        });
        state.save(&path).unwrap();
        let loaded = TrackedState::load(&path).unwrap().unwrap();
        assert_eq!(loaded.global.unwrap().release_tag, "v1.0.0");
    }

    #[test]
    fn save_removes_file_when_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracked.json");
        TrackedState::default().save(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn legacy_single_empty_file_edit_matches_any_target() {
        let edits = JsonEdits {
            settings: vec![SettingsEdit {
                file: PathBuf::new(),
                agent_path: "~/agents/a.md".to_string(),
                added: true,
            }],
            mcp: Vec::new(),
        };
        let found = edits.settings_edit_for(Path::new("/some/settings.json"));
        assert!(found.is_some());
    }
}
