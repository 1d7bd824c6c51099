//! Orchestrates install/update/uninstall: fetch, verify, extract, apply
//! JSON edits, apply ignore rules, update tracked state, rolling back on
//! any mid-install failure.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::{common_leading_dir, extract_zip};
use crate::error::{InstallError, InstallResult};
use crate::ignore_edit::{add_ignore_lines, git_info_exclude_path, remove_ignore_lines};
use crate::journal::RollbackJournal;
use crate::json_edit::{
    capture_mcp_previous, read_json_object, remove_agent_path, restore_mcp_server, set_agent_path,
    set_mcp_server, write_json_object,
};
use crate::model::{
    GlobalInstall, IgnoreEdit, JsonEdits, LocalInstall, LocalMode, Managed, McpEdit, SettingsEdit,
    TrackedState,
};
use crate::paths::{tildeify, ConfigTarget, Paths};
use crate::traits::{AttestationVerifier, ReleaseFetcher};

const BUNDLE_ASSET: &str = "local-artifact-bundle.zip";
const AGENTS_ASSET: &str = "agents.zip";
const AGENTS_LEADING_DIR: &str = "agents";
const MCP_SERVER_KEY: &str = "ccsubagents";

pub struct InstallOptions {
    pub repo: String,
    pub binary_assets: Vec<String>,
    pub config_targets: Vec<ConfigTarget>,
    pub skip_attestations: bool,
}

#[derive(Debug)]
pub struct InstallReport {
    pub release_tag: String,
    pub no_op: bool,
}

pub struct InstallerManager<'a> {
    pub paths: Paths,
    pub fetcher: &'a dyn ReleaseFetcher,
    pub verifier: &'a dyn AttestationVerifier,
}

impl<'a> InstallerManager<'a> {
    pub fn new(paths: Paths, fetcher: &'a dyn ReleaseFetcher, verifier: &'a dyn AttestationVerifier) -> Self {
        Self { paths, fetcher, verifier }
    }

    /// Phase 1: resolve environment, load tracked state (absent = fresh).
    fn load_tracked(&self) -> InstallResult<TrackedState> {
        fs::create_dir_all(&self.paths.state_dir)?;
        Ok(TrackedState::load(&self.paths.tracked_path())?.unwrap_or_default())
    }

    pub fn install(&self, opts: &InstallOptions) -> InstallResult<InstallReport> {
        self.install_or_update(opts, false)
    }

    pub fn update(&self, opts: &InstallOptions) -> InstallResult<InstallReport> {
        self.install_or_update(opts, true)
    }

    fn install_or_update(&self, opts: &InstallOptions, is_update: bool) -> InstallResult<InstallReport> {
        let mut tracked = self.load_tracked()?;

        let release = self
            .fetcher
            .fetch_latest(&opts.repo)
            .map_err(|e| InstallError::Internal(format!("failed to fetch release metadata: {e}")))?;

        if is_update {
            if let Some(global) = &tracked.global {
                if global.release_tag == release.tag_name {
                    return Ok(InstallReport {
                        release_tag: release.tag_name,
                        no_op: true,
                    });
                }
            }
        }

        let config_targets: Vec<ConfigTarget> = if !opts.config_targets.is_empty() {
            opts.config_targets.clone()
        } else if is_update {
            self.derive_update_targets(&tracked)
        } else {
            vec![self.paths.default_config_target()]
        };

        let mut journal = RollbackJournal::new();
        match self.run_phases(opts, &release, &config_targets, &mut tracked, is_update, &mut journal) {
            Ok(()) => Ok(InstallReport {
                release_tag: release.tag_name,
                no_op: false,
            }),
            Err(e) => {
                let rollback_errors = journal.restore();
                Err(InstallError::with_rollback(e.to_string(), &rollback_errors))
            }
        }
    }

    fn derive_update_targets(&self, tracked: &TrackedState) -> Vec<ConfigTarget> {
        let Some(global) = &tracked.global else {
            return vec![self.paths.default_config_target()];
        };
        let mut files: BTreeSet<PathBuf> = BTreeSet::new();
        for edit in &global.json_edits.settings {
            if !edit.file.as_os_str().is_empty() {
                files.insert(edit.file.clone());
            }
        }
        for edit in &global.json_edits.mcp {
            if !edit.file.as_os_str().is_empty() {
                files.insert(edit.file.clone());
            }
        }
        if files.is_empty() {
            return vec![self.paths.default_config_target()];
        }
        // Pair each settings file with its sibling mcp file by tracked
        // file identity; fall back to the default mcp path if untracked.
        global
            .json_edits
            .settings
            .iter()
            .map(|e| ConfigTarget {
                settings_path: e.file.clone(),
                mcp_path: global
                    .json_edits
                    .mcp
                    .first()
                    .map(|m| m.file.clone())
                    .unwrap_or_else(|| self.paths.mcp_path.clone()),
            })
            .collect()
    }

    fn run_phases(
        &self,
        opts: &InstallOptions,
        release: &crate::traits::Release,
        config_targets: &[ConfigTarget],
        tracked: &mut TrackedState,
        is_update: bool,
        journal: &mut RollbackJournal,
    ) -> InstallResult<()> {
        // Phase 4: download required assets.
        let mut downloaded = Vec::new();
        for asset_name in opts
            .binary_assets
            .iter()
            .cloned()
            .chain([BUNDLE_ASSET.to_string(), AGENTS_ASSET.to_string()])
        {
            let asset = release.asset(&asset_name).ok_or_else(|| {
                InstallError::Internal(format!("release is missing required asset {asset_name}"))
            })?;
            let bytes = self.fetcher.download_asset(asset)?;
            downloaded.push((asset_name, bytes));
        }

        // Phase 5: verify attestations.
        if opts.skip_attestations {
            tracing::warn!("attestation verification skipped by flag");
        } else {
            for (name, bytes) in &downloaded {
                self.verifier.verify(name, bytes).map_err(|_| {
                    InstallError::AttestationFailed(format!(
                        "Error: attestation verification failed for {name}"
                    ))
                })?;
            }
        }

        let asset_bytes = |name: &str| -> &[u8] {
            downloaded
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, b)| b.as_slice())
                .unwrap_or(&[])
        };

        // Phase 6: extract bundles.
        let scratch_dir = self.paths.state_dir.join(".install-scratch");
        fs::create_dir_all(&scratch_dir)?;
        extract_zip(asset_bytes(BUNDLE_ASSET), &scratch_dir, None)?;

        let agents_bytes = asset_bytes(AGENTS_ASSET);
        let agent_names = crate::archive::zip_entry_names(agents_bytes)?;
        let strip = match common_leading_dir(&agent_names) {
            Some(ref d) if d == AGENTS_LEADING_DIR => Some(AGENTS_LEADING_DIR),
            _ => None,
        };
        fs::create_dir_all(&self.paths.agents_dir)?;
        for rel_name in &agent_names {
            let rel = match strip {
                Some(p) => rel_name.strip_prefix(p).map(|s| s.trim_start_matches('/')).unwrap_or(rel_name),
                None => rel_name,
            };
            if rel.is_empty() || rel_name.ends_with('/') {
                continue;
            }
            let target = self.paths.agents_dir.join(rel);
            if let Some(parent) = target.parent() {
                if !parent.exists() {
                    fs::create_dir_all(parent)?;
                    journal.track_created_dir(parent);
                }
            }
            journal.capture_file(&target)?;
        }
        let extracted_agents = extract_zip(agents_bytes, &self.paths.agents_dir, strip)?;

        // Phase 7: install binaries.
        fs::create_dir_all(&self.paths.bin_dir)?;
        let mut binary_paths = Vec::new();
        for name in &opts.binary_assets {
            let target = self.paths.bin_dir.join(name);
            journal.capture_file(&target)?;
            crate::atomic::write_atomic(&target, asset_bytes(name), 0o755)?;
            binary_paths.push(target);
        }

        // Phase 9: apply JSON edits.
        let mut settings_edits = Vec::new();
        let mut mcp_edits = Vec::new();
        for target in config_targets {
            let agent_path = tildeify(&self.paths.agents_dir, &self.paths.home);
            journal.capture_file(&target.settings_path)?;
            let mut settings = read_json_object(&target.settings_path)?;
            let previous_edit = tracked
                .global
                .as_ref()
                .and_then(|g| g.json_edits.settings_edit_for(&target.settings_path).cloned());
            let previously_added = previous_edit.as_ref().map(|e| e.added).unwrap_or(false);
            let added = set_agent_path(
                &mut settings,
                &agent_path,
                previous_edit.as_ref().map(|e| e.agent_path.as_str()),
            )?;
            write_json_object(&target.settings_path, &settings)?;
            settings_edits.push(SettingsEdit {
                file: target.settings_path.clone(),
                agent_path,
                added: added || previously_added,
            });

            journal.capture_file(&target.mcp_path)?;
            let mut mcp = read_json_object(&target.mcp_path)?;
            let (had_previous, previous) = capture_mcp_previous(&mcp, MCP_SERVER_KEY);
            let command_path = tildeify(
                &self.paths.bin_dir.join(
                    opts.binary_assets
                        .first()
                        .cloned()
                        .unwrap_or_else(|| "ccsa-mcp".to_string()),
                ),
                &self.paths.home,
            );
            set_mcp_server(&mut mcp, MCP_SERVER_KEY, &command_path)?;
            write_json_object(&target.mcp_path, &mcp)?;
            mcp_edits.push(McpEdit {
                file: target.mcp_path.clone(),
                key: MCP_SERVER_KEY.to_string(),
                touched: true,
                had_previous,
                previous,
            });
        }

        // Phase 10: stale cleanup (update only).
        let mut removed_stale = Vec::new();
        if is_update {
            if let Some(global) = &tracked.global {
                let new_set: std::collections::HashSet<&PathBuf> =
                    extracted_agents.iter().collect();
                for old in &global.managed.files {
                    if old.starts_with(&self.paths.agents_dir) && !new_set.contains(old) {
                        journal.capture_file(old)?;
                        match fs::remove_file(old) {
                            Ok(()) => removed_stale.push(old.clone()),
                            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
            }
        }

        // Phase 11: persist tracked state.
        let mut managed_files: Vec<PathBuf> = extracted_agents.clone();
        managed_files.extend(binary_paths.iter().cloned());
        tracked.global = Some(GlobalInstall {
            repo: opts.repo.clone(),
            release_id: release.id.clone(),
            release_tag: release.tag_name.clone(),
            installed_at: chrono::Utc::now(),
            managed: Managed {
                files: managed_files,
                dirs: vec![self.paths.agents_dir.clone()],
            },
            json_edits: JsonEdits {
                settings: settings_edits,
                mcp: mcp_edits,
            },
        });
        tracked.save(&self.paths.tracked_path())?;

        let _ = fs::remove_dir_all(&scratch_dir);
        Ok(())
    }

    /// Uninstall the global install. A missing tracked state is a no-op
    /// success.
    pub fn uninstall_global(&self) -> InstallResult<()> {
        let tracked_path = self.paths.tracked_path();
        let Some(mut tracked) = TrackedState::load(&tracked_path)? else {
            return Ok(());
        };
        let Some(global) = tracked.global.take() else {
            tracked.save(&tracked_path)?;
            return Ok(());
        };

        let agents_dir = &self.paths.agents_dir;
        let mut config_parents: BTreeSet<PathBuf> = BTreeSet::new();
        config_parents.insert(self.paths.settings_path.parent().unwrap_or(Path::new("/")).to_path_buf());
        config_parents.insert(self.paths.mcp_path.parent().unwrap_or(Path::new("/")).to_path_buf());
        for edit in &global.json_edits.settings {
            if let Some(p) = edit.file.parent() {
                config_parents.insert(p.to_path_buf());
            }
        }
        for edit in &global.json_edits.mcp {
            if let Some(p) = edit.file.parent() {
                config_parents.insert(p.to_path_buf());
            }
        }

        let binaries_allow: BTreeSet<&PathBuf> = global
            .managed
            .files
            .iter()
            .filter(|f| f.starts_with(&self.paths.bin_dir))
            .collect();

        for file in &global.managed.files {
            let within_agents = file.starts_with(agents_dir);
            let within_binaries = binaries_allow.contains(file);
            if !within_agents && !within_binaries {
                return Err(InstallError::Unsafe(file.display().to_string()));
            }
            match fs::remove_file(file) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        for edit in &global.json_edits.settings {
            if edit.added {
                if let Ok(mut settings) = read_json_object(&edit.file) {
                    remove_agent_path(&mut settings, &edit.agent_path);
                    let _ = write_json_object(&edit.file, &settings);
                }
            }
        }

        for edit in &global.json_edits.mcp {
            if edit.touched {
                if let Ok(mut mcp) = read_json_object(&edit.file) {
                    restore_mcp_server(&mut mcp, &edit.key, edit.had_previous, &edit.previous);
                    let _ = write_json_object(&edit.file, &mcp);
                }
            }
        }

        let mut dirs = global.managed.dirs.clone();
        dirs.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
        for dir in dirs {
            let within_agents_tree = dir.starts_with(agents_dir) || dir == agents_dir;
            let is_agents_parent = agents_dir.parent() == Some(dir.as_path());
            let is_config_allow = config_parents.contains(&dir);
            if !within_agents_tree && !is_agents_parent && !is_config_allow {
                return Err(InstallError::Unsafe(dir.display().to_string()));
            }
            match fs::remove_dir(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) if is_directory_not_empty(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracked.save(&tracked_path)?;
        Ok(())
    }

    /// Install/update/uninstall for a local (personal or team) install
    /// rooted at `repo_root`.
    pub fn install_local(
        &self,
        opts: &InstallOptions,
        repo_root: &Path,
        mode: LocalMode,
        binary_only: bool,
    ) -> InstallResult<InstallReport> {
        let mut tracked = self.load_tracked_global_only()?;
        let release = self
            .fetcher
            .fetch_latest(&opts.repo)
            .map_err(|e| InstallError::Internal(format!("failed to fetch release metadata: {e}")))?;

        let mut journal = RollbackJournal::new();
        let result = self.run_local_phases(opts, &release, repo_root, mode, binary_only, &mut tracked, &mut journal);
        match result {
            Ok(()) => Ok(InstallReport {
                release_tag: release.tag_name,
                no_op: false,
            }),
            Err(e) => {
                let rollback_errors = journal.restore();
                Err(InstallError::with_rollback(e.to_string(), &rollback_errors))
            }
        }
    }

    fn load_tracked_global_only(&self) -> InstallResult<TrackedState> {
        self.load_tracked()
    }

    fn run_local_phases(
        &self,
        opts: &InstallOptions,
        release: &crate::traits::Release,
        repo_root: &Path,
        mode: LocalMode,
        binary_only: bool,
        tracked: &mut TrackedState,
        journal: &mut RollbackJournal,
    ) -> InstallResult<()> {
        let local_bin_dir = repo_root.join(".ccsubagents").join("bin");
        fs::create_dir_all(&local_bin_dir)?;

        let mut managed_files = Vec::new();
        for name in &opts.binary_assets {
            let asset = release
                .asset(name)
                .ok_or_else(|| InstallError::Internal(format!("missing asset {name}")))?;
            let bytes = self.fetcher.download_asset(asset)?;
            if !opts.skip_attestations {
                self.verifier.verify(name, &bytes).map_err(|_| {
                    InstallError::AttestationFailed(format!(
                        "Error: attestation verification failed for {name}"
                    ))
                })?;
            }
            let target = local_bin_dir.join(name);
            journal.capture_file(&target)?;
            crate::atomic::write_atomic(&target, &bytes, 0o755)?;
            managed_files.push(target);
        }

        let ignore_path = match mode {
            LocalMode::Personal => git_info_exclude_path(repo_root)?,
            LocalMode::Team => repo_root.join(".gitignore"),
        };
        journal.capture_file(&ignore_path)?;
        let added_lines = add_ignore_lines(&ignore_path, &[".ccsubagents/".to_string()])?;

        let mut local = LocalInstall {
            root: repo_root.to_path_buf(),
            mode,
            binary_only,
            managed: Managed {
                files: managed_files,
                dirs: vec![local_bin_dir.clone()],
            },
            json_edits: JsonEdits::default(),
            ignore_edits: vec![IgnoreEdit {
                file: ignore_path,
                added_lines,
            }],
        };

        if !binary_only {
            // Local agent/config edits mirror the global phases, scoped to
            // the repo root's own settings/mcp files when present.
            let settings_path = repo_root.join(".vscode").join("settings.json");
            let mcp_path = repo_root.join(".vscode").join("mcp.json");
            journal.capture_file(&settings_path)?;
            let mut settings = read_json_object(&settings_path)?;
            let agent_path = tildeify(&self.paths.agents_dir, &self.paths.home);
            let added = set_agent_path(&mut settings, &agent_path, None)?;
            write_json_object(&settings_path, &settings)?;
            local.json_edits.settings.push(SettingsEdit {
                file: settings_path,
                agent_path,
                added,
            });

            journal.capture_file(&mcp_path)?;
            let mut mcp = read_json_object(&mcp_path)?;
            let (had_previous, previous) = capture_mcp_previous(&mcp, MCP_SERVER_KEY);
            let command_path = local_bin_dir
                .join(opts.binary_assets.first().cloned().unwrap_or_default())
                .display()
                .to_string();
            set_mcp_server(&mut mcp, MCP_SERVER_KEY, &command_path)?;
            write_json_object(&mcp_path, &mcp)?;
            local.json_edits.mcp.push(McpEdit {
                file: mcp_path,
                key: MCP_SERVER_KEY.to_string(),
                touched: true,
                had_previous,
                previous,
            });
        }

        if let Some(existing) = tracked.local_mut(repo_root) {
            *existing = local;
        } else {
            tracked.local.push(local);
        }
        tracked.save(&self.paths.tracked_path())?;
        Ok(())
    }

    pub fn uninstall_local(&self, repo_root: &Path) -> InstallResult<()> {
        let tracked_path = self.paths.tracked_path();
        let Some(mut tracked) = TrackedState::load(&tracked_path)? else {
            return Ok(());
        };
        let Some(pos) = tracked.local.iter().position(|l| l.root == repo_root) else {
            return Ok(());
        };
        let local = tracked.local.remove(pos);

        for file in &local.managed.files {
            if !file.starts_with(repo_root) {
                return Err(InstallError::Unsafe(file.display().to_string()));
            }
            let _ = fs::remove_file(file);
        }
        for edit in &local.ignore_edits {
            remove_ignore_lines(&edit.file, &edit.added_lines)?;
        }
        for edit in &local.json_edits.settings {
            if edit.added {
                if let Ok(mut settings) = read_json_object(&edit.file) {
                    remove_agent_path(&mut settings, &edit.agent_path);
                    let _ = write_json_object(&edit.file, &settings);
                }
            }
        }
        for edit in &local.json_edits.mcp {
            if edit.touched {
                if let Ok(mut mcp) = read_json_object(&edit.file) {
                    restore_mcp_server(&mut mcp, &edit.key, edit.had_previous, &edit.previous);
                    let _ = write_json_object(&edit.file, &mcp);
                }
            }
        }
        for dir in local.managed.dirs.iter().rev() {
            let _ = fs::remove_dir(dir);
        }

        tracked.save(&tracked_path)?;
        Ok(())
    }
}

fn is_directory_not_empty(e: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        e.raw_os_error() == Some(39)
    }
    #[cfg(windows)]
    {
        e.raw_os_error() == Some(145)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = e;
        false
    }
}
