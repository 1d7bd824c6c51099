//! Editing `.gitignore` / `.git/info/exclude` for local installs: append
//! lines literally, and remember exactly what was appended so uninstall can
//! remove only those lines.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::atomic::write_atomic_text;
use crate::error::{InstallError, InstallResult};

/// Append any of `lines` not already present, verbatim. Returns the subset
/// actually appended (what the tracked `IgnoreEdit.AddedLines` must record).
pub fn add_ignore_lines(path: &Path, lines: &[String]) -> InstallResult<Vec<String>> {
    let existing = fs::read_to_string(path).unwrap_or_default();
    let existing_lines: HashSet<&str> = existing.lines().collect();

    let to_add: Vec<String> = lines
        .iter()
        .filter(|l| !existing_lines.contains(l.as_str()))
        .cloned()
        .collect();
    if to_add.is_empty() {
        return Ok(to_add);
    }

    let mut new_content = existing;
    if !new_content.is_empty() && !new_content.ends_with('\n') {
        new_content.push('\n');
    }
    for line in &to_add {
        new_content.push_str(line);
        new_content.push('\n');
    }
    write_atomic_text(path, &new_content)?;
    Ok(to_add)
}

/// Remove exactly `lines` from the file, tolerating a missing file.
pub fn remove_ignore_lines(path: &Path, lines: &[String]) -> InstallResult<()> {
    let existing = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let remove: HashSet<&str> = lines.iter().map(String::as_str).collect();
    let kept: Vec<&str> = existing.lines().filter(|l| !remove.contains(l)).collect();

    let mut new_content = kept.join("\n");
    if !new_content.is_empty() {
        new_content.push('\n');
    }
    write_atomic_text(path, &new_content)
}

/// Resolve `<repo>/.git/info/exclude`, following a `.git` file that points
/// at a worktree's real gitdir (`gitdir: <path>`).
pub fn git_info_exclude_path(repo_root: &Path) -> InstallResult<PathBuf> {
    let git_path = repo_root.join(".git");
    let meta = fs::symlink_metadata(&git_path)?;
    if meta.is_dir() {
        return Ok(git_path.join("info").join("exclude"));
    }

    let contents = fs::read_to_string(&git_path)?;
    let gitdir = contents
        .trim()
        .strip_prefix("gitdir:")
        .map(str::trim)
        .ok_or_else(|| {
            InstallError::InvalidInput(format!("malformed .git file at {}", git_path.display()))
        })?;
    let gitdir_path = Path::new(gitdir);
    let gitdir_path = if gitdir_path.is_absolute() {
        gitdir_path.to_path_buf()
    } else {
        repo_root.join(gitdir_path)
    };
    Ok(gitdir_path.join("info").join("exclude"))
}
