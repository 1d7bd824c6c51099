//! Zip extraction with path-traversal safety checks: any entry that is
//! absolute, contains a `..` component, or escapes the destination after
//! cleaning is rejected and nothing is written.

use std::fs;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use crate::atomic::write_atomic;
use crate::error::{InstallError, InstallResult};

/// List entry names without extracting, used to detect a common leading
/// directory before deciding whether to strip it.
pub fn zip_entry_names(bytes: &[u8]) -> InstallResult<Vec<String>> {
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| InstallError::InvalidInput(format!("invalid archive: {e}")))?;
    let mut names = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let file = zip
            .by_index(i)
            .map_err(|e| InstallError::InvalidInput(format!("invalid archive entry: {e}")))?;
        names.push(file.name().to_string());
    }
    Ok(names)
}

/// If every non-empty entry lives under the same top-level directory,
/// return that directory name so callers can strip it (the agents-archive
/// one-shot rule: strip a leading `agents/` if every entry carries it).
pub fn common_leading_dir(names: &[String]) -> Option<String> {
    let mut candidate: Option<&str> = None;
    for raw in names {
        let trimmed = raw.trim_end_matches('/');
        if trimmed.is_empty() {
            continue;
        }
        let first = trimmed.split('/').next().unwrap();
        match candidate {
            None => candidate = Some(first),
            Some(c) if c == first => {}
            _ => return None,
        }
    }
    candidate.map(str::to_string)
}

/// Validate and resolve an archive entry's destination path under `dest`.
pub fn safe_join(dest: &Path, entry_name: &str) -> InstallResult<PathBuf> {
    let entry_path = Path::new(entry_name);
    if entry_path.is_absolute() {
        return Err(InstallError::InvalidInput(format!(
            "archive entry is absolute: {entry_name}"
        )));
    }
    if entry_path
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(InstallError::InvalidInput(format!(
            "archive entry contains a parent-directory component: {entry_name}"
        )));
    }

    let joined = dest.join(entry_path);
    let cleaned = clean(&joined);
    if !cleaned.starts_with(dest) {
        return Err(InstallError::InvalidInput(format!(
            "archive entry escapes destination: {entry_name}"
        )));
    }
    Ok(cleaned)
}

fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Extract every entry of a zip archive into `dest`, optionally stripping a
/// leading directory prefix. Rejects unsafe entries before writing any of
/// them by validating the whole entry list up front.
pub fn extract_zip(bytes: &[u8], dest: &Path, strip_prefix: Option<&str>) -> InstallResult<Vec<PathBuf>> {
    let names = zip_entry_names(bytes)?;
    let stripped_names: Vec<String> = names
        .iter()
        .map(|n| strip(n, strip_prefix))
        .collect();

    // Validate every destination before writing any file.
    let mut targets = Vec::with_capacity(stripped_names.len());
    for name in &stripped_names {
        if name.is_empty() {
            targets.push(None);
            continue;
        }
        targets.push(Some(safe_join(dest, name)?));
    }

    let mut zip = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| InstallError::InvalidInput(format!("invalid archive: {e}")))?;
    let mut extracted = Vec::new();
    for i in 0..zip.len() {
        let Some(out_path) = &targets[i] else {
            continue;
        };
        let mut file = zip
            .by_index(i)
            .map_err(|e| InstallError::InvalidInput(format!("invalid archive entry: {e}")))?;
        if file.is_dir() {
            fs::create_dir_all(out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut buf = Vec::new();
        std::io::copy(&mut file, &mut buf)?;
        write_atomic(out_path, &buf, 0o644)?;
        extracted.push(out_path.clone());
    }
    Ok(extracted)
}

fn strip(name: &str, prefix: Option<&str>) -> String {
    match prefix {
        Some(p) if !p.is_empty() => name
            .strip_prefix(p)
            .map(|s| s.trim_start_matches('/'))
            .unwrap_or(name)
            .to_string(),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_absolute_entry() {
        let dir = tempfile::tempdir().unwrap();
        assert!(safe_join(dir.path(), "/abs/x").is_err());
    }

    #[test]
    fn rejects_parent_dir_entry() {
        let dir = tempfile::tempdir().unwrap();
        assert!(safe_join(dir.path(), "../x").is_err());
        assert!(safe_join(dir.path(), "x/../../y").is_err());
    }

    #[test]
    fn accepts_plain_nested_entry() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = safe_join(dir.path(), "a/b/c.txt").unwrap();
        assert_eq!(resolved, dir.path().join("a/b/c.txt"));
    }

    #[test]
    fn common_leading_dir_detects_shared_prefix() {
        let names = vec![
            "agents/a.md".to_string(),
            "agents/sub/b.md".to_string(),
        ];
        assert_eq!(common_leading_dir(&names), Some("agents".to_string()));
    }

    #[test]
    fn common_leading_dir_none_when_mixed() {
        let names = vec!["agents/a.md".to_string(), "other/b.md".to_string()];
        assert_eq!(common_leading_dir(&names), None);
    }
}
