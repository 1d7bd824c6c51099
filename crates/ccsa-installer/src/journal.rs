//! In-memory snapshot of files and created directories touched during an
//! install, so any mid-install failure can be undone.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{InstallError, InstallResult};

#[derive(Debug)]
struct CapturedFile {
    exists: bool,
    mode: Option<u32>,
    bytes: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct RollbackJournal {
    captures: HashMap<PathBuf, CapturedFile>,
    capture_order: Vec<PathBuf>,
    created_dirs: Vec<PathBuf>,
}

impl RollbackJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot `path`'s current state, unless it has already been
    /// captured (first capture wins). Directories cannot be snapshotted.
    pub fn capture_file(&mut self, path: &Path) -> InstallResult<()> {
        if self.captures.contains_key(path) {
            return Ok(());
        }
        if path.is_dir() {
            return Err(InstallError::Internal(format!(
                "cannot snapshot a directory: {}",
                path.display()
            )));
        }
        let captured = match fs::metadata(path) {
            Ok(meta) => CapturedFile {
                exists: true,
                mode: Some(perm_mode(&meta)),
                bytes: Some(fs::read(path)?),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CapturedFile {
                exists: false,
                mode: None,
                bytes: None,
            },
            Err(e) => return Err(e.into()),
        };
        self.captures.insert(path.to_path_buf(), captured);
        self.capture_order.push(path.to_path_buf());
        Ok(())
    }

    /// Remember a directory the installer created, so it can be removed on
    /// rollback if it ends up empty.
    pub fn track_created_dir(&mut self, path: &Path) {
        self.created_dirs.push(path.to_path_buf());
    }

    /// Undo every captured mutation, best-effort. Returns the messages of
    /// any restores that failed; it never panics mid-way.
    pub fn restore(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for path in &self.capture_order {
            let Some(cap) = self.captures.get(path) else {
                continue;
            };
            let result = if cap.exists {
                restore_file(path, cap)
            } else {
                match fs::remove_file(path) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e),
                }
            };
            if let Err(e) = result {
                errors.push(format!("{}: {e}", path.display()));
            }
        }

        let mut dirs = self.created_dirs.clone();
        dirs.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
        for dir in dirs {
            match fs::remove_dir(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) if is_directory_not_empty(&e) => {}
                Err(e) => errors.push(format!("{}: {e}", dir.display())),
            }
        }

        errors
    }
}

fn restore_file(path: &Path, cap: &CapturedFile) -> std::io::Result<()> {
    if let Some(bytes) = &cap.bytes {
        fs::write(path, bytes)?;
    }
    if let Some(mode) = cap.mode {
        set_mode(path, mode)?;
    }
    Ok(())
}

#[cfg(unix)]
fn perm_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn perm_mode(_meta: &fs::Metadata) -> u32 {
    0o644
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// "Directory not empty" as an abstract predicate: POSIX reports
/// `ENOTEMPTY`, Windows reports `ERROR_DIR_NOT_EMPTY`.
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn restores_overwritten_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, b"{\"a\":1}").unwrap();

        let mut journal = RollbackJournal::new();
        journal.capture_file(&path).unwrap();
        fs::write(&path, b"{\"a\":2}").unwrap();

        let errors = journal.restore();
        assert!(errors.is_empty());
        assert_eq!(fs::read(&path).unwrap(), b"{\"a\":1}");
    }

    #[test]
    fn removes_file_that_did_not_exist_before() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("new.md");

        let mut journal = RollbackJournal::new();
        journal.capture_file(&path).unwrap();
        fs::write(&path, b"installed").unwrap();

        journal.restore();
        assert!(!path.exists());
    }

    #[test]
    fn first_capture_wins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, b"original").unwrap();

        let mut journal = RollbackJournal::new();
        journal.capture_file(&path).unwrap();
        fs::write(&path, b"mutated once").unwrap();
        journal.capture_file(&path).unwrap(); // no-op: already captured
        fs::write(&path, b"mutated twice").unwrap();

        journal.restore();
        assert_eq!(fs::read(&path).unwrap(), b"original");
    }

    #[test]
    fn removes_created_dirs_longest_path_first_skipping_non_empty() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = a.join("b");
        fs::create_dir_all(&b).unwrap();
        fs::write(a.join("keep.txt"), b"x").unwrap();

        let mut journal = RollbackJournal::new();
        journal.track_created_dir(&a);
        journal.track_created_dir(&b);

        let errors = journal.restore();
        assert!(errors.is_empty());
        assert!(!b.exists());
        assert!(a.exists()); // non-empty, skipped
    }
}
