//! Atomic file writes: same-directory temp file + fsync + chmod + rename.
//!
//! Rename is the linearization point: after a successful call, the
//! destination holds exactly the new bytes; after a failed call, it holds
//! whatever it held before (or remains absent).

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::error::StoreResult;

#[cfg(unix)]
fn set_mode(file: &File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Write `data` to `path` with the given permission bits, atomically.
pub fn write_atomic(path: &Path, data: &[u8], mode: u32) -> StoreResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let tmp_path = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("write"),
        std::process::id()
    ));
    tracing::debug!(tmp = %tmp_path.display(), dest = %path.display(), "atomic write");

    let mut tmp = File::create(&tmp_path)?;
    tmp.write_all(data)?;
    tmp.sync_all()?;
    set_mode(&tmp, mode)?;
    drop(tmp);

    if let Ok(dir_handle) = File::open(dir) {
        let _ = dir_handle.sync_all();
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_exact_bytes() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        write_atomic(&dest, b"hello", 0o644).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"hello");
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("a/b/c.txt");
        write_atomic(&dest, b"x", 0o644).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"x");
    }

    #[test]
    fn overwrite_replaces_contents_fully() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        write_atomic(&dest, b"aaaaaaaaaa", 0o644).unwrap();
        write_atomic(&dest, b"b", 0o644).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"b");
    }

    #[test]
    fn failed_rename_leaves_destination_untouched() {
        // Simulate a rename failure (e.g. the process dying between the
        // temp write and the rename) by pointing the destination at a
        // non-empty directory, which `fs::rename` refuses to replace with
        // a file.
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("marker"), b"pre-existing").unwrap();

        let err = write_atomic(&dest, b"new bytes", 0o644);
        assert!(err.is_err());
        assert!(dest.is_dir());
        assert_eq!(fs::read(dest.join("marker")).unwrap(), b"pre-existing");
    }

    #[test]
    fn leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        write_atomic(&dest, b"hello", 0o644).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
