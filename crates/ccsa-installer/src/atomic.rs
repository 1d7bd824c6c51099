//! Atomic file writes, mirroring the store crate's same-directory
//! temp + fsync + chmod + rename pattern.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::error::InstallResult;

#[cfg(unix)]
fn set_mode(file: &File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

pub fn write_atomic(path: &Path, data: &[u8], mode: u32) -> InstallResult<()> {
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

pub fn write_atomic_text(path: &Path, text: &str) -> InstallResult<()> {
    write_atomic(path, text.as_bytes(), 0o644)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_bytes() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        write_atomic(&dest, b"hi", 0o644).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"hi");
    }
}
