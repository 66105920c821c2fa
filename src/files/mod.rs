//! Filesystem primitives used by every component that writes host state.
//!
//! I/O failures are classified through [`ParkError::io`] so a missing
//! privilege surfaces as `PrivilegeError` instead of a bare OS error.

use crate::error::ParkError;
use anyhow::Result;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Write a file, creating missing parent directories.
pub fn write_file(path: &Path, content: &str) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, content).map_err(|e| ParkError::io(path, e))?;
    Ok(())
}

/// Write a file with specific permissions.
pub fn write_file_mode(path: &Path, content: &str, mode: u32) -> Result<()> {
    write_file(path, content)?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| ParkError::io(path, e))?;
    Ok(())
}

/// Replace `path` as a whole: write a sibling temp file, then rename over it.
///
/// Readers see either the old or the new document, never a torn one.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    ensure_parent(path)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");
    let tmp = path.with_file_name(format!(".{}.{}", file_name, tmp_suffix()));
    fs::write(&tmp, content).map_err(|e| ParkError::io(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(ParkError::io(path, e).into());
    }
    Ok(())
}

/// Copy `src` to `dst`, creating missing parent directories of `dst`.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_file() {
        return Err(ParkError::io(src, io::Error::from(io::ErrorKind::NotFound)).into());
    }
    ensure_parent(dst)?;
    fs::copy(src, dst).map_err(|e| ParkError::io(dst, e))?;
    Ok(())
}

/// Create a symlink at `link` pointing to `target`.
///
/// An existing file or symlink at `link` is removed first, so the link is
/// always recreated.
pub fn replace_symlink(target: &Path, link: &Path) -> Result<()> {
    ensure_parent(link)?;
    if link.is_symlink() || link.exists() {
        fs::remove_file(link).map_err(|e| ParkError::io(link, e))?;
    }
    std::os::unix::fs::symlink(target, link).map_err(|e| ParkError::io(link, e))?;
    Ok(())
}

/// Remove a file or symlink. A missing entry is not an error.
///
/// Returns whether something was removed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ParkError::io(path, e).into()),
    }
}

/// Read a file that may legitimately be absent.
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ParkError::io(path, e).into()),
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| ParkError::io(parent, e))?;
        }
    }
    Ok(())
}

fn tmp_suffix() -> String {
    let n = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{}-{n}.tmp", std::process::id())
}
