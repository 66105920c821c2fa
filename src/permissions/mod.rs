//! Access-mode policy so the proxy's worker user can read site trees.
//!
//! Directories become 0755 and regular files 0644. Symlinks are left alone
//! and never followed. Every ancestor from the site up to the user's home is
//! made traversable too.

use crate::error::ParkError;
use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

pub const DIR_MODE: u32 = 0o755;
pub const FILE_MODE: u32 = 0o644;

/// Entries touched by one normalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Normalized {
    pub directories: usize,
    pub files: usize,
}

pub fn normalize(site_path: &Path, user_home: &Path) -> Result<Normalized> {
    let site_path = std::path::absolute(site_path)
        .with_context(|| format!("resolving '{}'", site_path.display()))?;

    fix_ancestors(&site_path, user_home)?;

    let mut counts = Normalized::default();
    for entry in WalkDir::new(&site_path).follow_links(false) {
        let entry = entry.with_context(|| format!("walking '{}'", site_path.display()))?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            set_mode(entry.path(), DIR_MODE)?;
            counts.directories += 1;
        } else if file_type.is_file() {
            set_mode(entry.path(), FILE_MODE)?;
            counts.files += 1;
        }
    }

    debug!(
        site = %site_path.display(),
        directories = counts.directories,
        files = counts.files,
        "normalized permissions"
    );
    Ok(counts)
}

/// Walk upward from `path` up to and including `user_home`. Nothing outside
/// the home directory is touched.
fn fix_ancestors(path: &Path, user_home: &Path) -> Result<()> {
    if !path.starts_with(user_home) {
        debug!(site = %path.display(), "site outside home, ancestors left as they are");
        return Ok(());
    }
    for dir in path.ancestors().skip(1) {
        if !dir.starts_with(user_home) {
            break;
        }
        set_mode(dir, DIR_MODE)?;
    }
    Ok(())
}

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| ParkError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mode(path: &Path) -> u32 {
        fs::symlink_metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn test_normalize_tree_and_ancestors() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home/user");
        let sites = home.join("sites");
        let site = sites.join("blog");
        fs::create_dir_all(site.join("public/css")).unwrap();
        fs::write(site.join("public/index.php"), "<?php").unwrap();
        fs::write(site.join("public/css/app.css"), "").unwrap();
        fs::set_permissions(&home, fs::Permissions::from_mode(0o700)).unwrap();
        fs::set_permissions(&sites, fs::Permissions::from_mode(0o700)).unwrap();
        fs::set_permissions(site.join("public/index.php"), fs::Permissions::from_mode(0o600)).unwrap();

        let counts = normalize(&site, &home).unwrap();

        assert_eq!(counts, Normalized { directories: 3, files: 2 });
        assert_eq!(mode(&site.join("public/index.php")), 0o644);
        assert_eq!(mode(&site.join("public/css")), 0o755);
        assert_eq!(mode(&sites), 0o755);
        assert_eq!(mode(&home), 0o755);
    }

    #[test]
    fn test_walk_stops_at_home() {
        let temp = TempDir::new().unwrap();
        let above = temp.path().join("home");
        let home = above.join("user");
        let site = home.join("blog");
        fs::create_dir_all(&site).unwrap();
        fs::set_permissions(&above, fs::Permissions::from_mode(0o711)).unwrap();

        normalize(&site, &home).unwrap();

        assert_eq!(mode(&above), 0o711, "directories above home are untouched");
    }

    #[test]
    fn test_site_outside_home_leaves_ancestors() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home/user");
        let srv = temp.path().join("srv");
        let site = srv.join("api");
        fs::create_dir_all(&home).unwrap();
        fs::create_dir_all(&site).unwrap();
        fs::set_permissions(&srv, fs::Permissions::from_mode(0o750)).unwrap();

        normalize(&site, &home).unwrap();

        assert_eq!(mode(&srv), 0o750);
        assert_eq!(mode(&site), 0o755);
    }

    #[test]
    fn test_symlinks_are_not_followed() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home/user");
        let site = home.join("blog");
        let outside = temp.path().join("secret");
        fs::create_dir_all(&site).unwrap();
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("key"), "x").unwrap();
        fs::set_permissions(outside.join("key"), fs::Permissions::from_mode(0o600)).unwrap();
        std::os::unix::fs::symlink(&outside, site.join("link")).unwrap();

        normalize(&site, &home).unwrap();

        assert_eq!(mode(&outside.join("key")), 0o600);
    }
}
