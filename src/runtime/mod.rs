//! PHP runtime detection.
//!
//! Installed versions are probed live on every call and never cached:
//! packages can be added or removed between invocations.
//!
//! Detection order:
//! 1. Each search directory in turn (`/usr/bin`, then `/usr/local/bin`)
//! 2. Every entry named like `php8.2` / `php82`, executed with `-v`
//! 3. First binary reporting a given `major.minor` wins
//! 4. `php` on the search path marks the matching version as system default

mod installer;

pub use installer::{install_missing, EXTENSIONS};

use crate::config::FALLBACK_PHP;
use crate::error::ParkError;
use crate::process::CommandRunner;
use anyhow::Result;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// A detected PHP installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeVersion {
    /// Two-component version, e.g. `8.2`.
    pub version: String,
    pub binary: PathBuf,
    pub pool_socket: PathBuf,
    pub is_system_default: bool,
}

fn binary_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^php\d[\d.]*$").expect("valid regex"))
}

fn output_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"PHP (\d+)\.(\d+)").expect("valid regex"))
}

fn version_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\.(\d+)(?:\.\d+)*$").expect("valid regex"))
}

/// Normalize to `major.minor`: `"8.2.15"` and `"8.2"` both become `"8.2"`.
pub fn normalize_version(version: &str) -> Result<String> {
    let trimmed = version.trim();
    let caps = version_pattern()
        .captures(trimmed)
        .ok_or_else(|| ParkError::parse("PHP version", format!("'{version}' is not major.minor")))?;
    Ok(format!("{}.{}", &caps[1], &caps[2]))
}

/// Extract the version from `php -v` output (`PHP 8.2.15 (cli) ...`).
pub fn parse_version_output(output: &str) -> Result<String> {
    let caps = output_pattern()
        .captures(output)
        .ok_or_else(|| ParkError::parse("php -v output", "no 'PHP <major>.<minor>' token"))?;
    Ok(format!("{}.{}", &caps[1], &caps[2]))
}

/// FPM socket for a version. The generator and the detector both use this;
/// a virtual-host pointing anywhere else would fail to connect.
pub fn pool_socket_path(socket_dir: &Path, version: &str) -> PathBuf {
    socket_dir.join(format!("php{version}-fpm.sock"))
}

/// systemd unit / package name of the FPM pool for a version.
pub fn pool_service(version: &str) -> String {
    format!("php{version}-fpm")
}

fn version_key(version: &str) -> (u32, u32) {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

/// Ask a binary for its version.
pub fn version_of(runner: &dyn CommandRunner, binary: &Path) -> Result<String> {
    let program = binary.to_string_lossy();
    let output = runner.run(&program, &["-v"])?;
    if !output.success {
        anyhow::bail!("`{} -v` exited unsuccessfully", program);
    }
    parse_version_output(&output.stdout)
}

/// Detect installed versions, newest first.
///
/// Unreadable search directories are skipped, so an empty system yields an
/// empty list rather than an error.
pub fn detect(
    runner: &dyn CommandRunner,
    search_dirs: &[PathBuf],
    socket_dir: &Path,
) -> Vec<RuntimeVersion> {
    let mut seen = HashSet::new();
    let mut versions = Vec::new();

    for dir in search_dirs {
        let Ok(entries) = fs::read_dir(dir) else {
            debug!(dir = %dir.display(), "search directory unreadable, skipping");
            continue;
        };

        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| binary_pattern().is_match(name))
            })
            .map(|entry| entry.path())
            .collect();
        // read_dir order is unspecified; sort for a stable first-match.
        candidates.sort();

        for binary in candidates {
            let version = match version_of(runner, &binary) {
                Ok(v) => v,
                Err(e) => {
                    debug!(binary = %binary.display(), "not a usable PHP binary: {e:#}");
                    continue;
                }
            };
            if !seen.insert(version.clone()) {
                continue;
            }
            versions.push(RuntimeVersion {
                pool_socket: pool_socket_path(socket_dir, &version),
                version,
                binary,
                is_system_default: false,
            });
        }
    }

    if let Some(default_binary) = runner.find("php") {
        if let Ok(default_version) = version_of(runner, &default_binary) {
            // Version match only: several install locations of one version
            // are indistinguishable here.
            if let Some(v) = versions.iter_mut().find(|v| v.version == default_version) {
                v.is_system_default = true;
            }
        }
    }

    versions.sort_by(|a, b| version_key(&b.version).cmp(&version_key(&a.version)));
    versions
}

/// Exact membership of the normalized version.
pub fn validate(version: &str, available: &[RuntimeVersion]) -> bool {
    match normalize_version(version) {
        Ok(v) => available.iter().any(|r| r.version == v),
        Err(_) => false,
    }
}

/// The system default, else the newest, else the hardcoded fallback.
pub fn default_version(available: &[RuntimeVersion]) -> String {
    available
        .iter()
        .find(|v| v.is_system_default)
        .or_else(|| available.first())
        .map(|v| v.version.clone())
        .unwrap_or_else(|| FALLBACK_PHP.to_string())
}
