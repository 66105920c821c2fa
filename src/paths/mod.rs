//! Fixed on-disk locations.
//!
//! [`Paths`] is the tool's own home (`~/.phppark` by default, overridable
//! with `PHPPARK_HOME`). [`SystemLayout`] is every host location the tool
//! reconciles against; tests re-root it under a temporary directory.

use anyhow::{Context, Result};
use nix::unistd::User;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the tool home.
pub const HOME_ENV: &str = "PHPPARK_HOME";

const HOME_DIR_NAME: &str = ".phppark";

/// Locations owned by the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub home: PathBuf,
    pub config: PathBuf,
    pub sites: PathBuf,
    pub nginx: PathBuf,
    pub certificates: PathBuf,
    pub template: PathBuf,
    pub lock: PathBuf,
}

impl Paths {
    /// Resolve the home from `PHPPARK_HOME`, else `~/.phppark`.
    pub fn resolve() -> Result<Self> {
        if let Ok(home) = env::var(HOME_ENV) {
            if !home.trim().is_empty() {
                return Ok(Self::at(home));
            }
        }
        let user_home = sudo_user_home()
            .or_else(dirs::home_dir)
            .context("could not determine the user's home directory")?;
        Ok(Self::at(user_home.join(HOME_DIR_NAME)))
    }

    pub fn at(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            config: home.join("config.toml"),
            sites: home.join("sites.json"),
            nginx: home.join("nginx"),
            certificates: home.join("certificates"),
            template: home.join("nginx.tmpl"),
            lock: home.join(".lock"),
            home,
        }
    }

    /// Installed means the home and its config file both exist.
    pub fn exists(&self) -> bool {
        self.home.is_dir() && self.config.is_file()
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.home, &self.nginx, &self.certificates] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating directory '{}'", dir.display()))?;
        }
        Ok(())
    }

    /// Staged virtual-host file for a site.
    pub fn staged_vhost(&self, site: &str) -> PathBuf {
        self.nginx.join(format!("{site}.conf"))
    }
}

/// Host-side locations the tool writes to or probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemLayout {
    /// Home directory of the invoking user; the permission walk stops here.
    pub user_home: PathBuf,
    pub nginx_available: PathBuf,
    pub nginx_enabled: PathBuf,
    pub dnsmasq_dir: PathBuf,
    pub resolved_conf: PathBuf,
    /// Live upstream nameserver list published by systemd-resolved.
    pub resolved_upstream: PathBuf,
    pub resolv_conf: PathBuf,
    /// Default target of the `/etc/resolv.conf` symlink.
    pub resolved_stub: PathBuf,
    pub php_search_dirs: Vec<PathBuf>,
    pub php_socket_dir: PathBuf,
}

impl SystemLayout {
    /// The real host (Debian/Ubuntu conventions).
    pub fn host() -> Self {
        let user_home = sudo_user_home()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("/root"));
        Self::rooted_with_home(Path::new("/"), user_home)
    }

    /// Every location re-rooted under `root`; the user home is `<root>/home/user`.
    pub fn rooted(root: &Path) -> Self {
        Self::rooted_with_home(root, root.join("home/user"))
    }

    fn rooted_with_home(root: &Path, user_home: PathBuf) -> Self {
        let at = |p: &str| root.join(p);
        Self {
            user_home,
            nginx_available: at("etc/nginx/sites-available"),
            nginx_enabled: at("etc/nginx/sites-enabled"),
            dnsmasq_dir: at("etc/dnsmasq.d"),
            resolved_conf: at("etc/systemd/resolved.conf"),
            resolved_upstream: at("run/systemd/resolve/resolv.conf"),
            resolv_conf: at("etc/resolv.conf"),
            resolved_stub: at("run/systemd/resolve/stub-resolv.conf"),
            php_search_dirs: vec![at("usr/bin"), at("usr/local/bin")],
            php_socket_dir: at("var/run/php"),
        }
    }
}

/// Under sudo, `$HOME` may point at root's home; prefer the invoking user's.
fn sudo_user_home() -> Option<PathBuf> {
    let user = env::var("SUDO_USER").ok()?;
    if user.is_empty() || user == "root" {
        return None;
    }
    passwd_home(&user)
}

/// Home directory from the account database.
fn passwd_home(name: &str) -> Option<PathBuf> {
    match User::from_name(name) {
        Ok(Some(user)) => Some(user.dir),
        Ok(None) => {
            debug!(user = name, "no passwd entry");
            None
        }
        Err(e) => {
            debug!(user = name, "passwd lookup failed: {e}");
            None
        }
    }
}
