//! Global settings persisted at `<home>/config.toml`.
//!
//! ```toml
//! domain = "test"
//! default_php = "8.3"
//! use_https = false
//!
//! [dns]
//! stub = "disabled"
//! original_resolv_conf = "/run/systemd/resolve/stub-resolv.conf"
//! ```

use crate::error::ParkError;
use crate::files;
use crate::paths::Paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_DOMAIN: &str = "test";

/// PHP version used when nothing is detected.
pub const FALLBACK_PHP: &str = "8.2";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Top-level domain suffix, without the leading dot.
    pub domain: String,
    pub default_php: String,
    pub use_https: bool,
    #[serde(default)]
    pub dns: DnsRecord,
}

/// Whether this tool has taken port 53 away from the system stub listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StubState {
    #[default]
    Enabled,
    Disabled,
}

impl fmt::Display for StubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StubState::Enabled => write!(f, "enabled"),
            StubState::Disabled => write!(f, "disabled"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DnsRecord {
    #[serde(default)]
    pub stub: StubState,
    /// Symlink target of `/etc/resolv.conf` before it was replaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_resolv_conf: Option<PathBuf>,
}

impl Config {
    pub fn with_default_php(default_php: impl Into<String>) -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_string(),
            default_php: default_php.into(),
            use_https: false,
            dns: DnsRecord::default(),
        }
    }

    /// Load the config. A missing file means the tool is not installed.
    pub fn load(paths: &Paths) -> Result<Self> {
        let content = files::read_optional(&paths.config)?.ok_or_else(|| ParkError::Io {
            path: paths.config.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "config file missing; run `phppark install` first",
            ),
        })?;
        Self::parse(&content).with_context(|| format!("loading config '{}'", paths.config.display()))
    }

    /// Load the config, or return defaults when the file is absent.
    /// Only `install` uses this.
    pub fn load_or_default(paths: &Paths, default_php: &str) -> Result<Self> {
        match files::read_optional(&paths.config)? {
            Some(content) => Self::parse(&content)
                .with_context(|| format!("loading config '{}'", paths.config.display())),
            None => Ok(Self::with_default_php(default_php)),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| ParkError::parse("config", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, paths: &Paths) -> Result<()> {
        self.validate()?;
        let content = toml::to_string_pretty(self).context("serializing config")?;
        files::write_atomic(&paths.config, &content)
            .with_context(|| format!("saving config '{}'", paths.config.display()))
    }

    /// Resolve a site's override against the global default (late binding).
    pub fn php_for<'a>(&'a self, site_override: Option<&'a str>) -> &'a str {
        site_override
            .filter(|v| !v.is_empty())
            .unwrap_or(&self.default_php)
    }

    pub fn hostname(&self, site: &str) -> String {
        format!("{}.{}", site, self.domain)
    }

    fn validate(&self) -> Result<()> {
        let domain = self.domain.trim();
        if domain.is_empty() || domain.starts_with('.') || domain.contains(['/', ' ']) {
            return Err(ParkError::parse("config", format!("invalid domain '{}'", self.domain)).into());
        }
        if self.default_php.trim().is_empty() {
            return Err(ParkError::parse("config", "default_php must not be empty").into());
        }
        Ok(())
    }
}
