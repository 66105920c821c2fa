//! Desired-state registry of sites, persisted as one JSON document.
//!
//! The registry is loaded whole, mutated in memory and written back whole.
//! Insertion order is preserved so listing and rebuilds are deterministic.

mod lock;

pub use lock::RegistryLock;

use crate::error::ParkError;
use crate::files;
use crate::paths::Paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteKind {
    /// Registered one at a time with `link`.
    Linked,
    /// Discovered as an immediate subdirectory by `park`.
    Parked,
}

impl fmt::Display for SiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteKind::Linked => write!(f, "linked"),
            SiteKind::Parked => write!(f, "parked"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    pub path: PathBuf,
    pub kind: SiteKind,
    /// PHP override; `None` means the registry-wide default at render time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub php: Option<String>,
    #[serde(default)]
    pub secured: bool,
}

impl Site {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, kind: SiteKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
            php: None,
            secured: false,
        }
    }

    pub fn php_override(&self) -> Option<&str> {
        self.php.as_deref().filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRegistry {
    sites: Vec<Site>,
}

impl SiteRegistry {
    pub fn load(paths: &Paths) -> Result<Self> {
        let bytes = std::fs::read(&paths.sites).map_err(|e| ParkError::io(&paths.sites, e))?;
        let registry: SiteRegistry = serde_json::from_slice(&bytes)
            .map_err(|e| ParkError::parse("site registry", e))
            .with_context(|| format!("loading site registry '{}'", paths.sites.display()))?;
        Ok(registry)
    }

    pub fn save(&self, paths: &Paths) -> Result<()> {
        let mut content = serde_json::to_string_pretty(self).context("serializing site registry")?;
        content.push('\n');
        files::write_atomic(&paths.sites, &content)
            .with_context(|| format!("saving site registry '{}'", paths.sites.display()))
    }

    pub fn find(&self, name: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.name == name)
    }

    /// Replace the site with the same name in place, or append it.
    pub fn upsert(&mut self, site: Site) {
        match self.sites.iter_mut().find(|s| s.name == site.name) {
            Some(existing) => *existing = site,
            None => self.sites.push(site),
        }
    }

    /// Remove a site by name, returning it.
    pub fn remove(&mut self, name: &str) -> Result<Site> {
        let index = self
            .sites
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| ParkError::site_not_found(name))?;
        Ok(self.sites.remove(index))
    }

    pub fn list(&self) -> &[Site] {
        &self.sites
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// A site name becomes a hostname label and a file name.
pub fn validate_site_name(name: &str) -> Result<()> {
    let problem = if name.is_empty() {
        Some("must not be empty")
    } else if name.contains('/') || name.contains('\\') {
        Some("must not contain path separators")
    } else if name.starts_with('.') {
        Some("must not start with '.'")
    } else if name.chars().any(char::is_whitespace) {
        Some("must not contain whitespace")
    } else {
        None
    };

    match problem {
        Some(problem) => Err(ParkError::parse("site name", format!("'{name}' {problem}")).into()),
        None => Ok(()),
    }
}
