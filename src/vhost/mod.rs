//! Virtual-host generation.
//!
//! Rendering reads nothing but the site directory (to pick a document root)
//! and the template; identical inputs always produce identical text.

mod template;

pub use template::{Template, Values};

use crate::cert::CertificatePaths;
use crate::config::Config;
use crate::files;
use crate::paths::{Paths, SystemLayout};
use crate::registry::Site;
use crate::runtime::pool_socket_path;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Conventional public directories, in priority order. Serving the project
/// root would expose source files, so any of these wins over it.
pub const PUBLIC_DIRS: &[&str] = &["public", "public_html", "web", "htdocs"];

const BUILTIN_TEMPLATE: &str = include_str!("nginx.tmpl");

/// First existing public directory under `site_path`, else `site_path`.
pub fn document_root(site_path: &Path) -> PathBuf {
    PUBLIC_DIRS
        .iter()
        .map(|dir| site_path.join(dir))
        .find(|candidate| candidate.is_dir())
        .unwrap_or_else(|| site_path.to_path_buf())
}

/// Renders nginx server blocks for sites.
#[derive(Debug, Clone)]
pub struct VhostGenerator {
    template: Template,
    socket_dir: PathBuf,
    certificates: PathBuf,
}

impl VhostGenerator {
    pub fn new(template: Template, socket_dir: impl Into<PathBuf>, certificates: impl Into<PathBuf>) -> Self {
        Self {
            template,
            socket_dir: socket_dir.into(),
            certificates: certificates.into(),
        }
    }

    /// Generator using `<home>/nginx.tmpl` when present, else the built-in template.
    pub fn load(paths: &Paths, layout: &SystemLayout) -> Result<Self> {
        let template = match files::read_optional(&paths.template)? {
            Some(custom) => {
                debug!(path = %paths.template.display(), "using custom nginx template");
                Template::new(custom)
            }
            None => Template::new(BUILTIN_TEMPLATE),
        };
        Ok(Self::new(template, &layout.php_socket_dir, &paths.certificates))
    }

    pub fn builtin(paths: &Paths, layout: &SystemLayout) -> Self {
        Self::new(Template::new(BUILTIN_TEMPLATE), &layout.php_socket_dir, &paths.certificates)
    }

    pub fn render(&self, site: &Site, config: &Config) -> Result<String> {
        let php = config.php_for(site.php_override());
        let certs = CertificatePaths::for_site(&self.certificates, &site.name);

        let values = Values::new()
            .var("site", site.name.as_str())
            .var("server_name", config.hostname(&site.name))
            .var("root", document_root(&site.path).display().to_string())
            .var("php", php)
            .var("socket", pool_socket_path(&self.socket_dir, php).display().to_string())
            .var("cert", certs.cert.display().to_string())
            .var("key", certs.key.display().to_string())
            .flag("tls", site.secured);

        self.template
            .render(&values)
            .with_context(|| format!("rendering virtual host for '{}'", site.name))
    }
}

/// Write rendered text to the staging directory, returning the staged path.
pub fn write_staged(paths: &Paths, site: &str, text: &str) -> Result<PathBuf> {
    let staged = paths.staged_vhost(site);
    files::write_file(&staged, text)
        .with_context(|| format!("staging virtual host for '{site}'"))?;
    Ok(staged)
}
