//! Pushing staged virtual hosts into nginx's live configuration.
//!
//! Validation always runs before reload. A configuration that fails
//! `nginx -t` is left in place for inspection but never reloaded.

pub mod services;

use crate::error::ParkError;
use crate::files;
use crate::paths::SystemLayout;
use crate::process::CommandRunner;
use crate::report::Report;
use crate::runtime::pool_service;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Catch-all site shipped by the distribution package.
const DEFAULT_SITE: &str = "default";

pub struct Deployer<'a> {
    layout: &'a SystemLayout,
    runner: &'a dyn CommandRunner,
}

impl<'a> Deployer<'a> {
    pub fn new(layout: &'a SystemLayout, runner: &'a dyn CommandRunner) -> Self {
        Self { layout, runner }
    }

    pub fn available_path(&self, site: &str) -> PathBuf {
        self.layout.nginx_available.join(format!("{site}.conf"))
    }

    pub fn enabled_path(&self, site: &str) -> PathBuf {
        self.layout.nginx_enabled.join(format!("{site}.conf"))
    }

    /// Copy, enable, validate, reload.
    ///
    /// Removing the distribution's default site is best effort and lands in
    /// the returned report.
    pub fn deploy(&self, site: &str, staged: &Path) -> Result<Report> {
        let mut report = Report::new();
        let available = self.available_path(site);
        let enabled = self.enabled_path(site);

        files::copy_file(staged, &available)
            .with_context(|| format!("copying virtual host for '{site}'"))?;
        files::replace_symlink(&available, &enabled)
            .with_context(|| format!("enabling virtual host for '{site}'"))?;

        let default_site = self.layout.nginx_enabled.join(DEFAULT_SITE);
        if default_site.is_symlink() || default_site.exists() {
            let removed = files::remove_if_exists(&default_site);
            report.advise("remove default nginx site", removed);
        }

        self.validate()?;
        self.reload()?;
        info!(site, "deployed virtual host");
        report.done(format!("deploy {site}"));
        Ok(report)
    }

    /// Remove the enabled link then the available file, then validate and
    /// reload. Missing entries are not an error.
    pub fn remove(&self, site: &str) -> Result<()> {
        files::remove_if_exists(&self.enabled_path(site))?;
        files::remove_if_exists(&self.available_path(site))?;
        self.validate()?;
        self.reload()?;
        info!(site, "removed virtual host");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let output = self
            .runner
            .run("nginx", &["-t"])
            .context("running nginx -t")?;
        if !output.success {
            return Err(ParkError::Validation {
                checker: "nginx -t".to_string(),
                output: output.combined().trim().to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// `systemctl reload nginx`, falling back to `nginx -s reload`.
    pub fn reload(&self) -> Result<()> {
        let primary = self.runner.run("systemctl", &["reload", services::NGINX]);
        if matches!(&primary, Ok(output) if output.success) {
            return Ok(());
        }
        debug!("systemctl reload failed, signalling nginx directly");

        let fallback = self
            .runner
            .run("nginx", &["-s", "reload"])
            .context("running nginx -s reload")?;
        if !fallback.success {
            bail!("failed to reload nginx: {}", fallback.combined().trim());
        }
        Ok(())
    }

    /// Site names whose configuration is live and was staged under `staging`.
    pub fn deployed_sites(&self, staging: &Path) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.layout.nginx_available) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ParkError::io(&self.layout.nginx_available, e).into()),
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let file_name = entry.file_name();
                let name = file_name.to_str()?.strip_suffix(".conf")?.to_string();
                staging.join(format!("{name}.conf")).is_file().then_some(name)
            })
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn ensure_proxy_running(&self) -> Result<Report> {
        services::ensure_running(self.runner, services::NGINX)
    }

    pub fn ensure_pool_running(&self, version: &str) -> Result<Report> {
        services::ensure_running(self.runner, &pool_service(version))
    }
}
