//! Installing a missing PHP version through apt (ondrej/php PPA).

use super::{normalize_version, pool_service};
use crate::process::{run_checked, CommandRunner};
use crate::report::Report;
use anyhow::{Context, Result};
use tracing::info;

const PHP_PPA: &str = "ppa:ondrej/php";

/// Extension packages installed alongside the FPM pool, best effort.
pub const EXTENSIONS: &[&str] = &["cli", "common", "mysql", "curl", "mbstring", "xml", "zip"];

/// Add the repository, refresh metadata, install the FPM package and the
/// common extensions.
///
/// Repository, refresh and core package failures abort; each extension that
/// fails is only an advisory.
pub fn install_missing(runner: &dyn CommandRunner, version: &str) -> Result<Report> {
    let version = normalize_version(version)?;
    let mut report = Report::new();
    info!(%version, "installing PHP");

    run_checked(runner, "add-apt-repository", &["-y", PHP_PPA])
        .context("adding the PHP package repository")?;
    report.done(format!("add repository {PHP_PPA}"));

    run_checked(runner, "apt-get", &["update"]).context("refreshing package metadata")?;
    report.done("apt-get update");

    let core = pool_service(&version);
    run_checked(runner, "apt-get", &["install", "-y", core.as_str()])
        .with_context(|| format!("installing PHP {version}"))?;
    report.done(format!("install {core}"));

    for ext in EXTENSIONS {
        let package = format!("php{version}-{ext}");
        let result = run_checked(runner, "apt-get", &["install", "-y", package.as_str()]);
        report.advise(format!("install {package}"), result);
    }

    Ok(report)
}
