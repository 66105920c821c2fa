use super::{reconcile_site, Context};
use crate::error::ParkError;
use crate::report::Report;
use crate::runtime::{install_missing, normalize_version, validate, RuntimeVersion};
use anyhow::{Context as _, Result};
use tracing::info;

pub fn php_list(ctx: &Context) -> Vec<RuntimeVersion> {
    ctx.runtimes()
}

/// Switch the default PHP version, or pin one site to a version.
///
/// Changing the default re-renders every site that inherits it. With
/// `install`, a version that is not present is installed first.
pub fn use_version(ctx: &Context, version: &str, site: Option<&str>, install: bool) -> Result<Report> {
    let version = normalize_version(version)?;
    let mut session = ctx.session()?;
    let mut report = Report::new();

    let runtimes = ctx.runtimes();
    if !validate(&version, &runtimes) {
        if !install {
            let available: Vec<&str> = runtimes.iter().map(|r| r.version.as_str()).collect();
            return Err(anyhow::Error::new(ParkError::version_not_found(&version)).context(format!(
                "installed versions: {}",
                if available.is_empty() { "none".to_string() } else { available.join(", ") }
            )));
        }
        report.extend(install_missing(ctx.runner, &version)?);
        if !validate(&version, &ctx.runtimes()) {
            return Err(anyhow::Error::new(ParkError::version_not_found(&version))
                .context("installation finished but the version is still not detected"));
        }
    }

    let generator = ctx.generator()?;

    match site {
        None => {
            session.config.default_php = version.clone();
            session.config.save(&ctx.paths)?;
            report.done(format!("default PHP {version}"));
            info!(%version, "changed default PHP");

            for site in session.registry.list().iter().filter(|s| s.php_override().is_none()) {
                let result = reconcile_site(ctx, site, &session.config, &generator);
                report.absorb(format!("configure {}", site.name), result);
            }
        }
        Some(name) => {
            let mut pinned = session
                .registry
                .find(name)
                .cloned()
                .ok_or_else(|| ParkError::site_not_found(name))?;
            pinned.php = Some(version.clone());
            report.extend(
                reconcile_site(ctx, &pinned, &session.config, &generator)
                    .with_context(|| format!("switching '{name}' to PHP {version}"))?,
            );
            session.registry.upsert(pinned);
            session.registry.save(&ctx.paths)?;
            report.done(format!("PHP {version} for {}", session.config.hostname(name)));
        }
    }
    Ok(report)
}
