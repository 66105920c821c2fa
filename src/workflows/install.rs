use super::Context;
use crate::config::Config;
use crate::registry::{RegistryLock, SiteRegistry};
use crate::report::Report;
use crate::runtime::{default_version, pool_service};
use anyhow::Result;
use tracing::info;

/// Create the tool home with a default config and an empty registry, then
/// start nginx and the pools of every detected PHP version.
pub fn install(ctx: &Context) -> Result<Report> {
    let mut report = Report::new();
    if ctx.paths.exists() {
        report.skipped("install", format!("already installed at {}", ctx.paths.home.display()));
        return Ok(report);
    }

    let _lock = RegistryLock::acquire(&ctx.paths)?;
    ctx.paths.ensure_directories()?;
    report.done(format!("create {}", ctx.paths.home.display()));

    let runtimes = ctx.runtimes();
    let config = Config::load_or_default(&ctx.paths, &default_version(&runtimes))?;
    config.save(&ctx.paths)?;
    report.done(format!("write {}", ctx.paths.config.display()));

    if !ctx.paths.sites.exists() {
        SiteRegistry::default().save(&ctx.paths)?;
        report.done(format!("write {}", ctx.paths.sites.display()));
    }
    info!(home = %ctx.paths.home.display(), default_php = %config.default_php, "installed");

    let deployer = ctx.deployer();
    report.absorb("start nginx", deployer.ensure_proxy_running());
    for runtime in &runtimes {
        report.absorb(
            format!("start {}", pool_service(&runtime.version)),
            deployer.ensure_pool_running(&runtime.version),
        );
    }
    Ok(report)
}
