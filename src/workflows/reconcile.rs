use super::Context;
use crate::config::Config;
use crate::files;
use crate::permissions;
use crate::registry::Site;
use crate::report::Report;
use crate::runtime::pool_service;
use crate::vhost::{self, VhostGenerator};
use anyhow::{Context as _, Result};
use std::collections::HashSet;
use tracing::info;

/// Converge one site's external state with its record.
///
/// Certificate generation, rendering and staging are fatal. Permissions,
/// deployment and service state only produce advisories.
pub fn reconcile_site(
    ctx: &Context,
    site: &Site,
    config: &Config,
    generator: &VhostGenerator,
) -> Result<Report> {
    let mut report = Report::new();

    let certs = ctx.certs();
    if site.secured && !certs.exists(&site.name) {
        certs.generate(&site.name, &config.hostname(&site.name))?;
        report.done(format!("generate certificate for {}", site.name));
    }

    let text = generator.render(site, config)?;
    let staged = vhost::write_staged(&ctx.paths, &site.name, &text)?;
    report.done(format!("write {}", staged.display()));

    let normalized = permissions::normalize(&site.path, &ctx.system.user_home);
    report.advise(format!("fix permissions under {}", site.path.display()), normalized);

    let deployer = ctx.deployer();
    report.absorb(format!("deploy {}", site.name), deployer.deploy(&site.name, &staged));

    let php = config.php_for(site.php_override());
    report.absorb(format!("start {}", pool_service(php)), deployer.ensure_pool_running(php));
    report.absorb("start nginx", deployer.ensure_proxy_running());

    Ok(report)
}

/// Regenerate and redeploy every registered site, and take down live
/// configurations whose site is no longer registered.
pub fn rebuild(ctx: &Context) -> Result<Report> {
    let session = ctx.session()?;
    let generator = ctx.generator()?;
    let deployer = ctx.deployer();
    let mut report = Report::new();

    let registered: HashSet<&str> = session.registry.list().iter().map(|s| s.name.as_str()).collect();
    for orphan in deployer.deployed_sites(&ctx.paths.nginx)? {
        if registered.contains(orphan.as_str()) {
            continue;
        }
        info!(site = %orphan, "removing orphaned virtual host");
        report.advise(format!("remove orphan {orphan}"), deployer.remove(&orphan));
        files::remove_if_exists(&ctx.paths.staged_vhost(&orphan))
            .with_context(|| format!("removing staged file for '{orphan}'"))?;
    }

    if session.registry.is_empty() {
        report.skipped("rebuild", "no sites registered");
        return Ok(report);
    }

    for site in session.registry.list() {
        let result = reconcile_site(ctx, site, &session.config, &generator);
        report.absorb(format!("rebuild {}", site.name), result);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{SiteKind, SiteRegistry};
    use crate::workflows::testing::Sandbox;
    use crate::workflows::{link, park};
    use std::fs;

    #[test]
    fn test_reconcile_generates_missing_certificate_first() {
        let sandbox = Sandbox::new().installed();
        let ctx = sandbox.ctx();
        let mut site = Site::new("shop", sandbox.project("shop"), SiteKind::Linked);
        site.secured = true;
        let config = Config::load(&ctx.paths).unwrap();

        let report = reconcile_site(&ctx, &site, &config, &ctx.generator().unwrap()).unwrap();

        assert!(ctx.certs().exists("shop"));
        assert!(report.steps()[0].name.starts_with("generate certificate"));
        let staged = fs::read_to_string(ctx.paths.staged_vhost("shop")).unwrap();
        assert!(staged.contains("shop.crt"));
    }

    #[test]
    fn test_deploy_failure_is_advisory() {
        let sandbox = Sandbox::new().installed();
        sandbox.fake.fail("nginx -t");
        let ctx = sandbox.ctx();
        let site = Site::new("blog", sandbox.project("blog"), SiteKind::Parked);
        let config = Config::load(&ctx.paths).unwrap();

        let report = reconcile_site(&ctx, &site, &config, &ctx.generator().unwrap()).unwrap();

        assert!(report.advisories().any(|s| s.name == "deploy blog"));
        assert!(ctx.paths.staged_vhost("blog").is_file());
        assert_eq!(sandbox.fake.count("systemctl reload"), 0);
    }

    #[test]
    fn test_rebuild_redeploys_and_removes_orphans() {
        let sandbox = Sandbox::new().installed();
        let ctx = sandbox.ctx();
        let root = sandbox.project("sites");
        fs::create_dir_all(root.join("a")).unwrap();
        fs::create_dir_all(root.join("b")).unwrap();
        park(&ctx, &root).unwrap();

        let mut registry = SiteRegistry::load(&ctx.paths).unwrap();
        registry.remove("b").unwrap();
        registry.save(&ctx.paths).unwrap();
        sandbox.fake.clear_calls();

        let report = rebuild(&ctx).unwrap();

        let deployer = ctx.deployer();
        assert!(deployer.available_path("a").is_file());
        assert!(!deployer.available_path("b").exists());
        assert!(!ctx.paths.staged_vhost("b").exists());
        assert!(report.steps().iter().any(|s| s.name == "remove orphan b"));
    }

    #[test]
    fn test_rebuild_leaves_foreign_vhosts_alone() {
        let sandbox = Sandbox::new().installed();
        let ctx = sandbox.ctx();
        let foreign = ctx.system.nginx_available.join("mail.conf");
        files::write_file(&foreign, "server {}\n").unwrap();
        link(&ctx, Some("blog"), &sandbox.project("blog")).unwrap();

        rebuild(&ctx).unwrap();

        assert!(foreign.is_file());
    }

    #[test]
    fn test_rebuild_with_no_sites() {
        let sandbox = Sandbox::new().installed();
        let report = rebuild(&sandbox.ctx()).unwrap();
        assert!(matches!(
            report.steps()[0].outcome,
            crate::report::Outcome::Skipped(_)
        ));
    }
}
