use super::{reconcile_site, Context};
use crate::error::ParkError;
use crate::files;
use crate::registry::{validate_site_name, Site, SiteKind};
use crate::report::Report;
use anyhow::{bail, Context as _, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Register every immediate subdirectory of `path` as a parked site.
///
/// Files, hidden entries and names already registered are skipped. A site
/// that fails to configure is still registered; its failure is reported.
pub fn park(ctx: &Context, path: &Path) -> Result<Report> {
    let root = std::path::absolute(path)
        .with_context(|| format!("resolving '{}'", path.display()))?;
    if !root.is_dir() {
        bail!("'{}' is not a directory", root.display());
    }

    let mut session = ctx.session()?;
    let generator = ctx.generator()?;
    let mut report = Report::new();

    let mut entries: Vec<_> = fs::read_dir(&root)
        .map_err(|e| ParkError::io(&root, e))?
        .filter_map(|entry| entry.ok())
        .collect();
    entries.sort_by_key(|entry| entry.file_name());

    let mut added = 0;
    for entry in entries {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir || name.starts_with('.') {
            debug!(entry = %name, "not a parkable directory");
            continue;
        }
        if let Some(existing) = session.registry.find(&name) {
            report.skipped(format!("park {name}"), format!("already registered as {}", existing.kind));
            continue;
        }
        if let Err(e) = validate_site_name(&name) {
            report.skipped(format!("park {name}"), format!("{e:#}"));
            continue;
        }

        let mut site = Site::new(&name, entry.path(), SiteKind::Parked);
        site.secured = session.config.use_https;
        report.done(format!("park {}", session.config.hostname(&name)));
        let result = reconcile_site(ctx, &site, &session.config, &generator);
        report.absorb(format!("configure {name}"), result);
        session.registry.upsert(site);
        added += 1;
    }

    if added > 0 {
        session.registry.save(&ctx.paths)?;
        info!(added, root = %root.display(), "parked sites");
    } else {
        report.skipped("park", format!("no new sites under {}", root.display()));
    }
    Ok(report)
}

/// Register `dir` as a single site, named after the directory unless
/// `name` is given. An existing name is left untouched.
pub fn link(ctx: &Context, name: Option<&str>, dir: &Path) -> Result<Report> {
    let dir = std::path::absolute(dir).with_context(|| format!("resolving '{}'", dir.display()))?;
    let name = match name {
        Some(name) => name.to_string(),
        None => dir
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("cannot derive a site name from '{}'", dir.display()))?,
    };
    validate_site_name(&name)?;

    let mut session = ctx.session()?;
    let mut report = Report::new();

    if let Some(existing) = session.registry.find(&name) {
        report.skipped(
            format!("link {name}"),
            format!(
                "already registered for {}; unlink it first to change the path",
                existing.path.display()
            ),
        );
        return Ok(report);
    }

    let mut site = Site::new(&name, &dir, SiteKind::Linked);
    site.secured = session.config.use_https;
    let generator = ctx.generator()?;
    report.extend(reconcile_site(ctx, &site, &session.config, &generator)?);

    session.registry.upsert(site);
    session.registry.save(&ctx.paths)?;
    report.done(format!("link {}", session.config.hostname(&name)));
    Ok(report)
}

/// Remove a site: staged file, live nginx entries, then the record.
/// Certificates are kept so re-linking reuses them.
pub fn unlink(ctx: &Context, name: &str) -> Result<Report> {
    let mut session = ctx.session()?;
    if session.registry.find(name).is_none() {
        return Err(ParkError::site_not_found(name).into());
    }
    let mut report = Report::new();

    if files::remove_if_exists(&ctx.paths.staged_vhost(name))? {
        report.done(format!("remove staged config for {name}"));
    }
    report.advise(format!("remove {name} from nginx"), ctx.deployer().remove(name));

    session.registry.remove(name)?;
    session.registry.save(&ctx.paths)?;
    report.done(format!("unlink {name}"));
    Ok(report)
}

/// A registered site with its defaults resolved, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteListing {
    pub site: Site,
    pub hostname: String,
    pub php: String,
    /// The PHP version comes from the global default.
    pub php_inherited: bool,
}

pub fn links(ctx: &Context) -> Result<Vec<SiteListing>> {
    let config = crate::config::Config::load(&ctx.paths)?;
    let registry = crate::registry::SiteRegistry::load(&ctx.paths)?;
    Ok(registry
        .list()
        .iter()
        .map(|site| SiteListing {
            hostname: config.hostname(&site.name),
            php: config.php_for(site.php_override()).to_string(),
            php_inherited: site.php_override().is_none(),
            site: site.clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind_of;
    use crate::registry::SiteRegistry;
    use crate::workflows::testing::Sandbox;

    #[test]
    fn test_park_registers_visible_directories_only() {
        let sandbox = Sandbox::new().installed();
        let ctx = sandbox.ctx();
        let root = sandbox.project("sites");
        fs::create_dir_all(root.join("a/public")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();

        park(&ctx, &root).unwrap();

        let registry = SiteRegistry::load(&ctx.paths).unwrap();
        assert_eq!(registry.len(), 1);
        let site = registry.find("a").unwrap();
        assert_eq!(site.kind, SiteKind::Parked);
        assert_eq!(site.path, root.join("a"));
        let staged = fs::read_to_string(ctx.paths.staged_vhost("a")).unwrap();
        assert!(staged.contains(&format!("root {};", root.join("a/public").display())));
    }

    #[test]
    fn test_park_skips_existing_names() {
        let sandbox = Sandbox::new().installed();
        let ctx = sandbox.ctx();
        let linked = sandbox.project("work/a");
        link(&ctx, None, &linked).unwrap();
        let root = sandbox.project("sites");
        fs::create_dir_all(root.join("a")).unwrap();
        fs::create_dir_all(root.join("b")).unwrap();

        let report = park(&ctx, &root).unwrap();

        let registry = SiteRegistry::load(&ctx.paths).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find("a").unwrap().kind, SiteKind::Linked);
        assert!(report
            .steps()
            .iter()
            .any(|s| s.to_string() == "skipped  park a (already registered as linked)"));
    }

    #[test]
    fn test_park_rejects_missing_directory() {
        let sandbox = Sandbox::new().installed();
        let ctx = sandbox.ctx();
        assert!(park(&ctx, &sandbox.temp.path().join("nope")).is_err());
    }

    #[test]
    fn test_park_before_install_fails() {
        let sandbox = Sandbox::new();
        let ctx = sandbox.ctx();
        let root = sandbox.project("sites");
        assert!(park(&ctx, &root).is_err());
    }

    #[test]
    fn test_park_inherits_https_default() {
        let sandbox = Sandbox::new().installed();
        let ctx = sandbox.ctx();
        let mut config = crate::config::Config::load(&ctx.paths).unwrap();
        config.use_https = true;
        config.save(&ctx.paths).unwrap();
        let root = sandbox.project("sites");
        fs::create_dir_all(root.join("shop")).unwrap();

        park(&ctx, &root).unwrap();

        assert!(SiteRegistry::load(&ctx.paths).unwrap().find("shop").unwrap().secured);
        assert!(ctx.certs().exists("shop"));
    }

    #[test]
    fn test_link_uses_directory_name() {
        let sandbox = Sandbox::new().installed();
        let ctx = sandbox.ctx();
        let dir = sandbox.project("code/my-api");

        link(&ctx, None, &dir).unwrap();

        let registry = SiteRegistry::load(&ctx.paths).unwrap();
        let site = registry.find("my-api").unwrap();
        assert_eq!(site.kind, SiteKind::Linked);
        assert!(ctx.deployer().enabled_path("my-api").is_symlink());
    }

    #[test]
    fn test_link_existing_name_changes_nothing() {
        let sandbox = Sandbox::new().installed();
        let ctx = sandbox.ctx();
        link(&ctx, Some("app"), &sandbox.project("one")).unwrap();
        let before = SiteRegistry::load(&ctx.paths).unwrap();

        let report = link(&ctx, Some("app"), &sandbox.project("two")).unwrap();

        assert_eq!(SiteRegistry::load(&ctx.paths).unwrap(), before);
        assert!(matches!(report.steps()[0].outcome, crate::report::Outcome::Skipped(_)));
    }

    #[test]
    fn test_link_rejects_bad_name() {
        let sandbox = Sandbox::new().installed();
        let ctx = sandbox.ctx();
        let err = link(&ctx, Some("a/b"), &sandbox.project("x")).unwrap_err();
        assert!(matches!(kind_of(&err), Some(ParkError::Parse { .. })));
    }

    #[test]
    fn test_unlink_removes_everything_but_certificates() {
        let sandbox = Sandbox::new().installed();
        let ctx = sandbox.ctx();
        link(&ctx, Some("blog"), &sandbox.project("blog")).unwrap();
        ctx.certs().generate("blog", "blog.test").unwrap();

        unlink(&ctx, "blog").unwrap();

        assert!(SiteRegistry::load(&ctx.paths).unwrap().find("blog").is_none());
        assert!(!ctx.paths.staged_vhost("blog").exists());
        assert!(!ctx.deployer().available_path("blog").exists());
        assert!(ctx.certs().exists("blog"));
    }

    #[test]
    fn test_unlink_missing_site_is_not_found_and_unchanged() {
        let sandbox = Sandbox::new().installed();
        let ctx = sandbox.ctx();
        link(&ctx, Some("blog"), &sandbox.project("blog")).unwrap();
        let before = fs::read_to_string(&ctx.paths.sites).unwrap();

        let err = unlink(&ctx, "ghost").unwrap_err();

        assert!(matches!(kind_of(&err), Some(ParkError::NotFound { .. })));
        assert_eq!(fs::read_to_string(&ctx.paths.sites).unwrap(), before);
    }

    #[test]
    fn test_links_resolves_default_php() {
        let sandbox = Sandbox::new().installed();
        let ctx = sandbox.ctx();
        link(&ctx, Some("blog"), &sandbox.project("blog")).unwrap();

        let listing = links(&ctx).unwrap();

        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].hostname, "blog.test");
        assert!(listing[0].php_inherited);
        assert_eq!(listing[0].php, crate::config::FALLBACK_PHP);
    }
}
