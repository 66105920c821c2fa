use super::{reconcile_site, Context};
use crate::error::ParkError;
use crate::report::Report;
use anyhow::Result;

/// Serve a site over HTTPS with a fresh self-signed certificate.
///
/// A site that is already secured and still has its files is left alone; a
/// secured site whose files went missing gets them regenerated.
pub fn secure(ctx: &Context, name: &str) -> Result<Report> {
    let mut session = ctx.session()?;
    let mut site = session
        .registry
        .find(name)
        .cloned()
        .ok_or_else(|| ParkError::site_not_found(name))?;
    let certs = ctx.certs();
    let mut report = Report::new();

    if site.secured && certs.exists(name) {
        report.skipped(format!("secure {name}"), "already secured");
        return Ok(report);
    }

    let hostname = session.config.hostname(name);
    let paths = certs.generate(name, &hostname)?;
    report.done(format!("generate certificate {}", paths.cert.display()));

    site.secured = true;
    let generator = ctx.generator()?;
    report.extend(reconcile_site(ctx, &site, &session.config, &generator)?);

    session.registry.upsert(site);
    session.registry.save(&ctx.paths)?;
    report.done(format!("secure https://{hostname}"));
    Ok(report)
}

/// Back to plain HTTP. Removing the certificate files is best effort.
pub fn unsecure(ctx: &Context, name: &str) -> Result<Report> {
    let mut session = ctx.session()?;
    let mut site = session
        .registry
        .find(name)
        .cloned()
        .ok_or_else(|| ParkError::site_not_found(name))?;
    let mut report = Report::new();

    if !site.secured {
        report.skipped(format!("unsecure {name}"), "not secured");
        return Ok(report);
    }

    report.advise(format!("remove certificate for {name}"), ctx.certs().remove(name));

    site.secured = false;
    let generator = ctx.generator()?;
    report.extend(reconcile_site(ctx, &site, &session.config, &generator)?);

    session.registry.upsert(site);
    session.registry.save(&ctx.paths)?;
    report.done(format!("unsecure http://{}", session.config.hostname(name)));
    Ok(report)
}
