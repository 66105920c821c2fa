use super::Context;
use crate::config::{Config, DnsRecord};
use crate::dns::DnsManager;
use crate::registry::{RegistryLock, SiteRegistry};
use crate::report::Report;
use anyhow::Result;
use tracing::warn;

/// How many registered hostnames `trust` probes afterwards.
const RESOLUTION_SAMPLES: usize = 3;

/// Make `*.<domain>` resolve locally, handing port 53 over from
/// systemd-resolved when it is in the way.
pub fn trust(ctx: &Context) -> Result<Report> {
    let _lock = RegistryLock::acquire(&ctx.paths)?;
    let mut config = Config::load(&ctx.paths)?;
    let dns = ctx.dns();
    let domain = config.domain.clone();
    let mut report = Report::new();
    dns.stub_check(&config.dns);

    if dns.is_domain_configured(&domain) {
        report.skipped(format!("configure dnsmasq for .{domain}"), "already configured");
    } else {
        dns.require_resolver()?;
        // Persist whatever the handover changed, even when a later step failed.
        let handover = hand_over(&dns, &domain, &mut config.dns, &mut report);
        config.save(&ctx.paths)?;
        handover?;
    }

    let hosts: Vec<String> = match SiteRegistry::load(&ctx.paths) {
        Ok(registry) if !registry.is_empty() => registry
            .list()
            .iter()
            .take(RESOLUTION_SAMPLES)
            .map(|s| config.hostname(&s.name))
            .collect(),
        _ => vec![config.hostname("example")],
    };
    for host in hosts {
        if dns.test_resolution(&host) {
            report.done(format!("resolve {host}"));
        } else {
            report.advisory(
                format!("resolve {host}"),
                "does not resolve to 127.0.0.1 yet (resolver caches may need a moment)",
            );
        }
    }
    Ok(report)
}

/// Free port 53, start dnsmasq on it, and only then route the host's
/// resolution through it. When dnsmasq cannot take over, the stub listener
/// is given back so the host keeps a working resolver.
fn hand_over(dns: &DnsManager, domain: &str, record: &mut DnsRecord, report: &mut Report) -> Result<()> {
    if dns.release_port(record)? {
        report.done("disable systemd-resolved stub listener");
    }

    if let Err(e) = dns.setup_domain(domain) {
        if !dns.marker_present() {
            return Err(e);
        }
        return match dns.revert_stub(record) {
            Ok(()) => {
                warn!("dnsmasq did not come up, restored the systemd-resolved stub listener");
                Err(e.context("stub listener restored"))
            }
            Err(revert) => Err(e.context(format!("restoring the stub listener also failed: {revert:#}"))),
        };
    }
    report.done(format!("configure dnsmasq for .{domain}"));

    if dns.redirect_resolv_conf(record)? {
        report.done("point /etc/resolv.conf at dnsmasq");
    }
    Ok(())
}

/// Remove the domain mapping and give the stub listener back if it was
/// taken.
pub fn untrust(ctx: &Context) -> Result<Report> {
    let _lock = RegistryLock::acquire(&ctx.paths)?;
    let mut config = Config::load(&ctx.paths)?;
    let dns = ctx.dns();
    dns.stub_check(&config.dns);

    let domain = config.domain.clone();
    let report = dns.remove_domain(&domain, &mut config.dns)?;
    config.save(&ctx.paths)?;
    Ok(report)
}
