use super::Context;
use crate::config::Config;
use crate::dns::StubCheck;
use crate::registry::{SiteKind, SiteRegistry};
use crate::runtime::RuntimeVersion;
use anyhow::Result;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiteCounts {
    pub total: usize,
    pub linked: usize,
    pub parked: usize,
    pub secured: usize,
}

/// Snapshot of the installation and of the host services it depends on.
#[derive(Debug, Clone)]
pub struct Status {
    pub home: PathBuf,
    pub installed: bool,
    pub config: Option<Config>,
    /// Why the config or registry could not be read, if so.
    pub problems: Vec<String>,
    pub sites: SiteCounts,
    pub staged_configs: usize,
    pub certificates: usize,
    pub runtimes: Vec<RuntimeVersion>,
    pub nginx_installed: bool,
    pub dnsmasq_installed: bool,
    pub dns_configured: bool,
    pub resolved_active: bool,
    pub stub: Option<StubCheck>,
}

/// Read-only; takes no lock.
pub fn status(ctx: &Context) -> Result<Status> {
    let dns = ctx.dns();
    let mut status = Status {
        home: ctx.paths.home.clone(),
        installed: ctx.paths.exists(),
        config: None,
        problems: Vec::new(),
        sites: SiteCounts::default(),
        staged_configs: 0,
        certificates: 0,
        runtimes: ctx.runtimes(),
        nginx_installed: ctx.runner.find("nginx").is_some(),
        dnsmasq_installed: dns.resolver_installed(),
        dns_configured: false,
        resolved_active: dns.resolved_active(),
        stub: None,
    };
    if !status.installed {
        return Ok(status);
    }

    match Config::load(&ctx.paths) {
        Ok(config) => {
            status.dns_configured = dns.is_domain_configured(&config.domain);
            status.stub = Some(dns.stub_check(&config.dns));
            status.config = Some(config);
        }
        Err(e) => status.problems.push(format!("{e:#}")),
    }

    match SiteRegistry::load(&ctx.paths) {
        Ok(registry) => {
            for site in registry.list() {
                status.sites.total += 1;
                match site.kind {
                    SiteKind::Linked => status.sites.linked += 1,
                    SiteKind::Parked => status.sites.parked += 1,
                }
                if site.secured {
                    status.sites.secured += 1;
                }
            }
        }
        Err(e) => status.problems.push(format!("{e:#}")),
    }

    status.staged_configs = count_with_extension(&ctx.paths.nginx, "conf");
    status.certificates = ctx.certs().count();
    Ok(status)
}

fn count_with_extension(dir: &Path, ext: &str) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file() && e.path().extension().is_some_and(|x| x == ext))
                .count()
        })
        .unwrap_or(0)
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Installation")?;
        if !self.installed {
            writeln!(f, "  not installed (run `phppark install`)")?;
            return Ok(());
        }
        writeln!(f, "  home:          {}", self.home.display())?;
        for problem in &self.problems {
            writeln!(f, "  problem:       {problem}")?;
        }

        if let Some(config) = &self.config {
            writeln!(f, "\nConfiguration")?;
            writeln!(f, "  domain:        .{}", config.domain)?;
            writeln!(f, "  default PHP:   {}", config.default_php)?;
            writeln!(f, "  https default: {}", yes_no(config.use_https))?;
        }

        writeln!(f, "\nSites")?;
        writeln!(
            f,
            "  total:         {} ({} linked, {} parked, {} secured)",
            self.sites.total, self.sites.linked, self.sites.parked, self.sites.secured
        )?;
        writeln!(f, "  staged:        {} nginx configs", self.staged_configs)?;
        writeln!(f, "  certificates:  {}", self.certificates)?;

        writeln!(f, "\nServices")?;
        writeln!(f, "  nginx:         {}", yes_no(self.nginx_installed))?;
        writeln!(f, "  dnsmasq:       {}", yes_no(self.dnsmasq_installed))?;
        if self.runtimes.is_empty() {
            writeln!(f, "  php:           none detected")?;
        }
        for runtime in &self.runtimes {
            let default = if runtime.is_system_default { " (system default)" } else { "" };
            writeln!(f, "  php {:<9} {}{default}", runtime.version, runtime.binary.display())?;
        }

        writeln!(f, "\nDNS")?;
        writeln!(f, "  domain mapped: {}", yes_no(self.dns_configured))?;
        writeln!(f, "  resolved:      {}", if self.resolved_active { "active" } else { "inactive" })?;
        if let Some(stub) = &self.stub {
            writeln!(f, "  stub handover: {stub}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::DnsManager;
    use crate::files;
    use crate::workflows::testing::Sandbox;
    use crate::workflows::{link, secure};

    #[test]
    fn test_status_before_install() {
        let sandbox = Sandbox::new();
        let status = status(&sandbox.ctx()).unwrap();
        assert!(!status.installed);
        assert!(status.to_string().contains("not installed"));
    }

    #[test]
    fn test_status_counts() {
        let sandbox = Sandbox::new().installed();
        let ctx = sandbox.ctx();
        link(&ctx, Some("a"), &sandbox.project("a")).unwrap();
        link(&ctx, Some("b"), &sandbox.project("b")).unwrap();
        secure(&ctx, "b").unwrap();

        let status = status(&ctx).unwrap();

        assert_eq!(
            status.sites,
            SiteCounts {
                total: 2,
                linked: 2,
                parked: 0,
                secured: 1
            }
        );
        assert_eq!(status.staged_configs, 2);
        assert_eq!(status.certificates, 1);
        assert!(status.nginx_installed);
        assert_eq!(status.stub, Some(StubCheck::Consistent(crate::config::StubState::Enabled)));
    }

    #[test]
    fn test_status_surfaces_stub_desync() {
        let sandbox = Sandbox::new().installed();
        let ctx = sandbox.ctx();
        let marker = DnsManager::new(&ctx.system, ctx.runner).marker_path();
        files::write_file(&marker, "# Managed by PHPark\n").unwrap();

        let status = status(&ctx).unwrap();

        assert!(status.stub.unwrap().is_desync());
        assert!(status.to_string().contains("out of sync"));
    }
}
