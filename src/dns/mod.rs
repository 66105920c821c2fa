//! Local DNS for the site domain through dnsmasq.
//!
//! Two independent concerns live here:
//!
//! - the domain fragment `<dnsmasq.d>/<domain>` answering `*.<domain>` with
//!   the loopback address
//! - the stub listener handover, which frees port 53 from systemd-resolved
//!   while keeping the service running for DHCP, VPN and NetworkManager
//!
//! The handover starts by writing a marker at `<dnsmasq.d>/phppark.conf`.
//! Its presence is what "the stub was taken by us" means, including a
//! handover that stopped halfway; the `[dns]` record in the config is kept
//! alongside and compared against it.

pub mod stub;

pub use stub::StubCheck;

use crate::config::{DnsRecord, StubState};
use crate::deploy::services;
use crate::error::ParkError;
use crate::files;
use crate::paths::SystemLayout;
use crate::process::CommandRunner;
use crate::report::Report;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const LOOPBACK: &str = "127.0.0.1";
pub const DNSMASQ: &str = "dnsmasq";
pub const RESOLVED: &str = "systemd-resolved";

const MARKER_NAME: &str = "phppark.conf";

pub struct DnsManager<'a> {
    layout: &'a SystemLayout,
    runner: &'a dyn CommandRunner,
}

impl<'a> DnsManager<'a> {
    pub fn new(layout: &'a SystemLayout, runner: &'a dyn CommandRunner) -> Self {
        Self { layout, runner }
    }

    pub fn domain_fragment(&self, domain: &str) -> PathBuf {
        self.layout.dnsmasq_dir.join(domain)
    }

    pub fn marker_path(&self) -> PathBuf {
        self.layout.dnsmasq_dir.join(MARKER_NAME)
    }

    pub fn marker_present(&self) -> bool {
        self.marker_path().exists()
    }

    pub fn is_domain_configured(&self, domain: &str) -> bool {
        self.domain_fragment(domain).is_file()
    }

    pub fn resolver_installed(&self) -> bool {
        self.runner.find(DNSMASQ).is_some()
    }

    /// Point `*.<domain>` at the loopback address and restart dnsmasq.
    pub fn setup_domain(&self, domain: &str) -> Result<()> {
        self.require_resolver()?;

        let fragment = self.domain_fragment(domain);
        files::write_file(&fragment, &format!("address=/.{domain}/{LOOPBACK}\n"))
            .with_context(|| format!("writing dnsmasq fragment for .{domain}"))?;
        services::restart(self.runner, DNSMASQ)?;
        info!(domain, "configured dnsmasq");
        Ok(())
    }

    /// Delete the domain fragment. If the stub was handed over, even partly,
    /// it is given back; that and the dnsmasq restart are best effort.
    pub fn remove_domain(&self, domain: &str, record: &mut DnsRecord) -> Result<Report> {
        let mut report = Report::new();
        let fragment = self.domain_fragment(domain);
        if files::remove_if_exists(&fragment)? {
            report.done(format!("remove dnsmasq fragment for .{domain}"));
        } else {
            report.skipped(format!("remove dnsmasq fragment for .{domain}"), "not present");
        }

        if self.marker_present() {
            let reverted = self.revert_stub(record);
            report.advise("restore systemd-resolved stub listener", reverted);
        }

        let restarted = services::restart(self.runner, DNSMASQ);
        report.advise(format!("restart {DNSMASQ}"), restarted);
        Ok(report)
    }

    /// Whether `nslookup` answers with the loopback address. A heuristic on
    /// the tool output, not a DNS query of our own.
    pub fn test_resolution(&self, hostname: &str) -> bool {
        match self.runner.run("nslookup", &[hostname]) {
            Ok(output) => output.success && output.combined().contains(LOOPBACK),
            Err(e) => {
                debug!(hostname, "nslookup failed: {e:#}");
                false
            }
        }
    }

    /// systemd-resolved is running and could hold port 53.
    pub fn resolved_active(&self) -> bool {
        services::is_active(self.runner, RESOLVED)
    }

    /// Fail with [`ParkError::NotFound`] unless dnsmasq is installed.
    pub fn require_resolver(&self) -> Result<()> {
        if self.resolver_installed() {
            return Ok(());
        }
        let missing = ParkError::NotFound {
            kind: "program",
            name: DNSMASQ.to_string(),
        };
        Err(anyhow::Error::new(missing).context("install it with: sudo apt install dnsmasq"))
    }

    /// Every handover step is in place: marker written, directive set and
    /// `/etc/resolv.conf` no longer routed through systemd's stub.
    pub fn handover_complete(&self) -> Result<bool> {
        if !self.marker_present() || systemd_link_target(&self.layout.resolv_conf).is_some() {
            return Ok(false);
        }
        let content = files::read_optional(&self.layout.resolved_conf)?.unwrap_or_default();
        Ok(stub::stub_listener_disabled(&content))
    }

    /// The stub listener still needs to be disabled: systemd-resolved is
    /// active and the handover is missing or only partly applied.
    pub fn stub_active(&self) -> Result<bool> {
        if !self.resolved_active() {
            return Ok(false);
        }
        Ok(!self.handover_complete()?)
    }

    pub fn stub_check(&self, record: &DnsRecord) -> StubCheck {
        let check = StubState::reconcile(record.stub, self.marker_present());
        if check.is_desync() {
            warn!(%check, "recorded stub state disagrees with the marker file");
        }
        check
    }

    /// Hand port 53 over to dnsmasq. Returns `false` without touching
    /// anything when the stub is not active.
    ///
    /// Steps are not rolled back when a later one fails. The marker goes
    /// down first, so a partial handover is retried by the next call and
    /// undone by [`revert_stub`](Self::revert_stub).
    pub fn disable_stub(&self, record: &mut DnsRecord) -> Result<bool> {
        if !self.release_port(record)? {
            return Ok(false);
        }
        self.redirect_resolv_conf(record)?;
        Ok(true)
    }

    /// First half of [`disable_stub`](Self::disable_stub): marker with the
    /// upstream servers, the directive, and a resolved restart. Afterwards
    /// port 53 is free but `/etc/resolv.conf` is unchanged.
    pub fn release_port(&self, record: &mut DnsRecord) -> Result<bool> {
        if !self.stub_active()? {
            debug!("stub listener not active, nothing to disable");
            return Ok(false);
        }
        info!("disabling systemd-resolved stub listener");

        files::write_file(&self.marker_path(), &stub::upstream_conf(&self.layout.resolved_upstream))
            .context("writing dnsmasq upstream configuration")?;
        record.stub = StubState::Disabled;

        let conf = &self.layout.resolved_conf;
        let content = files::read_optional(conf)?.unwrap_or_default();
        files::write_file(conf, &stub::set_stub_listener(&content, Some("no")))
            .with_context(|| format!("updating '{}'", conf.display()))?;

        services::restart(self.runner, RESOLVED)?;
        Ok(true)
    }

    /// Second half of [`disable_stub`](Self::disable_stub): replace a
    /// systemd `/etc/resolv.conf` symlink with a loopback file. Only runs
    /// while the marker is present.
    pub fn redirect_resolv_conf(&self, record: &mut DnsRecord) -> Result<bool> {
        let resolv = &self.layout.resolv_conf;
        let Some(target) = systemd_link_target(resolv).filter(|_| self.marker_present()) else {
            return Ok(false);
        };
        record.original_resolv_conf = Some(target);
        // Remove first: writing through the link would edit systemd's file.
        files::remove_if_exists(resolv)?;
        files::write_file(resolv, &stub::loopback_resolv_conf())
            .with_context(|| format!("replacing '{}'", resolv.display()))?;
        info!(path = %resolv.display(), "resolution now goes through dnsmasq");
        Ok(true)
    }

    /// Undo [`disable_stub`](Self::disable_stub).
    pub fn revert_stub(&self, record: &mut DnsRecord) -> Result<()> {
        info!("restoring systemd-resolved stub listener");

        let conf = &self.layout.resolved_conf;
        if let Some(content) = files::read_optional(conf)? {
            files::write_file(conf, &stub::set_stub_listener(&content, None))
                .with_context(|| format!("updating '{}'", conf.display()))?;
        }

        services::restart(self.runner, RESOLVED)?;

        files::remove_if_exists(&self.marker_path())?;

        let resolv = &self.layout.resolv_conf;
        let ours = fs::read_to_string(resolv)
            .map(|c| c.starts_with(stub::MANAGED_HEADER))
            .unwrap_or(false);
        if ours || record.original_resolv_conf.is_some() {
            let target = record
                .original_resolv_conf
                .take()
                .unwrap_or_else(|| self.layout.resolved_stub.clone());
            files::replace_symlink(&target, resolv)
                .with_context(|| format!("restoring '{}'", resolv.display()))?;
        }

        record.stub = StubState::Enabled;
        Ok(())
    }
}

/// Target of `path` when it is a symlink into systemd's resolver.
fn systemd_link_target(path: &Path) -> Option<PathBuf> {
    if !path.is_symlink() {
        return None;
    }
    let target = fs::read_link(path).ok()?;
    target
        .to_string_lossy()
        .contains("systemd")
        .then_some(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind_of;
    use crate::process::{CommandOutput, FakeRunner};
    use tempfile::TempDir;

    struct Host {
        _temp: TempDir,
        layout: SystemLayout,
        fake: FakeRunner,
    }

    /// Ubuntu-like host: resolved active, stock resolved.conf, resolv.conf
    /// linked to the stub file.
    fn ubuntu_host() -> Host {
        let temp = TempDir::new().unwrap();
        let layout = SystemLayout::rooted(temp.path());
        let fake = FakeRunner::new();
        fake.install("dnsmasq", "/usr/sbin/dnsmasq");
        fake.respond("systemctl is-active systemd-resolved", CommandOutput::ok("active\n"));
        files::write_file(&layout.resolved_conf, "[Resolve]\n#DNSStubListener=yes\n").unwrap();
        files::write_file(&layout.resolved_stub, "nameserver 127.0.0.53\n").unwrap();
        files::replace_symlink(&layout.resolved_stub, &layout.resolv_conf).unwrap();
        Host {
            _temp: temp,
            layout,
            fake,
        }
    }

    #[test]
    fn test_setup_and_remove_domain() {
        let host = ubuntu_host();
        let dns = DnsManager::new(&host.layout, &host.fake);
        let mut record = DnsRecord::default();

        dns.setup_domain("test").unwrap();
        assert!(dns.is_domain_configured("test"));
        let fragment = fs::read_to_string(dns.domain_fragment("test")).unwrap();
        assert_eq!(fragment, "address=/.test/127.0.0.1\n");
        assert_eq!(host.fake.count("systemctl restart dnsmasq"), 1);

        let report = dns.remove_domain("test", &mut record).unwrap();
        assert!(!dns.is_domain_configured("test"));
        assert!(!report.has_advisories());
        assert_eq!(host.fake.count("systemctl restart systemd-resolved"), 0);
    }

    #[test]
    fn test_setup_requires_dnsmasq() {
        let temp = TempDir::new().unwrap();
        let layout = SystemLayout::rooted(temp.path());
        let fake = FakeRunner::new();

        let err = DnsManager::new(&layout, &fake).setup_domain("test").unwrap_err();

        assert!(matches!(kind_of(&err), Some(ParkError::NotFound { .. })));
    }

    #[test]
    fn test_disable_stub_full_transition() {
        let host = ubuntu_host();
        let dns = DnsManager::new(&host.layout, &host.fake);
        let mut record = DnsRecord::default();

        assert!(dns.disable_stub(&mut record).unwrap());

        let conf = fs::read_to_string(&host.layout.resolved_conf).unwrap();
        assert!(stub::stub_listener_disabled(&conf));
        assert_eq!(host.fake.count("systemctl restart systemd-resolved"), 1);
        assert!(dns.marker_present());
        let resolv = &host.layout.resolv_conf;
        assert!(!resolv.is_symlink());
        assert_eq!(fs::read_to_string(resolv).unwrap(), "# Managed by PHPark\nnameserver 127.0.0.1\n");
        assert_eq!(
            fs::read_to_string(&host.layout.resolved_stub).unwrap(),
            "nameserver 127.0.0.53\n",
            "systemd's file is untouched"
        );
        assert_eq!(record.stub, StubState::Disabled);
        assert_eq!(record.original_resolv_conf.as_deref(), Some(host.layout.resolved_stub.as_path()));
    }

    #[test]
    fn test_disable_stub_twice_is_idempotent() {
        let host = ubuntu_host();
        let dns = DnsManager::new(&host.layout, &host.fake);
        let mut record = DnsRecord::default();
        dns.disable_stub(&mut record).unwrap();
        let conf_after_first = fs::read_to_string(&host.layout.resolved_conf).unwrap();
        let recorded = record.clone();
        host.fake.clear_calls();

        assert!(!dns.disable_stub(&mut record).unwrap());

        assert_eq!(host.fake.count("systemctl restart"), 0);
        assert_eq!(fs::read_to_string(&host.layout.resolved_conf).unwrap(), conf_after_first);
        assert_eq!(record, recorded);
    }

    #[test]
    fn test_disable_stub_skipped_when_resolved_inactive() {
        let host = ubuntu_host();
        host.fake.respond("systemctl is-active systemd-resolved", CommandOutput::failed(3, "inactive\n"));
        let dns = DnsManager::new(&host.layout, &host.fake);
        let mut record = DnsRecord::default();

        assert!(!dns.disable_stub(&mut record).unwrap());
        assert!(!dns.marker_present());
        assert!(host.layout.resolv_conf.is_symlink());
    }

    #[test]
    fn test_revert_restores_original_symlink() {
        let host = ubuntu_host();
        let dns = DnsManager::new(&host.layout, &host.fake);
        let mut record = DnsRecord::default();
        dns.disable_stub(&mut record).unwrap();

        dns.revert_stub(&mut record).unwrap();

        let resolv = &host.layout.resolv_conf;
        assert!(resolv.is_symlink());
        assert_eq!(fs::read_link(resolv).unwrap(), host.layout.resolved_stub);
        assert!(!dns.marker_present());
        assert_eq!(
            fs::read_to_string(&host.layout.resolved_conf).unwrap(),
            "[Resolve]\n#DNSStubListener=yes\n"
        );
        assert_eq!(record, DnsRecord::default());
    }

    #[test]
    fn test_remove_domain_reverts_stub_when_marker_present() {
        let host = ubuntu_host();
        let dns = DnsManager::new(&host.layout, &host.fake);
        let mut record = DnsRecord::default();
        dns.setup_domain("test").unwrap();
        dns.disable_stub(&mut record).unwrap();

        dns.remove_domain("test", &mut record).unwrap();

        assert!(host.layout.resolv_conf.is_symlink());
        assert_eq!(record.stub, StubState::Enabled);
    }

    #[test]
    fn test_revert_failure_does_not_block_removal() {
        let host = ubuntu_host();
        let dns = DnsManager::new(&host.layout, &host.fake);
        let mut record = DnsRecord::default();
        dns.setup_domain("test").unwrap();
        dns.disable_stub(&mut record).unwrap();
        host.fake.fail("systemctl restart systemd-resolved");

        let report = dns.remove_domain("test", &mut record).unwrap();

        assert!(!dns.is_domain_configured("test"));
        assert_eq!(report.advisories().count(), 1);
    }

    #[test]
    fn test_partial_handover_is_retried() {
        let host = ubuntu_host();
        let dns = DnsManager::new(&host.layout, &host.fake);
        let mut record = DnsRecord::default();
        host.fake.fail("systemctl restart systemd-resolved");

        assert!(dns.disable_stub(&mut record).is_err());
        assert!(dns.marker_present());
        assert_eq!(record.stub, StubState::Disabled);
        assert!(host.layout.resolv_conf.is_symlink());

        host.fake.respond("systemctl restart systemd-resolved", CommandOutput::ok(""));
        assert!(dns.disable_stub(&mut record).unwrap());

        assert!(dns.handover_complete().unwrap());
        assert!(!host.layout.resolv_conf.is_symlink());
        let conf = fs::read_to_string(&host.layout.resolved_conf).unwrap();
        assert_eq!(conf.matches("DNSStubListener=no").count(), 1);
    }

    #[test]
    fn test_partial_handover_is_reverted() {
        let host = ubuntu_host();
        let dns = DnsManager::new(&host.layout, &host.fake);
        let mut record = DnsRecord::default();
        dns.setup_domain("test").unwrap();
        host.fake.fail("systemctl restart systemd-resolved");
        assert!(dns.disable_stub(&mut record).is_err());
        host.fake.respond("systemctl restart systemd-resolved", CommandOutput::ok(""));

        let report = dns.remove_domain("test", &mut record).unwrap();

        assert!(!report.has_advisories());
        assert!(!dns.marker_present());
        assert_eq!(
            fs::read_to_string(&host.layout.resolved_conf).unwrap(),
            "[Resolve]\n#DNSStubListener=yes\n"
        );
        assert_eq!(fs::read_link(&host.layout.resolv_conf).unwrap(), host.layout.resolved_stub);
        assert_eq!(record.stub, StubState::Enabled);
    }

    #[test]
    fn test_redirect_needs_marker() {
        let host = ubuntu_host();
        let dns = DnsManager::new(&host.layout, &host.fake);
        let mut record = DnsRecord::default();

        assert!(!dns.redirect_resolv_conf(&mut record).unwrap());
        assert!(host.layout.resolv_conf.is_symlink());
    }

    #[test]
    fn test_stub_check_reports_desync() {
        let host = ubuntu_host();
        let dns = DnsManager::new(&host.layout, &host.fake);
        let record = DnsRecord {
            stub: StubState::Disabled,
            original_resolv_conf: None,
        };

        assert!(dns.stub_check(&record).is_desync());
        assert!(!dns.stub_check(&DnsRecord::default()).is_desync());
    }

    #[test]
    fn test_resolution_heuristic() {
        let host = ubuntu_host();
        let dns = DnsManager::new(&host.layout, &host.fake);
        host.fake.respond(
            "nslookup blog.test",
            CommandOutput::ok("Server:\t127.0.0.1\nName:\tblog.test\nAddress: 127.0.0.1\n"),
        );
        host.fake.fail("nslookup missing.test");

        assert!(dns.test_resolution("blog.test"));
        assert!(!dns.test_resolution("missing.test"));
    }
}
