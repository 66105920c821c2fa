//! One function per CLI verb.
//!
//! Every mutating workflow has the same shape:
//!
//! 1. take the lock, load the registry and the config
//! 2. mutate or select sites
//! 3. reconcile each affected site (certificate, render, stage,
//!    permissions, deploy, pool, proxy)
//! 4. persist, then hand the [`Report`](crate::report::Report) back
//!
//! Failures up to and including staging abort the workflow before anything
//! is persisted. Deploy and service failures after that are advisories: the
//! registry stays the source of truth and `rebuild` converges later.

mod dns;
mod install;
mod reconcile;
mod runtime;
mod secure;
mod sites;
mod status;

pub use dns::{trust, untrust};
pub use install::install;
pub use reconcile::{rebuild, reconcile_site};
pub use runtime::{php_list, use_version};
pub use secure::{secure, unsecure};
pub use sites::{link, links, park, unlink, SiteListing};
pub use status::{status, SiteCounts, Status};

use crate::cert::CertManager;
use crate::config::Config;
use crate::deploy::Deployer;
use crate::dns::DnsManager;
use crate::paths::{Paths, SystemLayout};
use crate::process::CommandRunner;
use crate::registry::{RegistryLock, SiteRegistry};
use crate::runtime::{detect, RuntimeVersion};
use crate::vhost::VhostGenerator;
use anyhow::Result;

/// Everything a workflow touches: the tool home, the host layout and the
/// process boundary.
pub struct Context<'a> {
    pub paths: Paths,
    pub system: SystemLayout,
    pub runner: &'a dyn CommandRunner,
}

impl<'a> Context<'a> {
    pub fn new(paths: Paths, system: SystemLayout, runner: &'a dyn CommandRunner) -> Self {
        Self {
            paths,
            system,
            runner,
        }
    }

    pub fn deployer(&self) -> Deployer<'_> {
        Deployer::new(&self.system, self.runner)
    }

    pub fn dns(&self) -> DnsManager<'_> {
        DnsManager::new(&self.system, self.runner)
    }

    pub fn certs(&self) -> CertManager {
        CertManager::new(&self.paths.certificates)
    }

    pub fn generator(&self) -> Result<VhostGenerator> {
        VhostGenerator::load(&self.paths, &self.system)
    }

    /// Installed PHP versions, probed now.
    pub fn runtimes(&self) -> Vec<RuntimeVersion> {
        detect(self.runner, &self.system.php_search_dirs, &self.system.php_socket_dir)
    }

    fn session(&self) -> Result<Session> {
        let lock = RegistryLock::acquire(&self.paths)?;
        let config = Config::load(&self.paths)?;
        let registry = SiteRegistry::load(&self.paths)?;
        Ok(Session {
            _lock: lock,
            config,
            registry,
        })
    }
}

/// Loaded state for one mutating command. The lock is released on drop.
struct Session {
    _lock: RegistryLock,
    config: Config,
    registry: SiteRegistry,
}
