//! Local PHP development environment manager.
//!
//! Maps directories under the user's home to `<site>.<domain>` hostnames
//! served by nginx and PHP-FPM, with optional self-signed HTTPS and a
//! dnsmasq wildcard for the development domain.
//!
//! - **Registry** - Which directories are served, as which kind, with which PHP
//! - **Vhost rendering** - Deterministic nginx server blocks from a template
//! - **Deployment** - Copy, enable, validate with `nginx -t`, then reload
//! - **DNS** - dnsmasq wildcard plus the systemd-resolved stub listener handover
//!
//! # Architecture
//!
//! ```text
//! phppark (bin)
//!     │
//!     └── workflows ── install, park, link, unlink, secure, use, trust, status
//!             │
//!             ├── config, registry     ~/.phppark/{config.toml,sites.json} + lock
//!             ├── vhost, cert          staged configs and certificates
//!             ├── permissions          chmod of site trees for the web server
//!             ├── runtime              PHP versions found on the host
//!             ├── deploy               /etc/nginx/sites-{available,enabled}
//!             └── dns                  dnsmasq, resolved.conf, resolv.conf
//!                     │
//!                     └── process::CommandRunner  (SystemRunner | FakeRunner)
//! ```
//!
//! Every external program goes through [`process::CommandRunner`] and every
//! system path comes from [`paths::SystemLayout`], so workflows run against
//! a temporary root in tests.

pub mod cert;
pub mod config;
pub mod deploy;
pub mod dns;
pub mod error;
pub mod files;
pub mod paths;
pub mod permissions;
pub mod privilege;
pub mod process;
pub mod registry;
pub mod report;
pub mod runtime;
pub mod vhost;
pub mod workflows;

pub use error::ParkError;
pub use paths::{Paths, SystemLayout};
pub use report::Report;
pub use workflows::Context;
