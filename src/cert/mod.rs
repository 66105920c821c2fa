//! Self-signed certificates for secured sites.
//!
//! Presence of both files on disk is what "this site has a certificate"
//! means; nothing about certificates is recorded in the registry.

use crate::files;
use anyhow::{Context, Result};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose,
};
use std::fs;
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};
use tracing::info;

const ORGANIZATION: &str = "PHPark Development";
const VALIDITY_DAYS: i64 = 365;
const KEY_MODE: u32 = 0o600;

/// Certificate and key locations, derived from the site name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl CertificatePaths {
    pub fn for_site(dir: &Path, site: &str) -> Self {
        Self {
            cert: dir.join(format!("{site}.crt")),
            key: dir.join(format!("{site}.key")),
        }
    }
}

/// Manages the certificate directory.
#[derive(Debug, Clone)]
pub struct CertManager {
    dir: PathBuf,
}

impl CertManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn paths(&self, site: &str) -> CertificatePaths {
        CertificatePaths::for_site(&self.dir, site)
    }

    /// Both the certificate and the key must be present.
    pub fn exists(&self, site: &str) -> bool {
        let paths = self.paths(site);
        paths.cert.is_file() && paths.key.is_file()
    }

    /// Generate (or regenerate) the pair for `hostname`, overwriting any
    /// existing files.
    pub fn generate(&self, site: &str, hostname: &str) -> Result<CertificatePaths> {
        let (cert_pem, key_pem) = self_signed(hostname)
            .with_context(|| format!("generating certificate for '{hostname}'"))?;

        let paths = self.paths(site);
        files::write_file(&paths.cert, &cert_pem)?;
        files::write_file_mode(&paths.key, &key_pem, KEY_MODE)?;
        info!(site, cert = %paths.cert.display(), "generated certificate");
        Ok(paths)
    }

    /// Remove both files. Returns whether anything was removed.
    pub fn remove(&self, site: &str) -> Result<bool> {
        let paths = self.paths(site);
        let cert = files::remove_if_exists(&paths.cert)?;
        let key = files::remove_if_exists(&paths.key)?;
        Ok(cert || key)
    }

    /// Number of certificate files in the directory.
    pub fn count(&self) -> usize {
        fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "crt"))
                    .count()
            })
            .unwrap_or(0)
    }
}

fn self_signed(hostname: &str) -> Result<(String, String)> {
    let mut params = CertificateParams::new(vec![hostname.to_string(), "localhost".to_string()])?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, hostname);
    dn.push(DnType::OrganizationName, ORGANIZATION);
    params.distinguished_name = dn;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + Duration::days(VALIDITY_DAYS);

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;
    Ok((cert.pem(), key_pair.serialize_pem()))
}
