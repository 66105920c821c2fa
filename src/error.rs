//! Error taxonomy shared by every component.
//!
//! Library functions return `anyhow::Result` and raise a [`ParkError`] where
//! the caller needs to tell failure kinds apart. Context added with
//! `.with_context()` keeps the kind reachable through `downcast_ref`.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("configuration rejected by {checker}: {output}")]
    Validation { checker: String, output: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{action} requires elevated privileges (run with sudo)")]
    Privilege { action: String },

    #[error("template error: {0}")]
    Template(String),
}

impl ParkError {
    /// Classify an I/O failure on `path`, mapping permission errors to
    /// [`ParkError::Privilege`].
    pub fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            return ParkError::Privilege {
                action: format!("writing {}", path.display()),
            };
        }
        ParkError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn parse(what: impl Into<String>, message: impl ToString) -> Self {
        ParkError::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }

    pub fn site_not_found(name: &str) -> Self {
        ParkError::NotFound {
            kind: "site",
            name: name.to_string(),
        }
    }

    pub fn version_not_found(version: &str) -> Self {
        ParkError::NotFound {
            kind: "PHP version",
            name: version.to_string(),
        }
    }
}

/// Find the [`ParkError`] kind inside an `anyhow` chain, if any.
pub fn kind_of(err: &anyhow::Error) -> Option<&ParkError> {
    err.chain().find_map(|cause| cause.downcast_ref::<ParkError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_permission_denied_maps_to_privilege() {
        let err = ParkError::io(
            Path::new("/etc/nginx/sites-available/a.conf"),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, ParkError::Privilege { .. }));
    }

    #[test]
    fn test_other_io_errors_stay_io() {
        let err = ParkError::io(Path::new("/x"), io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, ParkError::Io { .. }));
    }

    #[test]
    fn test_kind_survives_context() {
        let result: anyhow::Result<()> = Err(ParkError::site_not_found("blog").into());
        let err = result.context("unlinking blog").unwrap_err();
        assert!(matches!(kind_of(&err), Some(ParkError::NotFound { .. })));
        assert!(err.to_string().contains("unlinking blog"));
    }
}
