//! Effective-uid check for commands that mutate system state.

use crate::error::ParkError;
use anyhow::Result;

pub fn is_elevated() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Fail with [`ParkError::Privilege`] unless running as root.
pub fn require_root(action: &str) -> Result<()> {
    if is_elevated() {
        return Ok(());
    }
    Err(ParkError::Privilege {
        action: action.to_string(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind_of;

    #[test]
    fn test_require_root_matches_euid() {
        let result = require_root("trust");
        if is_elevated() {
            assert!(result.is_ok());
        } else {
            let err = result.unwrap_err();
            assert!(matches!(kind_of(&err), Some(ParkError::Privilege { .. })));
        }
    }
}
