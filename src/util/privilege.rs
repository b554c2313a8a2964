//! Effective-uid checks for commands that change the host.

use crate::error::{ProvisionError, Result};

pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Refuse to continue unless running as root.
pub fn require_root(command: &str) -> Result<()> {
    if is_root() {
        return Ok(());
    }
    Err(ProvisionError::config(format!(
        "'{}' modifies system configuration and must run as root (try sudo)",
        command
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_root_agrees_with_euid() {
        assert_eq!(require_root("deploy").is_ok(), is_root());
    }
}
