//! Firewall management through ufw.

use crate::core::host::{Direction, Firewall, Policy};
use crate::util::exec;
use anyhow::{Context, Result};

pub struct Ufw;

impl Firewall for Ufw {
    fn reset(&self) -> Result<()> {
        exec::run(exec::command("ufw", ["--force", "reset"])).context("ufw reset")?;
        Ok(())
    }

    fn default_policy(&self, direction: Direction, policy: Policy) -> Result<()> {
        let direction = match direction {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        };
        let policy = match policy {
            Policy::Allow => "allow",
            Policy::Deny => "deny",
        };
        exec::run(exec::command("ufw", ["default", policy, direction]))
            .with_context(|| format!("ufw default {} {}", policy, direction))?;
        Ok(())
    }

    fn allow_tcp(&self, port: u16) -> Result<()> {
        let rule = format!("{}/tcp", port);
        exec::run(exec::command("ufw", ["allow", rule.as_str()]))
            .with_context(|| format!("ufw allow {}", rule))?;
        Ok(())
    }

    fn enable(&self) -> Result<()> {
        exec::run(exec::command("ufw", ["--force", "enable"])).context("ufw enable")?;
        Ok(())
    }
}
