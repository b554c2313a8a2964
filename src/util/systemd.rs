//! Process supervision through systemd.

use crate::core::host::ProcessSupervisor;
use crate::util::exec;
use anyhow::{Context, Result};

pub struct Systemd;

impl ProcessSupervisor for Systemd {
    fn daemon_reload(&self) -> Result<()> {
        exec::run(exec::command("systemctl", ["daemon-reload"]))
            .context("systemctl daemon-reload")?;
        Ok(())
    }

    fn enable(&self, unit: &str) -> Result<()> {
        exec::run(exec::command("systemctl", ["enable", unit]))
            .with_context(|| format!("systemctl enable {}", unit))?;
        Ok(())
    }

    fn restart(&self, unit: &str) -> Result<()> {
        exec::run(exec::command("systemctl", ["restart", unit]))
            .with_context(|| format!("systemctl restart {}", unit))?;
        Ok(())
    }

    fn stop(&self, unit: &str) -> Result<()> {
        exec::run(exec::command("systemctl", ["stop", unit]))
            .with_context(|| format!("systemctl stop {}", unit))?;
        Ok(())
    }

    fn is_active(&self, unit: &str) -> Result<bool> {
        // Non-zero exit just means "not active".
        let output = exec::capture(&mut exec::command("systemctl", ["is-active", "--quiet", unit]))?;
        Ok(output.status.success())
    }

    fn recent_logs(&self, unit: &str, lines: u32) -> Result<String> {
        let lines = lines.to_string();
        exec::run(exec::command(
            "journalctl",
            ["-u", unit, "-n", lines.as_str(), "--no-pager", "--output=short-iso"],
        ))
        .with_context(|| format!("journalctl -u {}", unit))
    }

    fn listening_sockets(&self) -> Result<String> {
        exec::run(exec::command("ss", ["-ltnp"])).context("ss -ltnp")
    }
}
