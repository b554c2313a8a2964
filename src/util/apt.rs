//! Debian package management.

use crate::core::host::PackageManager;
use crate::util::exec;
use anyhow::{Context, Result};

pub struct Apt;

impl Apt {
    fn installed(package: &str) -> Result<bool> {
        let output = exec::capture(&mut exec::command(
            "dpkg-query",
            ["-W", "-f=${Status}", package],
        ))?;
        // dpkg-query exits non-zero for packages it has never heard of.
        if !output.status.success() {
            return Ok(false);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "install ok installed")
    }
}

impl PackageManager for Apt {
    fn missing(&self, packages: &[&str]) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        for package in packages {
            if !Self::installed(package)? {
                missing.push(package.to_string());
            }
        }
        Ok(missing)
    }

    fn refresh_index(&self) -> Result<()> {
        let mut cmd = exec::command("apt-get", ["update"]);
        cmd.env("DEBIAN_FRONTEND", "noninteractive");
        exec::run(cmd).context("apt-get update")?;
        Ok(())
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        let mut cmd = exec::command("apt-get", ["install", "-y", "--no-install-recommends"]);
        cmd.args(packages).env("DEBIAN_FRONTEND", "noninteractive");
        exec::run(cmd).with_context(|| format!("apt-get install {}", packages.join(" ")))?;
        Ok(())
    }
}
