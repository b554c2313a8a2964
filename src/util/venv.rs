//! Python virtualenv management, run as the service account.

use crate::core::host::DependencyInstaller;
use crate::util::exec;
use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

pub struct PythonVenv;

/// `runuser -u <user> -- <program>`: drop root before running installer code.
fn as_user(user: &str, program: &Path) -> Command {
    let mut cmd = exec::command("runuser", ["-u", user, "--"]);
    cmd.arg(program);
    cmd
}

impl DependencyInstaller for PythonVenv {
    fn create_env(&self, user: &str, env_dir: &Path) -> Result<()> {
        let mut cmd = as_user(user, Path::new("python3"));
        cmd.args(["-m", "venv"]).arg(env_dir);
        exec::run(cmd).with_context(|| format!("create virtualenv {}", env_dir.display()))?;
        Ok(())
    }

    fn install(&self, user: &str, env_dir: &Path, manifest: &Path) -> Result<()> {
        let mut cmd = as_user(user, &env_dir.join("bin").join("pip"));
        cmd.args(["install", "--no-cache-dir", "--disable-pip-version-check", "-r"])
            .arg(manifest);
        exec::run(cmd).with_context(|| format!("pip install -r {}", manifest.display()))?;
        Ok(())
    }
}
