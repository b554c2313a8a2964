//! Service account management.

use crate::core::host::AccountManager;
use crate::util::exec;
use anyhow::{bail, Context, Result};
use nix::unistd::User;
use std::path::Path;

/// useradd's exit status for "username already in use".
const USERADD_NAME_IN_USE: i32 = 9;

pub struct SystemAccounts;

impl AccountManager for SystemAccounts {
    fn exists(&self, user: &str) -> Result<bool> {
        let found = User::from_name(user).with_context(|| format!("look up user {}", user))?;
        Ok(found.is_some())
    }

    fn create_system_user(&self, user: &str, home: &Path) -> Result<()> {
        let mut cmd = exec::command(
            "useradd",
            ["--system", "--user-group", "--no-create-home", "--shell", "/usr/sbin/nologin"],
        );
        cmd.arg("--home-dir").arg(home).arg(user);
        let output = exec::capture(&mut cmd)?;
        match output.status.code() {
            Some(0) => Ok(()),
            Some(USERADD_NAME_IN_USE) => {
                tracing::info!(user, "account appeared concurrently, keeping it");
                Ok(())
            }
            _ => bail!("{}", exec::failure_message(&cmd, &output)),
        }
    }

    fn chown_recursive(&self, user: &str, path: &Path) -> Result<()> {
        let owner = format!("{}:{}", user, user);
        let mut cmd = exec::command("chown", ["-R", owner.as_str()]);
        cmd.arg(path);
        exec::run(cmd).with_context(|| format!("chown {} {}", owner, path.display()))?;
        Ok(())
    }
}
