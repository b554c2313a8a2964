//! Application source retrieval with git.

use crate::core::host::SourceFetcher;
use crate::util::exec;
use anyhow::{Context, Result};
use std::path::Path;

pub struct GitFetcher;

impl SourceFetcher for GitFetcher {
    fn fetch(&self, source: &str, branch: &str, dest: &Path) -> Result<()> {
        let mut cmd = exec::command("git", ["clone", "--depth", "1", "--branch", branch, source]);
        cmd.arg(dest);
        exec::run(cmd).with_context(|| format!("git clone {} ({})", source, branch))?;
        Ok(())
    }
}
