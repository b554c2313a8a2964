//! nginx as the reverse proxy.

use crate::constants;
use crate::core::host::ProxyServer;
use crate::util::exec;
use anyhow::{Context, Result};

pub struct Nginx;

impl ProxyServer for Nginx {
    fn unit(&self) -> &str {
        constants::PROXY_UNIT
    }

    fn validate_config(&self) -> Result<()> {
        exec::run(exec::command("nginx", ["-t"])).context("nginx -t")?;
        Ok(())
    }
}
