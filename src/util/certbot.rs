//! Certificate issuance through certbot.

use crate::core::host::CertificateAuthority;
use crate::util::exec;
use anyhow::{Context, Result};

pub struct Certbot;

impl CertificateAuthority for Certbot {
    fn issue_standalone(&self, domain: &str, email: Option<&str>) -> Result<()> {
        let mut cmd = exec::command(
            "certbot",
            [
                "certonly",
                "--standalone",
                "--preferred-challenges",
                "http",
                "--non-interactive",
                "--agree-tos",
                "-d",
                domain,
            ],
        );
        match email {
            Some(email) => cmd.args(["-m", email]),
            None => cmd.arg("--register-unsafely-without-email"),
        };
        exec::run(cmd).with_context(|| format!("certbot certonly for {}", domain))?;
        Ok(())
    }

    fn renewal_dry_run(&self, domain: &str) -> Result<()> {
        exec::run(exec::command(
            "certbot",
            ["renew", "--cert-name", domain, "--dry-run", "--non-interactive"],
        ))
        .with_context(|| format!("certbot renew --dry-run for {}", domain))?;
        Ok(())
    }
}
