//! Capability seams between the orchestrator and the host.
//!
//! Each trait covers one independently-stateful external system. The real
//! adapters live in `util` and shell out to the usual Debian tooling; tests
//! substitute recording fakes.

use crate::core::paths::HostPaths;
use crate::core::probe::HealthProbe;
use crate::core::store::ConfigStore;
use anyhow::Result;
use std::path::Path;

pub trait PackageManager {
    /// Subset of `packages` not currently installed.
    fn missing(&self, packages: &[&str]) -> Result<Vec<String>>;
    fn refresh_index(&self) -> Result<()>;
    fn install(&self, packages: &[String]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Allow,
    Deny,
}

pub trait Firewall {
    /// Drop every existing rule.
    fn reset(&self) -> Result<()>;
    fn default_policy(&self, direction: Direction, policy: Policy) -> Result<()>;
    fn allow_tcp(&self, port: u16) -> Result<()>;
    fn enable(&self) -> Result<()>;
}

pub trait AccountManager {
    fn exists(&self, user: &str) -> Result<bool>;
    /// Create a system account without a login shell. An account that
    /// appeared concurrently under the same name counts as success.
    fn create_system_user(&self, user: &str, home: &Path) -> Result<()>;
    fn chown_recursive(&self, user: &str, path: &Path) -> Result<()>;
}

pub trait SourceFetcher {
    /// Materialize `source` at `branch` into `dest`, which does not exist.
    fn fetch(&self, source: &str, branch: &str, dest: &Path) -> Result<()>;
}

pub trait DependencyInstaller {
    /// Create an isolated runtime environment at `env_dir`, as `user`.
    fn create_env(&self, user: &str, env_dir: &Path) -> Result<()>;
    /// Install `manifest` into `env_dir`, as `user`.
    fn install(&self, user: &str, env_dir: &Path, manifest: &Path) -> Result<()>;
}

pub trait ProcessSupervisor {
    fn daemon_reload(&self) -> Result<()>;
    fn enable(&self, unit: &str) -> Result<()>;
    fn restart(&self, unit: &str) -> Result<()>;
    fn stop(&self, unit: &str) -> Result<()>;
    fn is_active(&self, unit: &str) -> Result<bool>;
    fn recent_logs(&self, unit: &str, lines: u32) -> Result<String>;
    /// Listening TCP sockets, for readiness diagnostics.
    fn listening_sockets(&self) -> Result<String>;
}

pub trait CertificateAuthority {
    /// Run the HTTP-01 challenge with the CA's own listener on port 80.
    fn issue_standalone(&self, domain: &str, email: Option<&str>) -> Result<()>;
    /// Exercise renewal against the staging CA without replacing anything.
    fn renewal_dry_run(&self, domain: &str) -> Result<()>;
}

pub trait ProxyServer {
    /// systemd unit running the proxy.
    fn unit(&self) -> &str;
    /// Syntax-check the full proxy configuration.
    fn validate_config(&self) -> Result<()>;
}

/// Everything a provisioning run touches.
pub struct Host {
    pub paths: HostPaths,
    pub store: Box<dyn ConfigStore>,
    pub packages: Box<dyn PackageManager>,
    pub firewall: Box<dyn Firewall>,
    pub accounts: Box<dyn AccountManager>,
    pub source: Box<dyn SourceFetcher>,
    pub deps: Box<dyn DependencyInstaller>,
    pub supervisor: Box<dyn ProcessSupervisor>,
    pub certs: Box<dyn CertificateAuthority>,
    pub proxy: Box<dyn ProxyServer>,
    pub probe: HealthProbe,
}
