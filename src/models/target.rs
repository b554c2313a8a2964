//! The provisioning target: one host, one domain, one service.

use crate::constants;
use crate::error::{ProvisionError, Result};
use crate::models::config::TargetSection;
use crate::util::path;
use serde::Serialize;
use std::path::PathBuf;

/// Immutable description of what a run provisions.
///
/// Re-runs must be given the same descriptor to converge on the same state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetDescriptor {
    pub domain: String,
    pub service_name: String,
    pub install_dir: PathBuf,
    pub port: u16,
    pub service_user: String,
    pub token_file: PathBuf,
    pub source: String,
    pub branch: String,
    pub admin_port: u16,
    pub acme_email: Option<String>,
}

impl TargetDescriptor {
    /// Build a descriptor from CLI inputs layered over the config file.
    ///
    /// `domain` and `source` come from the command line and win over the file.
    pub fn resolve(
        domain: Option<&str>,
        source: Option<&str>,
        section: &TargetSection,
    ) -> Result<Self> {
        let domain = domain
            .map(str::to_string)
            .or_else(|| section.domain.clone())
            .ok_or_else(|| ProvisionError::config("a target domain is required (--domain)"))?;
        let descriptor = Self::layered(domain, source, section);
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Descriptor for commands that only touch the installed service, such
    /// as the token commands. The domain may be left empty.
    pub fn resolve_local(section: &TargetSection) -> Result<Self> {
        let descriptor = Self::layered(section.domain.clone().unwrap_or_default(), None, section);
        descriptor.validate_service()?;
        Ok(descriptor)
    }

    fn layered(domain: String, source: Option<&str>, section: &TargetSection) -> Self {
        Self {
            domain: domain.trim().to_ascii_lowercase(),
            service_name: section
                .service_name
                .clone()
                .unwrap_or_else(|| constants::DEFAULT_SERVICE_NAME.to_string()),
            install_dir: section
                .install_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_INSTALL_DIR)),
            port: section.port.unwrap_or(constants::DEFAULT_PORT),
            service_user: section
                .service_user
                .clone()
                .unwrap_or_else(|| constants::DEFAULT_SERVICE_USER.to_string()),
            token_file: section
                .token_file
                .clone()
                .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_TOKEN_FILE)),
            source: source
                .map(str::to_string)
                .or_else(|| section.source.clone())
                .unwrap_or_else(|| constants::DEFAULT_SOURCE.to_string()),
            branch: section
                .branch
                .clone()
                .unwrap_or_else(|| constants::DEFAULT_BRANCH.to_string()),
            admin_port: section.admin_port.unwrap_or(constants::DEFAULT_ADMIN_PORT),
            acme_email: section.acme_email.clone().filter(|e| !e.trim().is_empty()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_domain(&self.domain).map_err(ProvisionError::Config)?;
        self.validate_service()
    }

    fn validate_service(&self) -> Result<()> {
        validate_name("service_name", &self.service_name).map_err(ProvisionError::Config)?;
        validate_user(&self.service_user).map_err(ProvisionError::Config)?;
        if let Some(reason) = path::install_dir_violation(&self.install_dir) {
            return Err(ProvisionError::Config(reason));
        }
        if !self.token_file.is_absolute() {
            return Err(ProvisionError::config(format!(
                "token_file must be absolute: {}",
                self.token_file.display()
            )));
        }
        // The source phase deletes install_dir and hands it to the service account.
        if path::normalize(&self.token_file).starts_with(&self.install_dir) {
            return Err(ProvisionError::config(format!(
                "token_file {} must live outside install_dir {}",
                self.token_file.display(),
                self.install_dir.display()
            )));
        }
        if self.port == 0 || self.admin_port == 0 {
            return Err(ProvisionError::config("ports must be in 1-65535"));
        }
        if [constants::HTTP_PORT, constants::HTTPS_PORT].contains(&self.port) {
            return Err(ProvisionError::config(format!(
                "application port {} collides with the reverse proxy",
                self.port
            )));
        }
        if self.source.trim().is_empty() {
            return Err(ProvisionError::config("source location is empty"));
        }
        Ok(())
    }

    /// systemd unit name, e.g. `filedrop.service`.
    pub fn unit_name(&self) -> String {
        format!("{}.service", self.service_name)
    }

    pub fn entry_point(&self) -> PathBuf {
        self.install_dir.join(constants::ENTRY_POINT)
    }

    pub fn manifest(&self) -> PathBuf {
        self.install_dir.join(constants::DEPENDENCY_MANIFEST)
    }

    pub fn venv_dir(&self) -> PathBuf {
        self.install_dir.join(constants::VENV_DIR)
    }

    /// Loopback address the proxy forwards to.
    pub fn upstream(&self) -> String {
        format!("{}:{}", constants::LOOPBACK_HOST, self.port)
    }
}

fn validate_domain(domain: &str) -> std::result::Result<(), String> {
    if domain.is_empty() {
        return Err("domain cannot be empty".into());
    }
    if domain.len() > 253 {
        return Err(format!("domain too long: {}", domain));
    }
    if !domain.contains('.') {
        return Err(format!("domain must be fully qualified: {}", domain));
    }
    for label in domain.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(format!("invalid domain label in {}", domain));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(format!("domain label cannot start or end with '-': {}", domain));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(format!("only [a-z0-9-] allowed in domain labels: {}", domain));
        }
    }
    Ok(())
}

fn validate_name(field: &str, s: &str) -> std::result::Result<(), String> {
    if s.is_empty() {
        return Err(format!("{} cannot be empty", field));
    }
    if s.contains("..") {
        return Err(format!("{}: path traversal not allowed", field));
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(format!("{}: only [a-zA-Z0-9._-] allowed", field));
    }
    Ok(())
}

fn validate_user(user: &str) -> std::result::Result<(), String> {
    let mut chars = user.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return Err(format!("invalid service_user '{}'", user)),
    }
    if user.len() > 32
        || !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(format!("invalid service_user '{}'", user));
    }
    Ok(())
}
