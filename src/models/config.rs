//! Provisioning config file model (`provision.toml`).

use crate::constants;
use crate::error::{ProvisionError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionFile {
    #[serde(default)]
    pub target: TargetSection,
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub probe: ProbeSettings,
}

impl ProvisionFile {
    /// Load `path`; a missing file means all defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ProvisionError::config(format!(
                    "read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let file: Self = toml::from_str(&content)
            .map_err(|e| ProvisionError::config(format!("parse {}: {}", path.display(), e)))?;
        file.app
            .validate()
            .map_err(|reason| ProvisionError::config(format!("{}: {}", path.display(), reason)))?;
        Ok(file)
    }
}

/// Optional overrides for the target descriptor. Unset fields use defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetSection {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub install_dir: Option<PathBuf>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub service_user: Option<String>,
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub admin_port: Option<u16>,
    /// Contact address registered with the certificate authority.
    #[serde(default)]
    pub acme_email: Option<String>,
}

/// Settings exported to the application through its base unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_download_token_ttl")]
    pub download_token_ttl_seconds: u64,
    #[serde(default = "default_task_ttl")]
    pub task_ttl_seconds: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            download_token_ttl_seconds: default_download_token_ttl(),
            task_ttl_seconds: default_task_ttl(),
        }
    }
}

impl AppSettings {
    /// Values end up on `Environment=` lines of the base unit.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.upload_dir.starts_with('/') {
            return Err(format!("app.upload_dir must be absolute: {:?}", self.upload_dir));
        }
        if self.upload_dir.chars().any(char::is_control) {
            return Err(format!(
                "app.upload_dir contains control characters: {:?}",
                self.upload_dir
            ));
        }
        Ok(())
    }

    /// Key/value pairs for the unit's `Environment=` lines, in a stable order.
    pub fn environment(&self) -> Vec<(&'static str, String)> {
        vec![
            ("UPLOAD_DIR", self.upload_dir.clone()),
            ("MAX_UPLOAD_BYTES", self.max_upload_bytes.to_string()),
            (
                "DOWNLOAD_TOKEN_TTL_SECONDS",
                self.download_token_ttl_seconds.to_string(),
            ),
            ("TASK_TTL_SECONDS", self.task_ttl_seconds.to_string()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSettings {
    #[serde(default = "default_probe_attempts")]
    pub attempts: u32,
    #[serde(default = "default_probe_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_probe_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            attempts: default_probe_attempts(),
            interval_ms: default_probe_interval(),
            request_timeout_ms: default_probe_request_timeout(),
        }
    }
}

fn default_upload_dir() -> String {
    constants::DEFAULT_UPLOAD_DIR.to_string()
}

fn default_max_upload_bytes() -> u64 {
    constants::DEFAULT_MAX_UPLOAD_BYTES
}

fn default_download_token_ttl() -> u64 {
    constants::DEFAULT_DOWNLOAD_TOKEN_TTL_SECS
}

fn default_task_ttl() -> u64 {
    constants::DEFAULT_TASK_TTL_SECS
}

fn default_probe_attempts() -> u32 {
    constants::DEFAULT_PROBE_ATTEMPTS
}

fn default_probe_interval() -> u64 {
    constants::DEFAULT_PROBE_INTERVAL_MS
}

fn default_probe_request_timeout() -> u64 {
    constants::DEFAULT_PROBE_REQUEST_TIMEOUT_MS
}
