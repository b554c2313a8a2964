//! Error taxonomy for provisioning runs.

use std::path::PathBuf;
use thiserror::Error;

/// Diagnostics gathered when the supervised process never became ready.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub recent_logs: String,
    pub port_state: String,
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "--- recent supervisor logs")?;
        writeln!(f, "{}", self.recent_logs.trim_end())?;
        writeln!(f, "--- listening ports")?;
        write!(f, "{}", self.port_state.trim_end())
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Missing input or malformed source. Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no upload token has been issued ({})", .0.display())]
    TokenNotFound(PathBuf),

    #[error("token file {} is malformed: {reason}", .path.display())]
    MalformedToken { path: PathBuf, reason: String },

    /// The supervised process never answered on its loopback port.
    #[error("service not ready: {reason}")]
    NotReady {
        reason: String,
        diagnostics: Diagnostics,
    },

    #[error("another provisioning run holds {}", .0.display())]
    Busy(PathBuf),

    /// Failure reported by an external tool (package manager, supervisor, ...).
    #[error(transparent)]
    Infra(#[from] anyhow::Error),
}

impl ProvisionError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            Self::NotReady { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ProvisionError {
    fn from(err: std::io::Error) -> Self {
        Self::Infra(err.into())
    }
}

/// The pipeline stopped at `phase`.
#[derive(Debug, Error)]
#[error("phase '{phase}' failed: {source}")]
pub struct PipelineError {
    pub phase: &'static str,
    #[source]
    pub source: ProvisionError,
}

pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
