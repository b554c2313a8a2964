//! CLI routing and command dispatch.

use crate::constants;
use crate::core::audit_log::{self, AuditResult};
use crate::core::file_lock::FileLock;
use crate::core::host::Host;
use crate::core::paths::HostPaths;
use crate::core::probe::HealthProbe;
use crate::core::store::FsStore;
use crate::error::ProvisionError;
use crate::models::config::ProvisionFile;
use crate::util::{accounts, apt, certbot, fs as host_fs, git, nginx, privilege, systemd, ufw, venv};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod audit;
pub mod check;
pub mod deploy;
pub mod plan;
pub mod token;

/// Shared context passed to all command handlers.
pub struct CliContext {
    pub config_path: PathBuf,
    pub file: ProvisionFile,
    pub paths: HostPaths,
    pub non_interactive: bool,
}

impl CliContext {
    /// The real host: Debian tooling, systemd, nginx, certbot.
    pub fn system_host(&self) -> Host {
        Host {
            paths: self.paths.clone(),
            store: Box::new(FsStore::new(self.paths.clone())),
            packages: Box::new(apt::Apt),
            firewall: Box::new(ufw::Ufw),
            accounts: Box::new(accounts::SystemAccounts),
            source: Box::new(git::GitFetcher),
            deps: Box::new(venv::PythonVenv),
            supervisor: Box::new(systemd::Systemd),
            certs: Box::new(certbot::Certbot),
            proxy: Box::new(nginx::Nginx),
            probe: HealthProbe::new(self.file.probe.clone()),
        }
    }

    /// Serialize mutating commands across processes.
    pub fn run_lock(&self) -> Result<FileLock, ProvisionError> {
        let lock = self.paths.run_lock();
        if let Some(dir) = lock.parent() {
            host_fs::ensure_dir(dir, constants::STATE_DIR_MODE)?;
        }
        FileLock::try_exclusive(&lock)
    }

    /// Append to the audit log; a failed write is reported, not fatal.
    pub fn audit(&self, action: &str, subject: &str, result: AuditResult) {
        audit_log::record_quietly(&self.paths, action, subject, result);
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "filedrop-provision",
    version,
    about = "Provision a single host to serve the filedrop upload service over HTTPS"
)]
pub struct Cli {
    /// Provisioning config file (TOML). Missing file means defaults.
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = "FILEDROP_CONFIG",
        default_value = constants::DEFAULT_CONFIG_PATH
    )]
    pub config: PathBuf,

    /// Run in non-interactive mode (no prompts, suitable for automation)
    #[arg(long, global = true, env = "FILEDROP_NON_INTERACTIVE")]
    pub non_interactive: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let file = ProvisionFile::load(&self.config)?;
        let ctx = CliContext {
            config_path: self.config,
            file,
            paths: HostPaths::default(),
            non_interactive: self.non_interactive,
        };

        if self.command.requires_root() {
            privilege::require_root(self.command.name())?;
        }

        match self.command {
            Commands::Deploy(args) => deploy::run(&ctx, args),
            Commands::Token { command } => token::run(&ctx, command),
            Commands::Plan(args) => plan::run(&ctx, args),
            Commands::Check(args) => check::run(&ctx, args),
            Commands::Audit(args) => audit::run(&ctx, args),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision the host end to end (idempotent)
    Deploy(deploy::DeployArgs),
    /// Print or rotate the upload token
    Token {
        #[command(subcommand)]
        command: token::TokenCommand,
    },
    /// Show the phases a deploy would run, without side effects
    Plan(plan::PlanArgs),
    /// Inspect the provisioned artifacts (read-only)
    Check(check::CheckArgs),
    /// View or verify the audit trail
    Audit(audit::AuditArgs),
}

impl Commands {
    /// Whether this command requires root privileges.
    pub fn requires_root(&self) -> bool {
        matches!(self, Commands::Deploy(_) | Commands::Token { .. })
    }

    /// Command name for error messages.
    pub fn name(&self) -> &str {
        match self {
            Commands::Deploy(_) => "deploy",
            Commands::Token {
                command: token::TokenCommand::Print,
            } => "token print",
            Commands::Token {
                command: token::TokenCommand::Rotate(_),
            } => "token rotate",
            Commands::Plan(_) => "plan",
            Commands::Check(_) => "check",
            Commands::Audit(_) => "audit",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_args() {
        let cli = Cli::try_parse_from([
            "filedrop-provision",
            "deploy",
            "--domain",
            "example.com",
            "--repo",
            "https://git.example.com/filedrop.git",
            "--yes",
        ])
        .unwrap();
        match cli.command {
            Commands::Deploy(args) => {
                assert_eq!(args.domain.as_deref(), Some("example.com"));
                assert_eq!(
                    args.repo.as_deref(),
                    Some("https://git.example.com/filedrop.git")
                );
                assert!(args.yes);
                assert!(!args.no_hardening);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_token_commands_need_root() {
        let cli = Cli::try_parse_from(["filedrop-provision", "token", "rotate", "--no-wait"]).unwrap();
        assert!(cli.command.requires_root());
        assert_eq!(cli.command.name(), "token rotate");

        let cli = Cli::try_parse_from(["filedrop-provision", "token", "print"]).unwrap();
        assert!(cli.command.requires_root());
    }

    #[test]
    fn test_read_only_commands() {
        for argv in [
            vec!["filedrop-provision", "plan", "--domain", "example.com"],
            vec!["filedrop-provision", "check", "--format", "json"],
            vec!["filedrop-provision", "audit", "--verify"],
        ] {
            let cli = Cli::try_parse_from(argv).unwrap();
            assert!(!cli.command.requires_root(), "{}", cli.command.name());
        }
    }

    #[test]
    fn test_config_flag_is_global() {
        let cli = Cli::try_parse_from([
            "filedrop-provision",
            "check",
            "--config",
            "/tmp/provision.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/tmp/provision.toml"));
    }
}
