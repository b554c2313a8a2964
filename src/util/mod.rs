//! Host tooling adapters and filesystem helpers.

pub mod accounts;
pub mod apt;
pub mod certbot;
pub mod exec;
pub mod fs;
pub mod git;
pub mod nginx;
pub mod path;
pub mod privilege;
pub mod systemd;
pub mod ufw;
pub mod venv;
