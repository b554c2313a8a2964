//! Single-host provisioning for the filedrop upload service.
//!
//! Converges a fresh Debian-family host into one that serves the application
//! over HTTPS: packages, firewall, service account, source, dependencies,
//! systemd unit, upload token, readiness, certificate, nginx and renewal.
//!
//! ## Modules
//! - `cli`: Command-line handlers and the wiring of real adapters
//! - `core`: Phases, pipeline driver, generators, token lifecycle
//! - `models`: Target descriptor, config file, upload token
//! - `util`: Host tool adapters (apt, ufw, systemd, certbot, nginx, ...)

pub mod cli;
pub mod constants;
pub mod core;
pub mod error;
pub mod models;
pub mod util;
