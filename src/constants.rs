//! Centralized constants for paths, permissions, ports, and limits.

/// Default location of the provisioning config file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/filedrop/provision.toml";

/// Default service (and systemd unit / nginx site) name.
pub const DEFAULT_SERVICE_NAME: &str = "filedrop";

/// Default install directory; also the service account's home.
pub const DEFAULT_INSTALL_DIR: &str = "/opt/filedrop";

/// Default service account.
pub const DEFAULT_SERVICE_USER: &str = "filedrop";

/// Default loopback port the application listens on.
pub const DEFAULT_PORT: u16 = 8000;

/// Default path of the persisted upload token.
pub const DEFAULT_TOKEN_FILE: &str = "/etc/filedrop/upload_token";

/// Default application source repository.
pub const DEFAULT_SOURCE: &str = "https://github.com/filedrop/filedrop-server.git";

/// Default branch checked out from the source repository.
pub const DEFAULT_BRANCH: &str = "main";

/// Default administrative (SSH) port kept open by the firewall.
pub const DEFAULT_ADMIN_PORT: u16 = 22;

/// Plaintext web port.
pub const HTTP_PORT: u16 = 80;

/// Encrypted web port.
pub const HTTPS_PORT: u16 = 443;

/// Loopback address the application binds to.
pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Environment variable the application reads its upload token from.
pub const TOKEN_ENV_VAR: &str = "UPLOAD_TOKEN";

/// Liveness path the application must answer with 2xx.
pub const LIVENESS_PATH: &str = "/health";

/// Application entry point that must exist after fetch.
pub const ENTRY_POINT: &str = "main.py";

/// Dependency manifest that must exist after fetch.
pub const DEPENDENCY_MANIFEST: &str = "requirements.txt";

/// ASGI target passed to the application server.
pub const APP_MODULE: &str = "main:app";

/// Name of the isolated runtime environment inside the install directory.
pub const VENV_DIR: &str = ".venv";

/// Random bytes in an upload token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Hex characters in a serialized upload token.
pub const TOKEN_HEX_LEN: usize = TOKEN_BYTES * 2;

/// Packages the host must carry before anything else runs.
pub const REQUIRED_PACKAGES: &[&str] = &[
    "git",
    "curl",
    "systemd",
    "nginx",
    "certbot",
    "python3-certbot-nginx",
    "python3",
    "python3-venv",
    "python3-pip",
    "ufw",
];

/// Permission mode for the token file.
pub const TOKEN_FILE_MODE: u32 = 0o600;

/// Permission mode for the directory holding the token file.
pub const TOKEN_DIR_MODE: u32 = 0o700;

/// Permission mode for the environment overlay (it carries the token).
pub const OVERLAY_FILE_MODE: u32 = 0o600;

/// Permission mode for the base unit file.
pub const UNIT_FILE_MODE: u32 = 0o644;

/// Permission mode for the proxy site file.
pub const SITE_FILE_MODE: u32 = 0o644;

/// Permission mode for the audit log.
pub const AUDIT_LOG_MODE: u32 = 0o640;
pub const STATE_DIR_MODE: u32 = 0o750;

/// Seconds systemd waits before restarting the application.
pub const RESTART_DELAY_SECS: u32 = 3;

/// Default number of port probes before giving up.
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 30;

/// Default delay between port probes.
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 1000;

/// Default timeout for the liveness request.
pub const DEFAULT_PROBE_REQUEST_TIMEOUT_MS: u64 = 5000;

/// Journal lines included in readiness diagnostics.
pub const DIAGNOSTIC_LOG_LINES: u32 = 50;

/// Default upload size limit (60 MiB), enforced by both proxy and app.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 60 * 1024 * 1024;

/// Default lifetime of one-shot download tokens.
pub const DEFAULT_DOWNLOAD_TOKEN_TTL_SECS: u64 = 180;

/// Default lifetime of uploaded files.
pub const DEFAULT_TASK_TTL_SECS: u64 = 3600;

/// Default directory the application stores uploads in.
pub const DEFAULT_UPLOAD_DIR: &str = "/tmp";

/// Name of the reverse proxy's systemd unit.
pub const PROXY_UNIT: &str = "nginx";

/// Directories the install directory may never be (the fetcher deletes it).
pub const PROTECTED_DIRS: &[&str] = &[
    "/", "/bin", "/boot", "/dev", "/etc", "/home", "/lib", "/lib64", "/opt", "/proc", "/root",
    "/run", "/sbin", "/srv", "/sys", "/tmp", "/usr", "/var",
];
