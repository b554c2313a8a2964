//! systemd unit and environment-overlay generation.
//!
//! The base unit never carries the upload token. The token lives only in
//! the overlay drop-in, so rotation rewrites the overlay and nothing else.

use crate::constants;
use crate::models::config::AppSettings;
use crate::models::target::TargetDescriptor;
use crate::models::token::UploadToken;
use zeroize::Zeroizing;

/// Render the base unit for the application (pure function).
pub fn generate_unit(target: &TargetDescriptor, app: &AppSettings, hardening: bool) -> String {
    let venv_bin = target.venv_dir().join("bin");
    let mut out = String::new();
    out.push_str("# Managed by filedrop-provision. Rewritten on every deploy.\n");
    out.push_str("[Unit]\n");
    out.push_str(&format!("Description={} upload service\n", target.service_name));
    out.push_str("After=network-online.target\n");
    out.push_str("Wants=network-online.target\n");
    out.push('\n');

    out.push_str("[Service]\n");
    out.push_str("Type=simple\n");
    out.push_str(&format!("User={}\n", target.service_user));
    out.push_str(&format!("Group={}\n", target.service_user));
    out.push_str(&format!(
        "WorkingDirectory={}\n",
        target.install_dir.display()
    ));
    for (key, value) in app.environment() {
        out.push_str(&format!("Environment={}\n", quote_env(key, &value)));
    }
    out.push_str(&format!(
        "ExecStart={} {} --host {} --port {}\n",
        venv_bin.join("uvicorn").display(),
        constants::APP_MODULE,
        constants::LOOPBACK_HOST,
        target.port
    ));
    out.push_str("Restart=always\n");
    out.push_str(&format!("RestartSec={}\n", constants::RESTART_DELAY_SECS));

    if hardening {
        out.push_str("NoNewPrivileges=yes\n");
        out.push_str("ProtectSystem=full\n");
        out.push_str("PrivateTmp=yes\n");
        out.push_str("ProtectKernelTunables=yes\n");
        out.push_str("ProtectKernelModules=yes\n");
        out.push_str("ProtectControlGroups=yes\n");
        out.push_str("LockPersonality=yes\n");
    }

    out.push('\n');
    out.push_str("[Install]\n");
    out.push_str("WantedBy=multi-user.target\n");
    out
}

/// Render the overlay drop-in injecting the upload token.
pub fn generate_overlay(token: &UploadToken) -> Zeroizing<String> {
    let mut out = Zeroizing::new(String::new());
    out.push_str("# Managed by filedrop-provision. Replaced on every token rotation.\n");
    out.push_str("[Service]\n");
    out.push_str("Environment=");
    out.push_str(&quote_env(constants::TOKEN_ENV_VAR, token.as_str()));
    out.push('\n');
    out
}

/// Quote a `KEY=value` pair for an `Environment=` line.
fn quote_env(key: &str, value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('%', "%%");
    format!("\"{}={}\"", key, escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::TargetSection;

    fn target() -> TargetDescriptor {
        TargetDescriptor::resolve(Some("example.com"), None, &TargetSection::default()).unwrap()
    }

    #[test]
    fn test_unit_binds_loopback_as_service_user() {
        let unit = generate_unit(&target(), &AppSettings::default(), false);
        assert!(unit.contains("User=filedrop\n"));
        assert!(unit.contains("WorkingDirectory=/opt/filedrop\n"));
        assert!(unit.contains(
            "ExecStart=/opt/filedrop/.venv/bin/uvicorn main:app --host 127.0.0.1 --port 8000\n"
        ));
        assert!(unit.contains("Restart=always\n"));
        assert!(unit.contains("RestartSec=3\n"));
        assert!(unit.contains("WantedBy=multi-user.target"));
    }

    #[test]
    fn test_unit_never_mentions_token() {
        let unit = generate_unit(&target(), &AppSettings::default(), true);
        assert!(!unit.contains("UPLOAD_TOKEN"));
    }

    #[test]
    fn test_unit_exports_app_settings() {
        let app = AppSettings {
            upload_dir: "/srv/uploads".into(),
            max_upload_bytes: 1024,
            ..Default::default()
        };
        let unit = generate_unit(&target(), &app, false);
        assert!(unit.contains("Environment=\"UPLOAD_DIR=/srv/uploads\"\n"));
        assert!(unit.contains("Environment=\"MAX_UPLOAD_BYTES=1024\"\n"));
    }

    #[test]
    fn test_unit_hardening_toggle() {
        let plain = generate_unit(&target(), &AppSettings::default(), false);
        let hardened = generate_unit(&target(), &AppSettings::default(), true);
        assert!(!plain.contains("NoNewPrivileges"));
        assert!(hardened.contains("NoNewPrivileges=yes"));
        assert!(hardened.contains("PrivateTmp=yes"));
    }

    #[test]
    fn test_unit_is_deterministic() {
        let a = generate_unit(&target(), &AppSettings::default(), true);
        let b = generate_unit(&target(), &AppSettings::default(), true);
        assert_eq!(a, b);
    }

    #[test]
    fn test_overlay_carries_token() {
        let token = UploadToken::generate();
        let overlay = generate_overlay(&token);
        assert!(overlay.starts_with("# Managed"));
        assert!(overlay.contains("[Service]\n"));
        assert!(overlay.contains(&format!("Environment=\"UPLOAD_TOKEN={}\"\n", token.as_str())));
    }

    #[test]
    fn test_quote_env_escapes() {
        assert_eq!(quote_env("K", "a b"), "\"K=a b\"");
        assert_eq!(quote_env("K", "50%"), "\"K=50%%\"");
        assert_eq!(quote_env("K", "say \"hi\""), "\"K=say \\\"hi\\\"\"");
    }
}
