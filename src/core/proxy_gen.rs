//! nginx site generation.

use crate::constants;
use crate::core::paths::HostPaths;
use crate::models::config::AppSettings;
use crate::models::target::TargetDescriptor;

/// Render the complete site for `target` (pure function).
///
/// Port 80 only redirects; port 443 terminates TLS and forwards everything to
/// the loopback service, including upgrade requests.
pub fn generate_site(target: &TargetDescriptor, app: &AppSettings, paths: &HostPaths) -> String {
    let domain = &target.domain;
    let mut out = String::new();
    out.push_str("# Managed by filedrop-provision. Rewritten on every deploy.\n");

    out.push_str("server {\n");
    out.push_str(&format!("    listen {};\n", constants::HTTP_PORT));
    out.push_str(&format!("    listen [::]:{};\n", constants::HTTP_PORT));
    out.push_str(&format!("    server_name {};\n", domain));
    out.push('\n');
    out.push_str("    location / {\n");
    out.push_str("        return 301 https://$host$request_uri;\n");
    out.push_str("    }\n");
    out.push_str("}\n");
    out.push('\n');

    out.push_str("server {\n");
    out.push_str(&format!("    listen {} ssl;\n", constants::HTTPS_PORT));
    out.push_str(&format!("    listen [::]:{} ssl;\n", constants::HTTPS_PORT));
    out.push_str(&format!("    server_name {};\n", domain));
    out.push('\n');
    out.push_str(&format!(
        "    ssl_certificate {};\n",
        paths.fullchain(domain).display()
    ));
    out.push_str(&format!(
        "    ssl_certificate_key {};\n",
        paths.privkey(domain).display()
    ));
    out.push_str("    ssl_protocols TLSv1.2 TLSv1.3;\n");
    out.push_str("    ssl_prefer_server_ciphers off;\n");
    out.push('\n');
    out.push_str(&format!(
        "    client_max_body_size {};\n",
        app.max_upload_bytes
    ));
    out.push('\n');
    out.push_str("    location / {\n");
    out.push_str(&format!("        proxy_pass http://{};\n", target.upstream()));
    out.push_str("        proxy_http_version 1.1;\n");
    out.push_str("        proxy_set_header Host $host;\n");
    out.push_str("        proxy_set_header X-Real-IP $remote_addr;\n");
    out.push_str("        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n");
    out.push_str("        proxy_set_header X-Forwarded-Proto $scheme;\n");
    out.push_str("        proxy_set_header Upgrade $http_upgrade;\n");
    out.push_str("        proxy_set_header Connection \"upgrade\";\n");
    out.push_str("        proxy_request_buffering off;\n");
    out.push_str("        proxy_read_timeout 300s;\n");
    out.push_str("        proxy_send_timeout 300s;\n");
    out.push_str("    }\n");
    out.push_str("}\n");
    out
}
