//! Renewal configuration reconciliation.
//!
//! Certificates are first issued in standalone mode, which needs port 80 to
//! itself. Once nginx is serving the domain, renewals must go through nginx
//! instead, or every renewal would have to stop the proxy.

use anyhow::{bail, Result};

const SECTION: &str = "[renewalparams]";
const PROXY_PLUGIN: &str = "nginx";

/// Rewrite a certbot renewal file to renew through nginx.
///
/// Returns `None` when the file already renews through nginx.
pub fn reconcile(conf: &str) -> Result<Option<String>> {
    let mut out: Vec<String> = Vec::new();
    let mut in_section = false;
    let mut saw_section = false;
    let mut saw_authenticator = false;
    let mut saw_installer = false;
    let mut changed = false;

    for line in conf.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            if in_section {
                changed |= close_section(&mut out, saw_authenticator, saw_installer);
            }
            in_section = trimmed == SECTION;
            saw_section |= in_section;
            out.push(line.to_string());
            continue;
        }
        if in_section {
            match key_of(trimmed) {
                Some("authenticator") => {
                    saw_authenticator = true;
                    changed |= push_setting(&mut out, line, "authenticator");
                    continue;
                }
                Some("installer") => {
                    saw_installer = true;
                    changed |= push_setting(&mut out, line, "installer");
                    continue;
                }
                _ => {}
            }
        }
        out.push(line.to_string());
    }
    if in_section {
        changed |= close_section(&mut out, saw_authenticator, saw_installer);
    }

    if !saw_section {
        bail!("renewal config has no {} section", SECTION);
    }
    if !changed {
        return Ok(None);
    }
    let mut rendered = out.join("\n");
    rendered.push('\n');
    Ok(Some(rendered))
}

fn key_of(line: &str) -> Option<&str> {
    line.split_once('=').map(|(k, _)| k.trim())
}

fn push_setting(out: &mut Vec<String>, original: &str, key: &str) -> bool {
    let desired = format!("{} = {}", key, PROXY_PLUGIN);
    let current = original.split_once('=').map(|(_, v)| v.trim());
    out.push(desired);
    current != Some(PROXY_PLUGIN)
}

/// Append settings the section lacked, before any trailing blank lines.
fn close_section(out: &mut Vec<String>, saw_authenticator: bool, saw_installer: bool) -> bool {
    let mut missing = Vec::new();
    if !saw_authenticator {
        missing.push(format!("authenticator = {}", PROXY_PLUGIN));
    }
    if !saw_installer {
        missing.push(format!("installer = {}", PROXY_PLUGIN));
    }
    if missing.is_empty() {
        return false;
    }
    let mut at = out.len();
    while at > 0 && out[at - 1].trim().is_empty() {
        at -= 1;
    }
    for (offset, line) in missing.into_iter().enumerate() {
        out.insert(at + offset, line);
    }
    true
}
