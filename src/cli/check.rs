//! `check`: read-only inspection of a provisioned host.

use crate::cli::CliContext;
use crate::constants;
use crate::core::audit_log;
use crate::core::host::Host;
use crate::core::unit_gen;
use crate::models::target::TargetDescriptor;
use crate::models::token::UploadToken;
use crate::util::exec;
use anyhow::{bail, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, Table};
use serde::Serialize;

/// Programs the real adapters shell out to.
const TOOLS: &[&str] = &[
    "apt-get", "ufw", "git", "python3", "systemctl", "journalctl", "nginx", "certbot",
];

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Domain whose certificate and proxy site to inspect
    #[arg(long, env = "FILEDROP_DOMAIN")]
    pub domain: Option<String>,

    /// Output format (table|json)
    #[arg(long, default_value = "table", value_parser = ["table", "json"])]
    pub format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckRow {
    pub check: &'static str,
    pub status: Status,
    pub detail: String,
}

impl CheckRow {
    fn new(check: &'static str, status: Status, detail: impl Into<String>) -> Self {
        Self {
            check,
            status,
            detail: detail.into(),
        }
    }
}

pub fn run(ctx: &CliContext, args: CheckArgs) -> Result<()> {
    let mut section = ctx.file.target.clone();
    if args.domain.is_some() {
        section.domain = args.domain.clone();
    }
    let target = if section.domain.is_some() {
        TargetDescriptor::resolve(None, None, &section)?
    } else {
        TargetDescriptor::resolve_local(&section)?
    };
    let host = ctx.system_host();

    let mut rows = inspect(&target, &host);
    let missing: Vec<&str> = TOOLS.iter().copied().filter(|t| !exec::available(t)).collect();
    rows.push(if missing.is_empty() {
        CheckRow::new("host tools", Status::Pass, TOOLS.join(" "))
    } else {
        CheckRow::new(
            "host tools",
            Status::Warn,
            format!("not found: {} (deploy installs them)", missing.join(" ")),
        )
    });
    rows.push(match audit_log::verify_chain(&ctx.paths) {
        Ok((n, errors)) if errors.is_empty() => {
            CheckRow::new("audit chain", Status::Pass, format!("{} entries intact", n))
        }
        Ok((n, errors)) => CheckRow::new(
            "audit chain",
            Status::Fail,
            format!("{} entries, {} errors (run: audit --verify)", n, errors.len()),
        ),
        Err(e) => CheckRow::new("audit chain", Status::Warn, format!("unreadable: {}", e)),
    });

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_table(&rows);
    }

    let failed = rows.iter().filter(|r| r.status == Status::Fail).count();
    if failed > 0 {
        bail!("{} check(s) failed", failed);
    }
    Ok(())
}

/// Inspect the artifacts a deploy leaves behind. Reads only.
pub fn inspect(target: &TargetDescriptor, host: &Host) -> Vec<CheckRow> {
    let store = host.store.as_ref();
    let paths = &host.paths;
    let mut rows = Vec::new();

    let token = match store.read(&target.token_file) {
        Ok(None) => {
            rows.push(CheckRow::new(
                "token file",
                Status::Fail,
                format!("{} missing", target.token_file.display()),
            ));
            None
        }
        Ok(Some(raw)) => match UploadToken::parse(&raw) {
            Ok(token) => {
                let mode = store.mode(&target.token_file).ok().flatten();
                if mode == Some(constants::TOKEN_FILE_MODE) {
                    rows.push(CheckRow::new("token file", Status::Pass, "well-formed, mode 0600"));
                } else {
                    rows.push(CheckRow::new(
                        "token file",
                        Status::Fail,
                        format!(
                            "mode {} (expected {:04o})",
                            mode.map(|m| format!("{:04o}", m)).unwrap_or_else(|| "?".into()),
                            constants::TOKEN_FILE_MODE
                        ),
                    ));
                }
                Some(token)
            }
            Err(reason) => {
                rows.push(CheckRow::new("token file", Status::Fail, reason));
                None
            }
        },
        Err(e) => {
            rows.push(unreadable("token file", &e));
            None
        }
    };

    rows.push(presence(store.exists(&paths.unit_file(target)), "base unit", &paths.unit_file(target)));

    let overlay_path = paths.overlay_file(target);
    rows.push(match (store.read(&overlay_path), &token) {
        (Ok(Some(current)), Some(token)) if *current == *unit_gen::generate_overlay(token) => {
            CheckRow::new("token overlay", Status::Pass, "carries the persisted token")
        }
        (Ok(Some(_)), Some(_)) => CheckRow::new(
            "token overlay",
            Status::Fail,
            "does not match the token file (run: token rotate)",
        ),
        (Ok(Some(_)), None) => CheckRow::new("token overlay", Status::Warn, "present, token file unusable"),
        (Ok(None), _) => CheckRow::new(
            "token overlay",
            Status::Fail,
            format!("{} missing", overlay_path.display()),
        ),
        (Err(e), _) => unreadable("token overlay", &e),
    });

    rows.push(match host.supervisor.is_active(&target.unit_name()) {
        Ok(true) => CheckRow::new("service", Status::Pass, format!("{} active", target.unit_name())),
        Ok(false) => CheckRow::new("service", Status::Warn, format!("{} not active", target.unit_name())),
        Err(e) => CheckRow::new("service", Status::Warn, format!("state unknown: {}", e)),
    });

    if target.domain.is_empty() {
        rows.push(CheckRow::new(
            "certificate",
            Status::Warn,
            "no domain configured (pass --domain)",
        ));
        return rows;
    }

    let fullchain = paths.fullchain(&target.domain);
    let cert = store.exists(&fullchain) && store.exists(&paths.privkey(&target.domain));
    rows.push(presence(cert, "certificate", &paths.cert_dir(&target.domain)));
    rows.push(presence(store.exists(&paths.site_file(target)), "proxy site", &paths.site_file(target)));
    rows.push(presence(
        store.exists(&paths.site_link(target)),
        "proxy enabled",
        &paths.site_link(target),
    ));
    rows
}

/// Root-only artifacts are expected to be unreadable for other users.
fn unreadable(check: &'static str, err: &anyhow::Error) -> CheckRow {
    let denied = err.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::PermissionDenied)
    });
    if denied {
        CheckRow::new(check, Status::Warn, "permission denied (run as root to inspect)")
    } else {
        CheckRow::new(check, Status::Fail, format!("unreadable: {:#}", err))
    }
}

fn presence(exists: bool, check: &'static str, path: &std::path::Path) -> CheckRow {
    if exists {
        CheckRow::new(check, Status::Pass, path.display().to_string())
    } else {
        CheckRow::new(check, Status::Fail, format!("{} missing", path.display()))
    }
}

fn print_table(rows: &[CheckRow]) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Check").add_attribute(Attribute::Bold),
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new("Detail").add_attribute(Attribute::Bold),
    ]);
    for row in rows {
        let (label, color) = match row.status {
            Status::Pass => ("PASS", Color::Green),
            Status::Warn => ("WARN", Color::Yellow),
            Status::Fail => ("FAIL", Color::Red),
        };
        table.add_row(vec![
            Cell::new(row.check),
            Cell::new(label).fg(color),
            Cell::new(&row.detail),
        ]);
    }
    println!("{}", table);
}
