//! `audit`: show or verify the provisioning audit trail.

use crate::cli::CliContext;
use crate::core::audit_log;
use anyhow::{bail, Result};
use chrono::{DateTime, Local};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Maximum number of entries to display
    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Check the hash chain instead of listing entries
    #[arg(long)]
    pub verify: bool,
}

pub fn run(ctx: &CliContext, args: AuditArgs) -> Result<()> {
    if args.verify {
        return run_verify(ctx);
    }

    let entries = audit_log::read_log(&ctx.paths, Some(args.limit))?;
    if entries.is_empty() {
        println!("No audit entries found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(
        ["Timestamp", "Action", "Subject", "Actor", "Result"]
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );
    for entry in &entries {
        let local: DateTime<Local> = entry.timestamp.into();
        let result = match (&entry.result.success, &entry.result.detail) {
            (true, _) => "OK".to_string(),
            (false, Some(detail)) => format!("FAIL: {}", detail),
            (false, None) => "FAIL".to_string(),
        };
        table.add_row(vec![
            local.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.action.clone(),
            entry.subject.clone(),
            entry.actor.clone(),
            result,
        ]);
    }

    println!("{}", table);
    println!("\n{} entries shown.", entries.len());
    Ok(())
}

fn run_verify(ctx: &CliContext) -> Result<()> {
    let (total, errors) = audit_log::verify_chain(&ctx.paths)?;
    if total == 0 && errors.is_empty() {
        println!("No audit entries to verify.");
        return Ok(());
    }
    for err in &errors {
        println!("  [FAIL] {}", err);
    }
    println!();
    if !errors.is_empty() {
        bail!("audit chain: {} entries, {} errors", total, errors.len());
    }
    println!("Audit chain: {} entries verified, 0 errors", total);
    Ok(())
}
