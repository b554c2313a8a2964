//! `plan`: dry-run preview of a deploy.

use crate::cli::CliContext;
use crate::core::pipeline::{Pipeline, RunContext};
use crate::models::target::TargetDescriptor;
use anyhow::Result;
use clap::Args;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Public domain the service is reachable under
    #[arg(long, env = "FILEDROP_DOMAIN")]
    pub domain: Option<String>,

    /// Application source (git URL or local repository path)
    #[arg(long, value_name = "SRC")]
    pub repo: Option<String>,

    /// Omit the sandboxing directives from the base unit
    #[arg(long)]
    pub no_hardening: bool,

    /// Output format (text|json)
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,
}

#[derive(Serialize)]
struct PlannedPhase {
    phase: &'static str,
    action: String,
}

#[derive(Serialize)]
struct Artifact {
    path: String,
    exists: bool,
}

pub fn run(ctx: &CliContext, args: PlanArgs) -> Result<()> {
    let target = TargetDescriptor::resolve(
        args.domain.as_deref(),
        args.repo.as_deref(),
        &ctx.file.target,
    )?;
    let host = ctx.system_host();
    let run_ctx = RunContext {
        target: &target,
        app: &ctx.file.app,
        host: &host,
        hardening: !args.no_hardening,
    };

    let phases: Vec<PlannedPhase> = Pipeline::standard()
        .phases()
        .map(|p| PlannedPhase {
            phase: p.name(),
            action: p.describe(&run_ctx),
        })
        .collect();

    let paths = &host.paths;
    let artifacts: Vec<Artifact> = [
        target.token_file.clone(),
        paths.unit_file(&target),
        paths.overlay_file(&target),
        paths.site_file(&target),
        paths.site_link(&target),
        paths.fullchain(&target.domain),
        paths.renewal_conf(&target.domain),
    ]
    .into_iter()
    .map(|path| Artifact {
        exists: host.store.exists(&path),
        path: path.display().to_string(),
    })
    .collect();

    if args.format == "json" {
        let plan = serde_json::json!({
            "config": ctx.config_path.display().to_string(),
            "target": target,
            "phases": phases,
            "artifacts": artifacts,
        });
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Plan: deploy {} from {} ({})", target.domain, target.source, target.branch);
    println!("  config: {}", ctx.config_path.display());
    println!("  paths: {}", host.paths);
    println!("  unit: {} as {}", target.unit_name(), target.service_user);
    println!("  install: {}", target.install_dir.display());
    println!();
    for (i, p) in phases.iter().enumerate() {
        println!("  {:>2}. {:<12} {}", i + 1, p.phase, p.action);
    }
    println!();
    println!("  artifacts:");
    for a in &artifacts {
        println!("    [{}] {}", if a.exists { "present" } else { "missing" }, a.path);
    }
    println!("\nNo changes made (dry-run).");
    Ok(())
}
