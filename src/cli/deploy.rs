//! `deploy`: run the provisioning pipeline end to end.

use crate::cli::CliContext;
use crate::constants;
use crate::core::audit_log::AuditResult;
use crate::core::pipeline::{Pipeline, RunContext, StepReport};
use crate::error::PipelineError;
use crate::models::target::TargetDescriptor;
use anyhow::{bail, Result};
use clap::Args;
use dialoguer::Confirm;
use std::io::IsTerminal;

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Public domain the service is reachable under
    #[arg(long, env = "FILEDROP_DOMAIN")]
    pub domain: Option<String>,

    /// Application source (git URL or local repository path)
    #[arg(long, value_name = "SRC")]
    pub repo: Option<String>,

    /// Skip confirmation prompts
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Omit the sandboxing directives from the base unit
    #[arg(long)]
    pub no_hardening: bool,
}

pub fn run(ctx: &CliContext, args: DeployArgs) -> Result<()> {
    let target = TargetDescriptor::resolve(
        args.domain.as_deref(),
        args.repo.as_deref(),
        &ctx.file.target,
    )?;
    confirm_firewall(ctx, &target, args.yes)?;

    let _lock = ctx.run_lock()?;
    let host = ctx.system_host();
    let run_ctx = RunContext {
        target: &target,
        app: &ctx.file.app,
        host: &host,
        hardening: !args.no_hardening,
    };

    println!("Deploy: {} ({})", target.domain, target.unit_name());
    tracing::info!(domain = %target.domain, source = %target.source, "deploy started");

    let result = Pipeline::standard().run(&run_ctx, |step| report_step(ctx, step));
    match result {
        Ok(steps) => {
            let changed = steps.iter().filter(|s| s.outcome.changed()).count();
            ctx.audit(
                "deploy",
                &target.domain,
                AuditResult::ok(format!("{} phases, {} changed", steps.len(), changed)),
            );
            println!();
            println!(
                "Deploy summary: {} phases, {} changed, {} already converged",
                steps.len(),
                changed,
                steps.len() - changed
            );
            println!("Service: https://{}/", target.domain);
            println!("Upload token: sudo filedrop-provision token print");
            Ok(())
        }
        Err(err) => {
            report_failure(ctx, &target, &err);
            bail!("deploy stopped at phase '{}'", err.phase)
        }
    }
}

fn report_step(ctx: &CliContext, step: &StepReport) {
    let marker = if step.outcome.changed() { "PASS" } else { "SKIP" };
    println!("  [{}] {:<12} {}", marker, step.phase, step.outcome.detail());
    ctx.audit("deploy.phase", step.phase, AuditResult::ok(step.outcome.detail()));
}

fn report_failure(ctx: &CliContext, target: &TargetDescriptor, err: &PipelineError) {
    println!("  [FAIL] {:<12} {}", err.phase, err.source);
    if let Some(diagnostics) = err.source.diagnostics() {
        println!();
        println!("{}", diagnostics);
    }
    ctx.audit("deploy.phase", err.phase, AuditResult::failed(&err.source));
    ctx.audit(
        "deploy",
        &target.domain,
        AuditResult::failed(format!("stopped at {}", err.phase)),
    );
}

/// Resetting the firewall with a non-standard admin port can lock the
/// operator out; ask first when someone is at the terminal.
fn confirm_firewall(ctx: &CliContext, target: &TargetDescriptor, yes: bool) -> Result<()> {
    if target.admin_port == constants::DEFAULT_ADMIN_PORT
        || yes
        || ctx.non_interactive
        || !std::io::stdin().is_terminal()
    {
        return Ok(());
    }
    let proceed = Confirm::new()
        .with_prompt(format!(
            "The firewall will be reset to allow only {}/tcp, 80/tcp and 443/tcp. Continue?",
            target.admin_port
        ))
        .default(false)
        .interact()?;
    if !proceed {
        bail!("aborted by operator before any change");
    }
    Ok(())
}
