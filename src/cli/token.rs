//! `token print` / `token rotate`.

use crate::cli::CliContext;
use crate::core::audit_log::AuditResult;
use crate::core::token::TokenManager;
use crate::models::target::TargetDescriptor;
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    /// Print the active upload token
    Print,
    /// Issue a new upload token and restart the service with it
    Rotate(RotateArgs),
}

#[derive(Args, Debug)]
pub struct RotateArgs {
    /// Return right after the restart instead of waiting for /health
    #[arg(long)]
    pub no_wait: bool,
}

pub fn run(ctx: &CliContext, cmd: TokenCommand) -> Result<()> {
    let target = TargetDescriptor::resolve_local(&ctx.file.target)?;
    match cmd {
        TokenCommand::Print => run_print(ctx, &target),
        TokenCommand::Rotate(args) => run_rotate(ctx, &target, args),
    }
}

fn run_print(ctx: &CliContext, target: &TargetDescriptor) -> Result<()> {
    let host = ctx.system_host();
    let result = TokenManager::new(target, &host).print();
    match &result {
        Ok(_) => ctx.audit("token.print", &target.unit_name(), AuditResult::ok("printed")),
        Err(e) => ctx.audit("token.print", &target.unit_name(), AuditResult::failed(e)),
    }
    println!("{}", result?.as_str());
    Ok(())
}

fn run_rotate(ctx: &CliContext, target: &TargetDescriptor, args: RotateArgs) -> Result<()> {
    let _lock = ctx.run_lock()?;
    let host = ctx.system_host();
    let unit = target.unit_name();

    let token = match TokenManager::new(target, &host).rotate() {
        Ok(token) => token,
        Err(e) => {
            ctx.audit("token.rotate", &unit, AuditResult::failed(&e));
            return Err(e.into());
        }
    };

    if !args.no_wait {
        if let Err(e) = host.probe.wait(target, host.supervisor.as_ref()) {
            ctx.audit("token.rotate", &unit, AuditResult::failed(&e));
            if let Some(diagnostics) = e.diagnostics() {
                eprintln!("{}", diagnostics);
            }
            // The new token is persisted and active in the unit; surface it anyway.
            println!("{}", token.as_str());
            return Err(e.into());
        }
    }

    ctx.audit(
        "token.rotate",
        &unit,
        AuditResult::ok(if args.no_wait { "rotated" } else { "rotated, service live" }),
    );
    println!("{}", token.as_str());
    Ok(())
}
