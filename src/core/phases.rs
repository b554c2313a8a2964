//! The provisioning phases, in pipeline order.

use crate::constants;
use crate::core::host::{Direction, Policy};
use crate::core::pipeline::{Outcome, Phase, RunContext};
use crate::core::token::TokenManager;
use crate::core::{proxy_gen, renewal, unit_gen};
use crate::error::{ProvisionError, Result};
use crate::util::fs as host_fs;
use std::path::Path;

/// Write `contents` to `path` unless it already holds exactly that.
/// Returns whether the file changed.
fn converge_file(ctx: &RunContext<'_>, path: &Path, contents: &str, mode: u32) -> Result<bool> {
    let store = ctx.host.store.as_ref();
    let current = store.read(path)?;
    if current.as_deref().map(String::as_str) == Some(contents) && store.mode(path)? == Some(mode) {
        return Ok(false);
    }
    store.replace(path, contents, mode)?;
    Ok(true)
}

fn certificate_present(ctx: &RunContext<'_>) -> bool {
    let paths = &ctx.host.paths;
    let store = ctx.host.store.as_ref();
    let domain = &ctx.target.domain;
    store.exists(&paths.fullchain(domain)) && store.exists(&paths.privkey(domain))
}

pub struct Packages;

impl Phase for Packages {
    fn name(&self) -> &'static str {
        "packages"
    }

    fn describe(&self, _ctx: &RunContext<'_>) -> String {
        format!("install {}", constants::REQUIRED_PACKAGES.join(" "))
    }

    fn converge(&self, ctx: &RunContext<'_>) -> Result<Outcome> {
        let pm = ctx.host.packages.as_ref();
        let missing = pm.missing(constants::REQUIRED_PACKAGES)?;
        if missing.is_empty() {
            return Ok(Outcome::Unchanged("all packages present".into()));
        }
        pm.refresh_index()?;
        pm.install(&missing)?;
        Ok(Outcome::Changed(format!("installed {}", missing.join(" "))))
    }
}

pub struct FirewallRules;

impl FirewallRules {
    fn ports(ctx: &RunContext<'_>) -> [u16; 3] {
        [ctx.target.admin_port, constants::HTTP_PORT, constants::HTTPS_PORT]
    }
}

impl Phase for FirewallRules {
    fn name(&self) -> &'static str {
        "firewall"
    }

    fn describe(&self, ctx: &RunContext<'_>) -> String {
        let ports: Vec<String> = Self::ports(ctx).iter().map(|p| format!("{}/tcp", p)).collect();
        format!("reset firewall, deny inbound, allow {}", ports.join(" "))
    }

    fn converge(&self, ctx: &RunContext<'_>) -> Result<Outcome> {
        let fw = ctx.host.firewall.as_ref();
        fw.reset()?;
        fw.default_policy(Direction::Incoming, Policy::Deny)?;
        fw.default_policy(Direction::Outgoing, Policy::Allow)?;
        for port in Self::ports(ctx) {
            fw.allow_tcp(port)?;
        }
        fw.enable()?;
        Ok(Outcome::Changed(format!(
            "allowing {}/tcp, {}/tcp, {}/tcp",
            ctx.target.admin_port,
            constants::HTTP_PORT,
            constants::HTTPS_PORT
        )))
    }
}

pub struct ServiceAccount;

impl Phase for ServiceAccount {
    fn name(&self) -> &'static str {
        "account"
    }

    fn describe(&self, ctx: &RunContext<'_>) -> String {
        format!(
            "ensure system user {} with home {}",
            ctx.target.service_user,
            ctx.target.install_dir.display()
        )
    }

    fn converge(&self, ctx: &RunContext<'_>) -> Result<Outcome> {
        let accounts = ctx.host.accounts.as_ref();
        let user = &ctx.target.service_user;
        if accounts.exists(user)? {
            return Ok(Outcome::Unchanged(format!("user {} exists", user)));
        }
        accounts.create_system_user(user, &ctx.target.install_dir)?;
        Ok(Outcome::Changed(format!("created user {}", user)))
    }
}

pub struct SourceTree;

impl Phase for SourceTree {
    fn name(&self) -> &'static str {
        "source"
    }

    fn describe(&self, ctx: &RunContext<'_>) -> String {
        format!(
            "replace {} with {} ({})",
            ctx.target.install_dir.display(),
            ctx.target.source,
            ctx.target.branch
        )
    }

    fn converge(&self, ctx: &RunContext<'_>) -> Result<Outcome> {
        let target = ctx.target;
        host_fs::remove_tree(&target.install_dir)?;
        ctx.host
            .source
            .fetch(&target.source, &target.branch, &target.install_dir)?;

        for required in [target.entry_point(), target.manifest()] {
            if !required.is_file() {
                return Err(ProvisionError::config(format!(
                    "{} has no {} after fetch",
                    target.source,
                    required
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| required.display().to_string())
                )));
            }
        }

        ctx.host
            .accounts
            .chown_recursive(&target.service_user, &target.install_dir)?;
        Ok(Outcome::Changed(format!(
            "fetched {} into {}",
            target.source,
            target.install_dir.display()
        )))
    }
}

pub struct Dependencies;

impl Phase for Dependencies {
    fn name(&self) -> &'static str {
        "dependencies"
    }

    fn describe(&self, ctx: &RunContext<'_>) -> String {
        format!(
            "create {} and install {} as {}",
            ctx.target.venv_dir().display(),
            constants::DEPENDENCY_MANIFEST,
            ctx.target.service_user
        )
    }

    fn precondition(&self, ctx: &RunContext<'_>) -> Result<()> {
        if !ctx.target.manifest().is_file() {
            return Err(ProvisionError::config(format!(
                "{} missing",
                ctx.target.manifest().display()
            )));
        }
        Ok(())
    }

    fn converge(&self, ctx: &RunContext<'_>) -> Result<Outcome> {
        let deps = ctx.host.deps.as_ref();
        let user = &ctx.target.service_user;
        let venv = ctx.target.venv_dir();
        deps.create_env(user, &venv)?;
        deps.install(user, &venv, &ctx.target.manifest())?;
        Ok(Outcome::Changed(format!("installed dependencies into {}", venv.display())))
    }
}

pub struct ServiceUnit;

impl Phase for ServiceUnit {
    fn name(&self) -> &'static str {
        "service"
    }

    fn describe(&self, ctx: &RunContext<'_>) -> String {
        format!(
            "write {} and (re)start it on {}",
            ctx.host.paths.unit_file(ctx.target).display(),
            ctx.target.upstream()
        )
    }

    fn converge(&self, ctx: &RunContext<'_>) -> Result<Outcome> {
        let unit_name = ctx.target.unit_name();
        let unit = unit_gen::generate_unit(ctx.target, ctx.app, ctx.hardening);
        let path = ctx.host.paths.unit_file(ctx.target);
        let changed = converge_file(ctx, &path, &unit, constants::UNIT_FILE_MODE)?;

        let supervisor = ctx.host.supervisor.as_ref();
        supervisor.daemon_reload()?;
        supervisor.enable(&unit_name)?;
        supervisor.restart(&unit_name)?;

        Ok(if changed {
            Outcome::Changed(format!("wrote {} and restarted", path.display()))
        } else {
            Outcome::Unchanged(format!("{} up to date, restarted", unit_name))
        })
    }
}

pub struct UploadTokenPhase;

impl Phase for UploadTokenPhase {
    fn name(&self) -> &'static str {
        "token"
    }

    fn describe(&self, ctx: &RunContext<'_>) -> String {
        format!(
            "keep or issue {} and inject it via {}",
            ctx.target.token_file.display(),
            ctx.host.paths.overlay_file(ctx.target).display()
        )
    }

    fn precondition(&self, ctx: &RunContext<'_>) -> Result<()> {
        let unit = ctx.host.paths.unit_file(ctx.target);
        if !ctx.host.store.exists(&unit) {
            return Err(ProvisionError::config(format!(
                "{} must be registered before a token is injected",
                unit.display()
            )));
        }
        Ok(())
    }

    fn converge(&self, ctx: &RunContext<'_>) -> Result<Outcome> {
        let (_, issued) = TokenManager::new(ctx.target, ctx.host).ensure()?;
        Ok(if issued {
            Outcome::Changed(format!("issued {}", ctx.target.token_file.display()))
        } else {
            Outcome::Unchanged(format!("kept {}", ctx.target.token_file.display()))
        })
    }
}

pub struct Readiness;

impl Phase for Readiness {
    fn name(&self) -> &'static str {
        "health"
    }

    fn describe(&self, ctx: &RunContext<'_>) -> String {
        let settings = ctx.host.probe.settings();
        format!(
            "wait up to {} x {}ms for {}{}",
            settings.attempts,
            settings.interval_ms,
            ctx.target.upstream(),
            constants::LIVENESS_PATH
        )
    }

    fn converge(&self, ctx: &RunContext<'_>) -> Result<Outcome> {
        ctx.host.probe.wait(ctx.target, ctx.host.supervisor.as_ref())?;
        Ok(Outcome::Unchanged(format!(
            "{}{} answered",
            ctx.target.upstream(),
            constants::LIVENESS_PATH
        )))
    }
}

pub struct Certificate;

impl Phase for Certificate {
    fn name(&self) -> &'static str {
        "certificate"
    }

    fn describe(&self, ctx: &RunContext<'_>) -> String {
        format!(
            "issue a certificate for {} unless {} exists",
            ctx.target.domain,
            ctx.host.paths.cert_dir(&ctx.target.domain).display()
        )
    }

    fn converge(&self, ctx: &RunContext<'_>) -> Result<Outcome> {
        let domain = &ctx.target.domain;
        if certificate_present(ctx) {
            return Ok(Outcome::Unchanged(format!("certificate for {} present", domain)));
        }

        // The standalone challenge needs port 80 to itself.
        ctx.host.supervisor.stop(ctx.host.proxy.unit())?;
        ctx.host
            .certs
            .issue_standalone(domain, ctx.target.acme_email.as_deref())?;

        if !certificate_present(ctx) {
            return Err(ProvisionError::Infra(anyhow::anyhow!(
                "issuance for {} reported success but {} is incomplete",
                domain,
                ctx.host.paths.cert_dir(domain).display()
            )));
        }
        Ok(Outcome::Changed(format!("issued certificate for {}", domain)))
    }
}

pub struct ReverseProxy;

impl Phase for ReverseProxy {
    fn name(&self) -> &'static str {
        "proxy"
    }

    fn describe(&self, ctx: &RunContext<'_>) -> String {
        format!(
            "write {}: redirect :80, terminate TLS on :443 for {}",
            ctx.host.paths.site_file(ctx.target).display(),
            ctx.target.domain
        )
    }

    fn precondition(&self, ctx: &RunContext<'_>) -> Result<()> {
        if !certificate_present(ctx) {
            return Err(ProvisionError::config(format!(
                "no certificate for {}; TLS listener cannot start",
                ctx.target.domain
            )));
        }
        Ok(())
    }

    fn converge(&self, ctx: &RunContext<'_>) -> Result<Outcome> {
        let paths = &ctx.host.paths;
        let store = ctx.host.store.as_ref();
        let site_path = paths.site_file(ctx.target);
        let site = proxy_gen::generate_site(ctx.target, ctx.app, paths);

        let site_link = paths.site_link(ctx.target);
        let mut changed = converge_file(ctx, &site_path, &site, constants::SITE_FILE_MODE)?;
        changed |= !store.exists(&site_link);
        store.link(&site_path, &site_link)?;
        changed |= store.remove(&paths.default_site_link())?;

        ctx.host.proxy.validate_config()?;

        let supervisor = ctx.host.supervisor.as_ref();
        let unit = ctx.host.proxy.unit();
        supervisor.enable(unit)?;
        supervisor.restart(unit)?;

        Ok(if changed {
            Outcome::Changed(format!("wrote {} and restarted {}", site_path.display(), unit))
        } else {
            Outcome::Unchanged(format!("{} up to date, restarted {}", site_path.display(), unit))
        })
    }
}

pub struct RenewalMethod;

impl Phase for RenewalMethod {
    fn name(&self) -> &'static str {
        "renewal"
    }

    fn describe(&self, ctx: &RunContext<'_>) -> String {
        format!(
            "switch {} to the nginx authenticator and dry-run a renewal",
            ctx.host.paths.renewal_conf(&ctx.target.domain).display()
        )
    }

    fn precondition(&self, ctx: &RunContext<'_>) -> Result<()> {
        if !certificate_present(ctx) {
            return Err(ProvisionError::config(format!(
                "no certificate for {} to reconcile",
                ctx.target.domain
            )));
        }
        Ok(())
    }

    fn converge(&self, ctx: &RunContext<'_>) -> Result<Outcome> {
        let domain = &ctx.target.domain;
        let path = ctx.host.paths.renewal_conf(domain);
        let store = ctx.host.store.as_ref();
        let Some(current) = store.read(&path)? else {
            return Ok(Outcome::Unchanged(format!(
                "{} absent; certificate is not managed by certbot",
                path.display()
            )));
        };

        let rewritten = renewal::reconcile(&current)?;
        let changed = rewritten.is_some();
        if let Some(conf) = rewritten {
            let mode = store.mode(&path)?.unwrap_or(0o644);
            store.replace(&path, &conf, mode)?;
        }
        ctx.host.certs.renewal_dry_run(domain)?;

        Ok(if changed {
            Outcome::Changed(format!("{} renews through nginx", domain))
        } else {
            Outcome::Unchanged(format!("{} already renews through nginx", domain))
        })
    }
}
