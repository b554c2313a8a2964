//! Ordered, fail-fast phase driver.
//!
//! A run is a fixed sequence of phases. Each phase converges one concern
//! towards the state the target describes; running it again on a converged
//! host changes nothing. The driver checks each phase's precondition, runs
//! it, and stops at the first failure without undoing earlier phases.

use crate::core::host::Host;
use crate::core::phases;
use crate::error::{PipelineError, Result};
use crate::models::config::AppSettings;
use crate::models::target::TargetDescriptor;
use serde::Serialize;

/// Inputs shared by every phase of a run.
pub struct RunContext<'a> {
    pub target: &'a TargetDescriptor,
    pub app: &'a AppSettings,
    pub host: &'a Host,
    pub hardening: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// The phase modified host state.
    Changed(String),
    /// The host was already converged; nothing was done.
    Unchanged(String),
}

impl Outcome {
    pub fn detail(&self) -> &str {
        match self {
            Outcome::Changed(d) | Outcome::Unchanged(d) => d,
        }
    }

    pub fn changed(&self) -> bool {
        matches!(self, Outcome::Changed(_))
    }
}

pub trait Phase {
    fn name(&self) -> &'static str;

    /// One line for `plan` output.
    fn describe(&self, ctx: &RunContext<'_>) -> String;

    /// Checked right before `converge`; failing it aborts the run.
    fn precondition(&self, _ctx: &RunContext<'_>) -> Result<()> {
        Ok(())
    }

    fn converge(&self, ctx: &RunContext<'_>) -> Result<Outcome>;
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub phase: &'static str,
    pub outcome: Outcome,
}

pub struct Pipeline {
    phases: Vec<Box<dyn Phase>>,
}

impl Pipeline {
    pub fn new(phases: Vec<Box<dyn Phase>>) -> Self {
        Self { phases }
    }

    /// The full provisioning sequence, in dependency order.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(phases::Packages),
            Box::new(phases::FirewallRules),
            Box::new(phases::ServiceAccount),
            Box::new(phases::SourceTree),
            Box::new(phases::Dependencies),
            Box::new(phases::ServiceUnit),
            Box::new(phases::UploadTokenPhase),
            Box::new(phases::Readiness),
            Box::new(phases::Certificate),
            Box::new(phases::ReverseProxy),
            Box::new(phases::RenewalMethod),
        ])
    }

    pub fn phases(&self) -> impl Iterator<Item = &dyn Phase> {
        self.phases.iter().map(|p| p.as_ref())
    }

    /// Run every phase in order, reporting each completed step to `observe`.
    pub fn run(
        &self,
        ctx: &RunContext<'_>,
        mut observe: impl FnMut(&StepReport),
    ) -> std::result::Result<Vec<StepReport>, PipelineError> {
        let mut steps = Vec::with_capacity(self.phases.len());
        for phase in &self.phases {
            let name = phase.name();
            let span = tracing::info_span!("phase", phase = name);
            let _enter = span.enter();

            let outcome = phase
                .precondition(ctx)
                .and_then(|_| phase.converge(ctx))
                .map_err(|source| {
                    tracing::error!(error = %source, "phase failed");
                    PipelineError {
                        phase: name,
                        source,
                    }
                })?;

            tracing::info!(changed = outcome.changed(), detail = outcome.detail(), "phase done");
            let step = StepReport {
                phase: name,
                outcome,
            };
            observe(&step);
            steps.push(step);
        }
        Ok(steps)
    }
}
