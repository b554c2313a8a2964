//! Readiness probing of the supervised application.

use crate::constants;
use crate::core::host::ProcessSupervisor;
use crate::error::{Diagnostics, ProvisionError, Result};
use crate::models::config::ProbeSettings;
use crate::models::target::TargetDescriptor;
use anyhow::Context;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

/// Polls the loopback port, then asks the liveness endpoint once.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    settings: ProbeSettings,
}

impl HealthProbe {
    pub fn new(settings: ProbeSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Block until the service answers, or fail with diagnostics attached.
    pub fn wait(&self, target: &TargetDescriptor, supervisor: &dyn ProcessSupervisor) -> Result<()> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, target.port));
        let interval = Duration::from_millis(self.settings.interval_ms);
        let connect_timeout = Duration::from_millis(self.settings.interval_ms.clamp(100, 1000));
        let attempts = self.settings.attempts.max(1);

        let mut listening = false;
        for attempt in 1..=attempts {
            if TcpStream::connect_timeout(&addr, connect_timeout).is_ok() {
                tracing::debug!(%addr, attempt, "port open");
                listening = true;
                break;
            }
            tracing::debug!(%addr, attempt, attempts, "port closed");
            if attempt < attempts {
                thread::sleep(interval);
            }
        }

        if !listening {
            return Err(self.not_ready(
                format!("nothing listening on {} after {} attempts", addr, attempts),
                target,
                supervisor,
            ));
        }

        let url = format!("http://{}{}", target.upstream(), constants::LIVENESS_PATH);
        let client = reqwest::blocking::Client::builder()
            .no_proxy()
            .timeout(Duration::from_millis(self.settings.request_timeout_ms))
            .build()
            .context("build liveness client")?;

        match client.get(&url).send() {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(%url, status = %resp.status(), "service is live");
                Ok(())
            }
            Ok(resp) => Err(self.not_ready(
                format!("{} answered {}", url, resp.status()),
                target,
                supervisor,
            )),
            Err(e) => Err(self.not_ready(
                format!("{} unreachable: {}", url, e),
                target,
                supervisor,
            )),
        }
    }

    fn not_ready(
        &self,
        reason: String,
        target: &TargetDescriptor,
        supervisor: &dyn ProcessSupervisor,
    ) -> ProvisionError {
        tracing::error!(%reason, unit = %target.unit_name(), "readiness failed");
        let recent_logs = supervisor
            .recent_logs(&target.unit_name(), constants::DIAGNOSTIC_LOG_LINES)
            .unwrap_or_else(|e| format!("(logs unavailable: {})", e));
        let port_state = supervisor
            .listening_sockets()
            .unwrap_or_else(|e| format!("(socket list unavailable: {})", e));
        ProvisionError::NotReady {
            reason,
            diagnostics: Diagnostics {
                recent_logs,
                port_state,
            },
        }
    }
}
