//! Responsible-process negotiation
//!
//! Several processes share one secret store, but only one of them should
//! refresh a given token. The responsible process is recorded as `rulingPid`
//! in the global state. A process that needs a refresh pings the ruling
//! process over IPC; when nobody answers it claims the role, waits, and
//! re-reads the claim to detect a competing writer.
//!
//! Two processes can still both believe they are responsible for a short
//! window. The credential write ordering makes that harmless.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atlascode_core::{
    process_started_at, AuthConfig, AuthError, AuthResult, DetailedSiteInfo, GlobalState,
    Notifier,
};
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::ipc::PeerTransport;

/// Decides whether this process may refresh tokens for a site.
#[async_trait]
pub trait ProcessCoordinator: Send + Sync {
    async fn this_is_the_responsible_process(&self, site: &DetailedSiteInfo) -> bool;
}

pub struct Negotiator {
    pid: u32,
    state: GlobalState,
    transport: Arc<dyn PeerTransport>,
    notifier: Arc<dyn Notifier>,
    ping_timeout: Duration,
    read_delay: Duration,
    rounds: u32,
    startup_grace: Duration,
    started_at: Instant,
}

impl Negotiator {
    pub fn new(
        state: GlobalState,
        transport: Arc<dyn PeerTransport>,
        notifier: Arc<dyn Notifier>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            pid: std::process::id(),
            state,
            transport,
            notifier,
            ping_timeout: config.ping_timeout,
            read_delay: config.read_delay,
            rounds: config.negotiation_rounds.max(1),
            startup_grace: config.startup_grace,
            started_at: Instant::from_std(process_started_at()),
        }
    }

    /// Measure the startup grace from `started_at` instead of the process start.
    pub fn with_started_at(mut self, started_at: Instant) -> Self {
        self.started_at = started_at;
        self
    }

    /// Negotiate as `pid` instead of the current process id.
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    async fn negotiate(&self, site: &DetailedSiteInfo) -> AuthResult<bool> {
        if self.state.ruling_pid().await == Some(self.pid) {
            return Ok(true);
        }

        let uptime = self.started_at.elapsed();
        if uptime < self.startup_grace {
            debug!(
                "[Negotiator] Waiting {:?} of startup grace before negotiating",
                self.startup_grace - uptime
            );
            tokio::time::sleep(self.startup_grace - uptime).await;
        }

        for round in 1..=self.rounds {
            let ruling = self.state.ruling_pid().await;
            if ruling == Some(self.pid) {
                return Ok(true);
            }
            if let Some(pid) = ruling {
                if self.peer_acknowledges(pid, site).await {
                    debug!(
                        ruling_pid = pid,
                        "[Negotiator] Process {} is responsible for {}", pid, site.host
                    );
                    return Ok(false);
                }
            }

            self.state
                .set_ruling_pid(self.pid)
                .await
                .map_err(|e| AuthError::storage("ruling pid write", e))?;
            tokio::time::sleep(self.read_delay).await;

            if self.state.ruling_pid().await == Some(self.pid) {
                info!(
                    pid = self.pid,
                    round, "[Negotiator] This process is now responsible"
                );
                return Ok(true);
            }
            debug!(round, "[Negotiator] Claim overwritten by another process");
        }

        Err(AuthError::NegotiationExhausted {
            rounds: self.rounds,
        })
    }

    async fn peer_acknowledges(&self, pid: u32, site: &DetailedSiteInfo) -> bool {
        match tokio::time::timeout(self.ping_timeout, self.transport.ping(pid, site)).await {
            Ok(Ok(acked)) => acked,
            Ok(Err(e)) => {
                debug!("[Negotiator] Process {} unreachable: {}", pid, e);
                false
            }
            Err(_) => {
                debug!("[Negotiator] No ack from process {} within {:?}", pid, self.ping_timeout);
                false
            }
        }
    }
}

#[async_trait]
impl ProcessCoordinator for Negotiator {
    async fn this_is_the_responsible_process(&self, site: &DetailedSiteInfo) -> bool {
        match self.negotiate(site).await {
            Ok(responsible) => responsible,
            Err(e) => {
                error!("[Negotiator] {} (site {})", e, site.host);
                let notifier = Arc::clone(&self.notifier);
                let message = format!(
                    "Unable to coordinate token refresh for {} between open windows",
                    site.host
                );
                tokio::spawn(async move {
                    notifier.show_error(&message, &[]).await;
                });
                false
            }
        }
    }
}
