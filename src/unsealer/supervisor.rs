//! Per-node reconciliation loop
//!
//! Each pass walks `CheckingReadiness → ProbingSeal → [Unsealing]` and
//! always ends back in idle. Errors are logged and end the pass; they
//! never leave the loop and never reach another node's supervisor.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use super::{metrics, probe_seal_status, unseal_node, KeyShareSet, ShutdownSignal};
use crate::error::Error;
use crate::readiness::ReadinessGate;
use crate::vault::{NodeEndpoint, VaultApi};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// No running Vault pod; nothing probed
    ClusterNotReady,
    /// The readiness gate errored; treated as not ready
    ReadinessCheckFailed,
    /// Seal status could not be read; no unseal attempted
    ProbeFailed,
    /// Node already unsealed; nothing submitted
    AlreadyUnsealed,
    /// Node was sealed and is now unsealed
    Unsealed { keys_submitted: usize },
    /// Node was sealed and remains sealed
    UnsealFailed,
}

impl PassOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassOutcome::ClusterNotReady => "cluster_not_ready",
            PassOutcome::ReadinessCheckFailed => "readiness_check_failed",
            PassOutcome::ProbeFailed => "probe_failed",
            PassOutcome::AlreadyUnsealed => "already_unsealed",
            PassOutcome::Unsealed { .. } => "unsealed",
            PassOutcome::UnsealFailed => "unseal_failed",
        }
    }

    /// Whether the pass ended in an error
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PassOutcome::ReadinessCheckFailed | PassOutcome::ProbeFailed | PassOutcome::UnsealFailed
        )
    }
}

/// Owns the reconciliation lifecycle of exactly one Vault node
pub struct NodeSupervisor {
    client: Arc<dyn VaultApi>,
    keys: KeyShareSet,
    gate: Arc<dyn ReadinessGate>,
    interval: Duration,
}

impl NodeSupervisor {
    /// Construct a supervisor; `interval` must be non-zero, which
    /// [`Scheduler::new`](super::Scheduler::new) enforces
    pub(crate) fn new(
        client: Arc<dyn VaultApi>,
        keys: KeyShareSet,
        gate: Arc<dyn ReadinessGate>,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            keys,
            gate,
            interval,
        }
    }

    pub fn endpoint(&self) -> &NodeEndpoint {
        self.client.endpoint()
    }

    /// Run passes until `shutdown` fires
    ///
    /// The first pass starts immediately. Shutdown is only observed between
    /// passes, so a pass in progress always completes.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Starting supervisor for {} with check interval {:?}",
            self.endpoint(),
            self.interval
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                _ = ticker.tick() => {}
            }
            self.reconcile_once().await;
        }

        info!("Supervisor for {} stopped", self.endpoint());
    }

    /// Execute a single readiness → probe → unseal pass
    #[instrument(skip(self), fields(node = %self.endpoint()))]
    pub async fn reconcile_once(&self) -> PassOutcome {
        let outcome = self.pass().await;
        metrics::record_pass(self.endpoint().as_str(), outcome.as_str());
        debug!("Pass finished: {}", outcome.as_str());
        outcome
    }

    async fn pass(&self) -> PassOutcome {
        let node = self.endpoint();

        match self.gate.is_ready().await {
            Ok(true) => {}
            Ok(false) => {
                info!("No Vault pods are running, skipping unseal check for {}", node);
                return PassOutcome::ClusterNotReady;
            }
            Err(e) => {
                log_pass_error("Failed to check Vault readiness", node, &e);
                return PassOutcome::ReadinessCheckFailed;
            }
        }

        let status = match probe_seal_status(self.client.as_ref()).await {
            Ok(status) => status,
            Err(e) => {
                log_pass_error("Failed to check seal status", node, &e);
                return PassOutcome::ProbeFailed;
            }
        };

        if !status.sealed {
            debug!("{} is already unsealed", node);
            return PassOutcome::AlreadyUnsealed;
        }

        info!(
            "{} is sealed (progress {}/{}), attempting to unseal",
            node, status.progress, status.threshold
        );

        match unseal_node(self.client.as_ref(), &self.keys).await {
            Ok(report) => {
                metrics::set_sealed(node.as_str(), report.status.sealed);
                info!("Successfully unsealed {}", node);
                PassOutcome::Unsealed {
                    keys_submitted: report.keys_submitted,
                }
            }
            Err(e) => {
                error!("Failed to unseal {}: {}", node, e);
                PassOutcome::UnsealFailed
            }
        }
    }
}

/// Transient errors are expected while Vault restarts; anything else
/// points at a broken setup
fn log_pass_error(context: &str, node: &NodeEndpoint, e: &Error) {
    if e.is_transient() {
        warn!("{} for {}: {}", context, node, e);
    } else {
        error!("{} for {}: {}", context, node, e);
    }
}
