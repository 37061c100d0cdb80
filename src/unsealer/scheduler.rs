//! Reconciliation scheduler
//!
//! Owns one [`NodeSupervisor`] per configured node and blocks until all of
//! them have stopped.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use super::{KeyShareSet, NodeSupervisor, ShutdownSignal};
use crate::error::{Error, Result};
use crate::readiness::ReadinessGate;
use crate::vault::VaultApi;

pub struct Scheduler {
    supervisors: Vec<NodeSupervisor>,
}

impl Scheduler {
    /// Build one supervisor per node
    ///
    /// Fails when there is nothing to supervise, a node is listed twice or
    /// the interval is zero.
    pub fn new(
        nodes: Vec<Arc<dyn VaultApi>>,
        keys: KeyShareSet,
        gate: Arc<dyn ReadinessGate>,
        interval: Duration,
    ) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::ConfigError(
                "at least one Vault node is required".to_string(),
            ));
        }
        if keys.is_empty() {
            return Err(Error::ConfigError(
                "at least one unseal key is required".to_string(),
            ));
        }
        if interval.is_zero() {
            return Err(Error::ConfigError(
                "check interval must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for client in &nodes {
            if !seen.insert(client.endpoint().clone()) {
                return Err(Error::ConfigError(format!(
                    "Vault node {} is listed more than once",
                    client.endpoint()
                )));
            }
        }

        let supervisors = nodes
            .into_iter()
            .map(|client| NodeSupervisor::new(client, keys.clone(), gate.clone(), interval))
            .collect();

        Ok(Self { supervisors })
    }

    pub fn node_count(&self) -> usize {
        self.supervisors.len()
    }

    /// Run every supervisor concurrently until `shutdown` fires and all have stopped
    pub async fn run(self, shutdown: ShutdownSignal) {
        info!("Starting auto-unsealer for {} node(s)", self.supervisors.len());

        let tasks: Vec<_> = self
            .supervisors
            .into_iter()
            .map(|supervisor| {
                let node = supervisor.endpoint().to_string();
                let handle = tokio::spawn(supervisor.run(shutdown.clone()));
                (node, handle)
            })
            .collect();

        let (nodes, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        let results = futures::future::join_all(handles).await;

        for (node, result) in nodes.iter().zip(results) {
            if let Err(e) = result {
                error!("Supervisor for {} terminated abnormally: {}", node, e);
            }
        }

        info!("All supervisors stopped");
    }
}
