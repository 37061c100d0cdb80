//! Auto-unseal reconciliation
//!
//! This module contains the per-node reconciliation loop and the scheduler
//! that drives one loop per configured Vault node:
//!
//! - [`Scheduler`] fans out one [`NodeSupervisor`] per node and waits for all of them
//! - [`NodeSupervisor`] runs readiness check → seal probe → unseal on every tick
//! - [`probe_seal_status`] and [`unseal_node`] are the per-node leaf operations

mod executor;
pub mod metrics;
mod prober;
mod scheduler;
mod shutdown;
mod supervisor;

use std::fmt;
use std::sync::Arc;

pub use executor::{unseal_node, UnsealReport};
pub use prober::probe_seal_status;
pub use scheduler::Scheduler;
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
pub use supervisor::{NodeSupervisor, PassOutcome};

/// Ordered unseal key shares shared read-only by every supervisor
#[derive(Clone)]
pub struct KeyShareSet {
    shares: Arc<[String]>,
}

impl KeyShareSet {
    pub fn new(shares: Vec<String>) -> Self {
        Self {
            shares: shares.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Shares in submission order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.shares.iter().map(String::as_str)
    }
}

impl fmt::Debug for KeyShareSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyShareSet(<{} redacted>)", self.shares.len())
    }
}
