//! Keydra: keeps HashiCorp Vault nodes on Kubernetes unsealed
//!
//! The [`unsealer::Scheduler`] drives one supervisor per configured Vault
//! node. Each supervisor periodically checks that the Vault pods are running,
//! probes its node's seal status and submits unseal key shares when the node
//! is sealed.

pub mod config;
pub mod error;
pub mod readiness;
pub mod rest_api;
pub mod unsealer;
pub mod vault;

pub use error::{Error, Result};
