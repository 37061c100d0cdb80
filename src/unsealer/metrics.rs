//! Prometheus metrics for the auto-unsealer

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicI64;

/// Labels identifying a Vault node
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct NodeLabels {
    pub node: String,
}

/// Labels for reconciliation pass outcomes
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PassLabels {
    pub node: String,
    pub outcome: String,
}

/// Gauge tracking the last observed seal state per node (1 = sealed)
pub static VAULT_SEALED: Lazy<Family<NodeLabels, Gauge<i64, AtomicI64>>> =
    Lazy::new(Family::default);

/// Reconciliation passes by outcome
pub static RECONCILE_PASSES: Lazy<Family<PassLabels, Counter>> = Lazy::new(Family::default);

/// Unseal key shares submitted per node
pub static UNSEAL_KEY_SUBMISSIONS: Lazy<Family<NodeLabels, Counter>> =
    Lazy::new(Family::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();
    registry.register(
        "keydra_vault_sealed",
        "Whether the Vault node was sealed at its last probe",
        VAULT_SEALED.clone(),
    );
    registry.register(
        "keydra_reconcile_passes",
        "Reconciliation passes by outcome",
        RECONCILE_PASSES.clone(),
    );
    registry.register(
        "keydra_unseal_key_submissions",
        "Unseal key shares submitted to the Vault node",
        UNSEAL_KEY_SUBMISSIONS.clone(),
    );
    registry
});

pub fn set_sealed(node: &str, sealed: bool) {
    let labels = NodeLabels {
        node: node.to_string(),
    };
    VAULT_SEALED.get_or_create(&labels).set(i64::from(sealed));
}

pub fn record_pass(node: &str, outcome: &str) {
    let labels = PassLabels {
        node: node.to_string(),
        outcome: outcome.to_string(),
    };
    RECONCILE_PASSES.get_or_create(&labels).inc();
}

pub fn record_key_submission(node: &str) {
    let labels = NodeLabels {
        node: node.to_string(),
    };
    UNSEAL_KEY_SUBMISSIONS.get_or_create(&labels).inc();
}

/// Render the registry in the Prometheus text format
pub fn encode() -> Result<String, std::fmt::Error> {
    let mut buffer = String::new();
    prometheus_client::encoding::text::encode(&mut buffer, &REGISTRY)?;
    Ok(buffer)
}
