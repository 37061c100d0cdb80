//! Unseal executor
//!
//! Submits key shares to one sealed node in list order, one request per
//! share, and stops at the first response reporting the node unsealed.
//! Vault accumulates partial progress server-side, so every cycle starts
//! again from the first share.

use tracing::{debug, info};

use super::{metrics, KeyShareSet};
use crate::error::{Error, Result};
use crate::vault::{SealStatus, VaultApi};

/// Result of a successful unseal cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsealReport {
    /// Shares submitted before Vault reported unsealed
    pub keys_submitted: usize,
    /// Status returned by the final submission
    pub status: SealStatus,
}

/// Submit `keys` to `client` until the node unseals or the keys run out
///
/// A failed submission aborts the remaining shares for this cycle.
pub async fn unseal_node(client: &dyn VaultApi, keys: &KeyShareSet) -> Result<UnsealReport> {
    let node = client.endpoint().to_string();
    let mut last_status: Option<SealStatus> = None;

    for (index, key) in keys.iter().enumerate() {
        metrics::record_key_submission(&node);

        let status = client
            .submit_unseal_key(key)
            .await
            .map_err(|e| Error::UnsealSubmission {
                node: node.clone(),
                index,
                source: Box::new(e),
            })?;

        debug!(
            "Share #{} submitted to {}: sealed={} progress={}/{}",
            index, node, status.sealed, status.progress, status.threshold
        );

        if !status.sealed {
            info!("{} unsealed after {} share(s)", node, index + 1);
            return Ok(UnsealReport {
                keys_submitted: index + 1,
                status,
            });
        }
        last_status = Some(status);
    }

    let (progress, threshold) = last_status
        .map(|s| (s.progress, s.threshold))
        .unwrap_or_default();

    Err(Error::KeysExhausted {
        node,
        attempted: keys.len(),
        progress,
        threshold,
    })
}
