//! Seal status probe for a single node

use tracing::debug;

use super::metrics;
use crate::error::Result;
use crate::vault::{SealStatus, VaultApi};

/// Query the node's seal status and record it
pub async fn probe_seal_status(client: &dyn VaultApi) -> Result<SealStatus> {
    let endpoint = client.endpoint();
    let status = client.seal_status().await?;

    debug!(
        "Seal status for {}: sealed={} progress={}/{}",
        endpoint, status.sealed, status.progress, status.threshold
    );
    metrics::set_sealed(endpoint.as_str(), status.sealed);

    Ok(status)
}
