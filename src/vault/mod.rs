//! Vault node access
//!
//! The reconciliation core only depends on the [`VaultApi`] trait. The
//! [`VaultHttpClient`] implementation talks to Vault's `sys/seal-status`
//! and `sys/unseal` endpoints over HTTP(S).

mod client;
mod tls;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::config::VaultConfig;
use crate::error::{Error, Result};

pub use client::{build_http_client, VaultHttpClient};
pub use tls::TlsMaterial;

/// Address of a single Vault instance
///
/// Only `http` and `https` URLs with a host and no credentials are
/// accepted. The address ends up in logs and metric labels. Immutable once
/// constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeEndpoint {
    url: Url,
}

impl NodeEndpoint {
    /// Parse and validate a configured Vault address
    pub fn parse(address: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidEndpoint {
            address: address.to_string(),
            reason,
        };

        let url = Url::parse(address.trim()).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(format!("unsupported scheme '{}'", other))),
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }
        if !url.username().is_empty() || url.password().is_some() {
            let mut redacted = url.clone();
            let _ = redacted.set_username("");
            let _ = redacted.set_password(None);
            return Err(Error::InvalidEndpoint {
                address: redacted.to_string(),
                reason: "credentials are not allowed in the address".to_string(),
            });
        }

        Ok(Self { url })
    }

    /// Build the URL of a Vault API path such as `v1/sys/seal-status`
    pub fn api_url(&self, path: &str) -> Result<Url> {
        let base = self.url.as_str().trim_end_matches('/');
        let joined = format!("{}/{}", base, path.trim_start_matches('/'));
        Url::parse(&joined).map_err(|e| Error::InvalidEndpoint {
            address: joined,
            reason: e.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }
}

impl fmt::Display for NodeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time seal state of one node
///
/// Returned both by the seal-status probe and by every unseal submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealStatus {
    pub sealed: bool,

    /// Shares accepted so far towards the threshold
    #[serde(default)]
    pub progress: u32,

    /// Shares required to unseal
    #[serde(rename = "t", default)]
    pub threshold: u32,

    /// Total shares the master key was split into
    #[serde(rename = "n", default)]
    pub shares: u32,
}

/// Seal-probe and unseal capability of one Vault node
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// Endpoint this client is bound to
    fn endpoint(&self) -> &NodeEndpoint;

    /// Query the node's current seal status
    async fn seal_status(&self) -> Result<SealStatus>;

    /// Submit one unseal key share and return the status Vault reports afterwards
    async fn submit_unseal_key(&self, key: &str) -> Result<SealStatus>;
}

/// Build one client per configured node, sharing a single HTTP client
///
/// TLS material is read once here; any failure aborts startup.
pub fn clients_from_config(config: &VaultConfig) -> Result<Vec<Arc<dyn VaultApi>>> {
    let tls = TlsMaterial::load(&config.tls)?;
    let http = build_http_client(tls.as_ref(), config.request_timeout)?;

    config
        .nodes
        .iter()
        .map(|address| {
            let endpoint = NodeEndpoint::parse(address)?;
            Ok(Arc::new(VaultHttpClient::new(http.clone(), endpoint)) as Arc<dyn VaultApi>)
        })
        .collect()
}
