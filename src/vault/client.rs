//! HTTP client for Vault's seal endpoints

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{NodeEndpoint, SealStatus, TlsMaterial, VaultApi};
use crate::error::{Error, Result};

const SEAL_STATUS_PATH: &str = "v1/sys/seal-status";
const UNSEAL_PATH: &str = "v1/sys/unseal";

/// Error body returned by Vault on non-2xx responses
#[derive(Debug, Deserialize)]
struct VaultErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Serialize)]
struct UnsealRequest<'a> {
    key: &'a str,
}

/// Build the HTTP client shared by every node
///
/// Applies the CA bundle, client identity and verification settings from
/// `tls` when present.
pub fn build_http_client(tls: Option<&TlsMaterial>, timeout: Duration) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .user_agent(concat!("keydra/", env!("CARGO_PKG_VERSION")));

    if let Some(tls) = tls {
        if let Some(ca_pem) = &tls.ca_pem {
            let ca_cert = reqwest::Certificate::from_pem(ca_pem)
                .map_err(|e| Error::TlsError(format!("Failed to parse CA cert: {}", e)))?;
            builder = builder.add_root_certificate(ca_cert);
        }

        if let Some(identity_pem) = &tls.identity_pem {
            let identity = reqwest::Identity::from_pem(identity_pem)
                .map_err(|e| Error::TlsError(format!("Failed to create identity: {}", e)))?;
            builder = builder.identity(identity);
        }

        if tls.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }
    }

    builder
        .build()
        .map_err(|e| Error::TlsError(format!("Failed to create HTTP client: {}", e)))
}

/// [`VaultApi`] over HTTP(S) for one node
#[derive(Debug, Clone)]
pub struct VaultHttpClient {
    http: Client,
    endpoint: NodeEndpoint,
}

impl VaultHttpClient {
    /// Bind a shared HTTP client to one node
    pub fn new(http: Client, endpoint: NodeEndpoint) -> Self {
        Self { http, endpoint }
    }

    async fn read_status(&self, response: Response) -> Result<SealStatus> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::VaultApiError {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(response.json::<SealStatus>().await?)
    }
}

/// Extract Vault's `errors` array, falling back to the raw body
fn error_message(body: &str) -> String {
    match serde_json::from_str::<VaultErrorResponse>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed.errors.join("; "),
        _ if body.trim().is_empty() => "empty response body".to_string(),
        _ => body.trim().to_string(),
    }
}

#[async_trait]
impl VaultApi for VaultHttpClient {
    fn endpoint(&self) -> &NodeEndpoint {
        &self.endpoint
    }

    async fn seal_status(&self) -> Result<SealStatus> {
        let url = self.endpoint.api_url(SEAL_STATUS_PATH)?;
        debug!("Querying seal status: {}", url);

        let response = self.http.get(url).send().await?;
        self.read_status(response).await
    }

    async fn submit_unseal_key(&self, key: &str) -> Result<SealStatus> {
        let url = self.endpoint.api_url(UNSEAL_PATH)?;

        let response = self
            .http
            .put(url)
            .json(&UnsealRequest { key })
            .send()
            .await?;
        self.read_status(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_vault_errors() {
        let body = r#"{"errors":["Vault is not initialized"]}"#;
        assert_eq!(error_message(body), "Vault is not initialized");

        let body = r#"{"errors":["first","second"]}"#;
        assert_eq!(error_message(body), "first; second");
    }

    #[test]
    fn test_error_message_falls_back_to_body() {
        assert_eq!(error_message("  upstream timeout \n"), "upstream timeout");
        assert_eq!(error_message(""), "empty response body");
        assert_eq!(error_message(r#"{"errors":[]}"#), r#"{"errors":[]}"#);
    }

    #[test]
    fn test_build_plain_client() {
        assert!(build_http_client(None, Duration::from_secs(5)).is_ok());

        let insecure = TlsMaterial {
            insecure: true,
            ..Default::default()
        };
        assert!(build_http_client(Some(&insecure), Duration::from_secs(5)).is_ok());
    }
}
