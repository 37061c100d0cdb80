//! Keydra configuration file
//!
//! The configuration is a YAML document with three sections:
//!
//! ```yaml
//! vault:
//!   nodes:
//!     - "https://vault-0.vault-internal:8200"
//!   unseal_keys:
//!     - "key1"
//!   tls:
//!     enabled: true
//!     ca_cert: /etc/keydra/ca.pem
//! kubernetes:
//!   in_cluster: true
//!   namespace: vault
//! app:
//!   check_interval: "30s"
//!   log_level: info
//! ```

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::vault::NodeEndpoint;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/keydra/config.yaml";

/// Default label selector for Vault server pods
pub const DEFAULT_LABEL_SELECTOR: &str = "app.kubernetes.io/instance=vault";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub vault: VaultConfig,

    #[serde(rename = "kubernetes", default)]
    pub k8s: K8sConfig,

    #[serde(default)]
    pub app: AppConfig,
}

/// Vault nodes and the shares used to unseal them
#[derive(Clone, Deserialize)]
pub struct VaultConfig {
    /// Addresses of every Vault node to keep unsealed
    #[serde(default)]
    pub nodes: Vec<String>,

    /// Unseal key shares, tried in this order
    #[serde(rename = "unseal_keys", default)]
    pub keys: Vec<String>,

    #[serde(default)]
    pub tls: TlsConfig,

    /// Timeout applied to every Vault HTTP request
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub request_timeout: Duration,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("nodes", &self.nodes)
            .field("keys", &format_args!("<{} redacted>", self.keys.len()))
            .field("tls", &self.tls)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// TLS settings for talking to Vault
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// PEM bundle used to verify the Vault server certificate
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,

    /// PEM client certificate for mutual TLS
    #[serde(default)]
    pub client_cert: Option<PathBuf>,

    /// PEM private key matching `client_cert`
    #[serde(default)]
    pub client_key: Option<PathBuf>,

    /// Skip server certificate verification
    #[serde(default)]
    pub insecure: bool,
}

/// Where to find the Kubernetes API and the Vault pods
#[derive(Debug, Clone, Deserialize)]
pub struct K8sConfig {
    #[serde(default)]
    pub in_cluster: bool,

    /// Kubeconfig file used when not running in-cluster
    #[serde(default)]
    pub config_path: Option<PathBuf>,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_label_selector")]
    pub label_selector: String,
}

impl Default for K8sConfig {
    fn default() -> Self {
        Self {
            in_cluster: false,
            config_path: None,
            namespace: default_namespace(),
            label_selector: default_label_selector(),
        }
    }
}

/// General process settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(
        default = "default_check_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub check_interval: Duration,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Listen address for `/metrics` and `/health`; disabled when unset
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            log_level: default_log_level(),
            metrics_addr: None,
        }
    }
}

fn default_namespace() -> String {
    "vault".to_string()
}

fn default_label_selector() -> String {
    DEFAULT_LABEL_SELECTOR.to_string()
}

fn default_check_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Read and parse the configuration file at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a configuration document
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Check the configuration for problems that would prevent startup
    pub fn validate(&self) -> Result<()> {
        if self.vault.nodes.is_empty() {
            return Err(Error::ConfigError(
                "vault.nodes must contain at least one address".to_string(),
            ));
        }
        if self.vault.keys.is_empty() {
            return Err(Error::ConfigError(
                "vault.unseal_keys must contain at least one key".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for node in &self.vault.nodes {
            let endpoint = NodeEndpoint::parse(node)?;
            if !seen.insert(endpoint) {
                return Err(Error::ConfigError(format!(
                    "vault.nodes lists '{}' more than once",
                    node
                )));
            }
        }
        if self.vault.request_timeout.is_zero() {
            return Err(Error::ConfigError(
                "vault.request_timeout must be greater than zero".to_string(),
            ));
        }

        let tls = &self.vault.tls;
        if tls.client_cert.is_some() != tls.client_key.is_some() {
            return Err(Error::ConfigError(
                "vault.tls.client_cert and vault.tls.client_key must be set together".to_string(),
            ));
        }

        if self.app.check_interval.is_zero() {
            return Err(Error::ConfigError(
                "app.check_interval must be greater than zero".to_string(),
            ));
        }
        if self.k8s.namespace.trim().is_empty() {
            return Err(Error::ConfigError(
                "kubernetes.namespace must not be empty".to_string(),
            ));
        }
        self.metrics_addr()?;

        Ok(())
    }

    /// Parsed metrics listen address, if configured
    pub fn metrics_addr(&self) -> Result<Option<SocketAddr>> {
        self.app
            .metrics_addr
            .as_deref()
            .map(|addr| {
                addr.parse().map_err(|e| {
                    Error::ConfigError(format!("app.metrics_addr '{}' is invalid: {}", addr, e))
                })
            })
            .transpose()
    }
}

/// Parse durations such as `500ms`, `30s`, `5m`, `1h` or a bare number of seconds
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    if digits.is_empty() {
        return Err(format!("'{}' does not start with a number", value));
    }
    let amount: u64 = digits
        .parse()
        .map_err(|e| format!("'{}' is not a valid duration: {}", value, e))?;

    match unit.trim() {
        "ms" => Ok(Duration::from_millis(amount)),
        "" | "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(amount.saturating_mul(3600))),
        other => Err(format!("unknown duration unit '{}' in '{}'", other, value)),
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
