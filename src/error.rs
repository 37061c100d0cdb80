//! Central error types for Keydra
//!
//! Uses `thiserror` for ergonomic, type-safe error handling with
//! automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Central error type for Keydra
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error from kube-rs
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// HTTP request error (from reqwest)
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// YAML configuration could not be parsed
    #[error("Configuration parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A configured Vault address is not usable
    #[error("Invalid Vault endpoint '{address}': {reason}")]
    InvalidEndpoint { address: String, reason: String },

    /// TLS material could not be loaded or applied
    #[error("TLS error: {0}")]
    TlsError(String),

    /// Vault answered with a non-success status
    #[error("Vault API error (HTTP {status}): {message}")]
    VaultApiError { status: u16, message: String },

    /// Every key share was submitted and the node is still sealed
    #[error(
        "Keys exhausted for {node}: submitted {attempted} share(s), node remains sealed (progress {progress}/{threshold})"
    )]
    KeysExhausted {
        node: String,
        attempted: usize,
        progress: u32,
        threshold: u32,
    },

    /// Submitting a single share failed; the rest of the cycle was abandoned
    #[error("Unseal share #{index} failed for {node}: {source}")]
    UnsealSubmission {
        node: String,
        index: usize,
        #[source]
        source: Box<Error>,
    },
}

/// Result type alias for Keydra operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Whether this error only ends the current reconciliation pass
    ///
    /// Everything else is a construction error and aborts startup.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::KubeError(_)
                | Error::HttpError(_)
                | Error::SerializationError(_)
                | Error::VaultApiError { .. }
                | Error::KeysExhausted { .. }
                | Error::UnsealSubmission { .. }
        )
    }

    /// Convert to a short human-readable message for status output
    pub fn status_message(&self) -> String {
        match self {
            Error::KubeError(e) => format!("Kubernetes error: {}", e),
            Error::HttpError(e) => format!("HTTP request failed: {}", e),
            Error::VaultApiError { status, message } => {
                format!("Vault returned {}: {}", status, message)
            }
            Error::KeysExhausted {
                attempted,
                progress,
                threshold,
                ..
            } => format!(
                "Still sealed after {} share(s) (progress {}/{})",
                attempted, progress, threshold
            ),
            Error::UnsealSubmission { index, source, .. } => {
                format!("Share #{} failed: {}", index, source.status_message())
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconciliation_errors_are_transient() {
        let exhausted = Error::KeysExhausted {
            node: "https://vault-0:8200".to_string(),
            attempted: 3,
            progress: 1,
            threshold: 3,
        };
        assert!(exhausted.is_transient());

        let api = Error::VaultApiError {
            status: 503,
            message: "Vault is sealed".to_string(),
        };
        assert!(api.is_transient());

        let submission = Error::UnsealSubmission {
            node: "https://vault-0:8200".to_string(),
            index: 0,
            source: Box::new(api),
        };
        assert!(submission.is_transient());
    }

    #[test]
    fn test_construction_errors_are_not_transient() {
        assert!(!Error::ConfigError("no nodes".to_string()).is_transient());
        assert!(!Error::TlsError("bad pem".to_string()).is_transient());
        assert!(!Error::InvalidEndpoint {
            address: "vault".to_string(),
            reason: "relative URL without a base".to_string(),
        }
        .is_transient());
    }

    #[test]
    fn test_status_message_never_contains_share() {
        let err = Error::UnsealSubmission {
            node: "https://vault-1:8200".to_string(),
            index: 2,
            source: Box::new(Error::VaultApiError {
                status: 400,
                message: "invalid key".to_string(),
            }),
        };
        assert_eq!(
            err.status_message(),
            "Share #2 failed: Vault returned 400: invalid key"
        );
    }
}
