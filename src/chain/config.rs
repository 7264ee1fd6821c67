//! Per-chain configuration loaded once at startup.
//!
//! One [`ChainConfig`] exists per chain (hot and cold). Records are
//! immutable after load; session establishment reads credential material
//! from the configured paths but never writes back.

use std::env;

use thiserror::Error;

/// Identifies one of the two ledger networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainId {
    /// High-throughput working chain.
    Hot,
    /// Long-retention archival chain.
    Cold,
}

impl ChainId {
    /// Environment variable prefix for this chain's settings.
    fn env_prefix(self) -> &'static str {
        match self {
            ChainId::Hot => "HOT",
            ChainId::Cold => "COLD",
        }
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainId::Hot => f.write_str("hot"),
            ChainId::Cold => f.write_str("cold"),
        }
    }
}

/// Immutable connection settings for one chain.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Which chain this record configures.
    pub chain: ChainId,

    /// Peer network endpoint, `host:port`.
    pub peer_endpoint: String,

    /// Hostname expected in the peer's TLS certificate. The endpoint
    /// address and the certificate identity differ in most deployments.
    pub peer_host_alias: String,

    /// Path to the TLS root certificate (PEM) anchoring the peer's chain.
    pub tls_cert_path: String,

    /// Path to the client's enrollment certificate (PEM).
    pub cert_path: String,

    /// Path to the client's EC private key (PEM).
    pub key_path: String,

    /// Membership service provider id of the acting organization.
    pub msp_id: String,

    /// Ledger channel to scope the session to.
    pub channel_name: String,
}

impl ChainConfig {
    /// Load configuration for one chain from the environment.
    ///
    /// Endpoint, alias, and channel fall back to the lab defaults; the
    /// three credential paths are required and their absence is a fatal
    /// configuration error.
    pub fn from_env(chain: ChainId) -> Result<Self, ConfigError> {
        let p = chain.env_prefix();

        let (default_endpoint, default_alias, default_channel) = match chain {
            ChainId::Hot => ("localhost:7051", "peer0.lab.hot.dfir.local", "evidence-hot"),
            ChainId::Cold => (
                "localhost:9051",
                "peer0.lab.cold.dfir.local",
                "evidence-cold",
            ),
        };

        Ok(Self {
            chain,
            peer_endpoint: env_or(&format!("{p}_PEER_ENDPOINT"), default_endpoint),
            peer_host_alias: env_or(&format!("{p}_PEER_HOST_ALIAS"), default_alias),
            tls_cert_path: env_required(&format!("{p}_TLS_CERT_PATH"))?,
            cert_path: env_required(&format!("{p}_CERT_PATH"))?,
            key_path: env_required(&format!("{p}_KEY_PATH"))?,
            msp_id: env_or("MSP_ID", "ForensicLabMSP"),
            channel_name: env_or(&format!("{p}_CHANNEL_NAME"), default_channel),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVar {
        name: key.to_string(),
    })
}

/// Fatal startup configuration errors. The process must not begin serving
/// requests after one of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required environment variable {name} is not set")]
    MissingVar { name: String },

    #[error("Failed to read role configuration at {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Malformed role configuration: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_id_display() {
        assert_eq!(ChainId::Hot.to_string(), "hot");
        assert_eq!(ChainId::Cold.to_string(), "cold");
    }

    #[test]
    fn from_env_requires_credential_paths() {
        // Credential paths have no defaults; a bare environment must fail.
        for key in [
            "HOT_TLS_CERT_PATH",
            "HOT_CERT_PATH",
            "HOT_KEY_PATH",
        ] {
            std::env::remove_var(key);
        }
        let result = ChainConfig::from_env(ChainId::Hot);
        assert!(matches!(result, Err(ConfigError::MissingVar { .. })));
    }
}
