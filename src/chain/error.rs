//! Error types for chain session management and transaction routing.

use thiserror::Error;

use crate::chain::config::ChainId;

/// Phase of a ledger transaction that a deadline tier applies to.
///
/// Submit calls move through three phases (endorse, submit, commit status),
/// each with its own deadline. Evaluate is a single read-only phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPhase {
    Evaluate,
    Endorse,
    Submit,
    CommitStatus,
}

impl std::fmt::Display for TxPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TxPhase::Evaluate => "evaluate",
            TxPhase::Endorse => "endorse",
            TxPhase::Submit => "submit",
            TxPhase::CommitStatus => "commit-status",
        };
        f.write_str(label)
    }
}

/// Errors from chain connectivity, transactions, and response handling.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Failed to connect to {chain} chain: {reason}")]
    ConnectionFailed { chain: ChainId, reason: String },

    #[error("{chain} chain not connected")]
    NotConnected { chain: ChainId },

    #[error("{phase} phase deadline exceeded on {chain} chain")]
    Timeout { chain: ChainId, phase: TxPhase },

    #[error("Ledger error on {chain} chain: {reason}")]
    Ledger { chain: ChainId, reason: String },

    #[error("Transaction {tx_id} not committed on {chain} chain: {reason}")]
    NotCommitted {
        chain: ChainId,
        tx_id: String,
        reason: String,
    },

    #[error("Failed to decode {chain} chain response: {reason}")]
    ResponseDecode { chain: ChainId, reason: String },
}

impl ChainError {
    /// True when the failure indicates a malformed response payload rather
    /// than a transport or ledger fault.
    pub fn is_decode(&self) -> bool {
        matches!(self, ChainError::ResponseDecode { .. })
    }

    /// True when a phase deadline was exceeded. The session that produced
    /// this error remains usable.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChainError::Timeout { .. })
    }
}

/// Errors raised by the peer wire layer, before chain context is attached.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Malformed peer frame: {0}")]
    Frame(String),

    #[error("Peer rejected request: {0}")]
    Peer(String),
}

/// Errors from signing-identity material (certificate or private key).
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid PEM: {0}")]
    InvalidPem(String),

    #[error("Expected {expected} PEM block, got {got}")]
    UnexpectedTag { expected: &'static str, got: String },

    #[error("Invalid EC private key: {0}")]
    InvalidKey(String),
}
