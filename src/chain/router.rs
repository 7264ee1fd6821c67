//! Transaction routing over the chain session manager.
//!
//! The router picks the chain and operation class for an already-authorized
//! request, then normalizes the raw response bytes into structured JSON.
//! A decode failure signals a contract/protocol version mismatch and is
//! surfaced as its own error kind, distinct from transient network or
//! ledger faults, which are re-raised unchanged.

use std::sync::Arc;

use log::{debug, error};

use crate::chain::config::ChainId;
use crate::chain::error::ChainError;
use crate::chain::manager::ChainSessionManager;

/// Routes transactions to a chain's contract through the session manager.
pub struct TransactionRouter {
    manager: Arc<ChainSessionManager>,
}

impl TransactionRouter {
    pub fn new(manager: Arc<ChainSessionManager>) -> Self {
        Self { manager }
    }

    /// Dispatch a transaction and decode the response.
    ///
    /// `read_only` selects evaluate (safe for callers to retry) over
    /// submit (never retried; see [`ChainSessionManager`]).
    pub async fn route(
        &self,
        chain: ChainId,
        contract: &str,
        function: &str,
        args: &[String],
        read_only: bool,
    ) -> Result<serde_json::Value, ChainError> {
        let result = if read_only {
            self.manager.evaluate(chain, contract, function, args).await
        } else {
            self.manager.submit(chain, contract, function, args).await
        };

        let bytes = result.map_err(|e| {
            error!(
                "Transaction failed on {chain} chain, contract {contract}, function {function}: {e}"
            );
            e
        })?;

        debug!(
            "Transaction ok on {chain} chain, contract {contract}, function {function} ({} bytes)",
            bytes.len()
        );

        serde_json::from_slice(&bytes).map_err(|e| ChainError::ResponseDecode {
            chain,
            reason: e.to_string(),
        })
    }
}
