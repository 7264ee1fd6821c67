//! Gateway facade: the composition of session manager, role table, and
//! transaction router that the HTTP layer talks to.
//!
//! One [`Gateway`] is constructed at process start by the composition
//! root and passed by reference to consumers; there is no ambient global
//! instance. Its teardown belongs to the same root, on the shutdown
//! signal.

use std::sync::Arc;

use thiserror::Error;

use crate::chain::{
    ChainError, ChainId, ChainSessionManager, ConnectReport, TransactionRouter,
};
use crate::rbac::{AuthError, AuthorizationGate, AuthorizedRequest, Identity, Permission, RoleTable};

/// Failures surfaced to the HTTP layer.
///
/// Authorization kinds map to not-authenticated / authorization-denied
/// responses; chain kinds map to server-failure responses, with decode
/// failures distinguishable from network faults in logs.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Mediates every ledger interaction behind authorization.
pub struct Gateway {
    manager: Arc<ChainSessionManager>,
    gate: AuthorizationGate,
    router: TransactionRouter,
}

impl Gateway {
    pub fn new(roles: Arc<RoleTable>, manager: Arc<ChainSessionManager>) -> Self {
        Self {
            gate: AuthorizationGate::new(roles),
            router: TransactionRouter::new(Arc::clone(&manager)),
            manager,
        }
    }

    /// Connect both chains, reporting per-chain outcomes.
    pub async fn connect_all(&self) -> ConnectReport {
        self.manager.connect_all().await
    }

    /// Run the authorization pipeline for a request.
    pub fn authorize(
        &self,
        identity: Option<&Identity>,
        required: &Permission,
    ) -> Result<AuthorizedRequest, AuthError> {
        self.gate.authorize(identity, required)
    }

    /// Route an already-authorized transaction.
    pub async fn route(
        &self,
        chain: ChainId,
        contract: &str,
        function: &str,
        args: &[String],
        read_only: bool,
    ) -> Result<serde_json::Value, ChainError> {
        self.router.route(chain, contract, function, args, read_only).await
    }

    /// Authorize and route in one step, preserving the fail-closed order:
    /// nothing reaches the session manager unless the pipeline succeeds.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        identity: Option<&Identity>,
        required: &Permission,
        chain: ChainId,
        contract: &str,
        function: &str,
        args: &[String],
        read_only: bool,
    ) -> Result<serde_json::Value, GatewayError> {
        self.authorize(identity, required)?;
        Ok(self.route(chain, contract, function, args, read_only).await?)
    }

    /// Best-effort disconnect of both chains.
    pub async fn disconnect_all(&self) {
        self.manager.disconnect().await;
    }

    /// Session manager access for lifecycle introspection.
    pub fn manager(&self) -> &ChainSessionManager {
        &self.manager
    }
}
