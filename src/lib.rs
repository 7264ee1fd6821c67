//! Custody gateway: sole mediation point between client requests and the
//! hot/cold evidence ledgers.
//!
//! Every transaction passes a fail-closed authorization pipeline (role
//! permission plus organization identity) before it may reach either
//! chain. The HTTP transport, credential issuance, audit persistence, and
//! content storage live in external collaborators; this crate owns the
//! glue between them and the ledgers.

// Dual-chain sessions, deadline tiers, transaction routing
pub mod chain;

// Role table, permission evaluation, authorization gate
pub mod rbac;

// Composition facade exposed to the HTTP layer
pub mod gateway;

pub use chain::{ChainConfig, ChainError, ChainId, ChainSessionManager, ConfigError};
pub use gateway::{Gateway, GatewayError};
pub use rbac::{AuthError, Identity, Permission, RoleTable};
