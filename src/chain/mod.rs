//! Dual-ledger session management and transaction routing.
//!
//! The gateway mediates two independently operated ledger networks, a hot
//! working chain and a cold archival chain. Each has its own credentials,
//! channel, and secured session; nothing is shared between them.
//!
//! ```text
//! ┌────────────────────┐    ┌───────────────────┐    ┌──────────────┐
//! │ TransactionRouter  │───▶│ChainSessionManager│───▶│ ChainSession │
//! │ (decode, dispatch) │    │ (slots, deadlines)│    │ (hot | cold) │
//! └────────────────────┘    └───────────────────┘    └──────┬───────┘
//!                                                          │
//!                                                   ┌──────▼───────┐
//!                                                   │PeerTransport │
//!                                                   │ (TLS + JSON) │
//!                                                   └──────────────┘
//! ```
//!
//! Submit calls pass through three peer phases, endorse, submit, and
//! commit status, each bounded by its own deadline tier; evaluate calls
//! are read-only with a tighter tier of their own.

pub mod config;
pub mod error;
pub mod manager;
pub mod router;
pub mod session;
pub mod signer;
pub mod transport;

pub use config::{ChainConfig, ChainId, ConfigError};
pub use error::{ChainError, TransportError, TxPhase};
pub use manager::{ChainSessionManager, ConnectReport, Contract, Deadlines, SessionState};
pub use router::TransactionRouter;
pub use session::{ChainConnector, ChainSession, TlsChainConnector};
pub use transport::{CommitOutcome, EndorsedProposal, PeerTransport, TransactionProposal};
