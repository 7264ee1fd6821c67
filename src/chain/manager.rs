//! Session lifecycle manager for the hot and cold chains.
//!
//! Owns at most one live [`ChainSession`] per chain behind independent
//! lock slots, so a failure or slow operation on one chain can never block
//! or corrupt the other. Submit calls apply the per-phase deadline tiers
//! (endorse 15s, submit 30s, commit status 60s); evaluate calls use their
//! own 5s tier. A timed-out phase fails that call only; the session stays
//! installed and reusable.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::RwLock;

use crate::chain::config::{ChainConfig, ChainId};
use crate::chain::error::{ChainError, TransportError, TxPhase};
use crate::chain::session::{ChainConnector, ChainSession, TlsChainConnector};

/// Per-phase deadline tiers. These bound individual transaction phases,
/// not whole calls: slow commit confirmation must not cut short an
/// already-endorsed transaction.
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    pub evaluate: Duration,
    pub endorse: Duration,
    pub submit: Duration,
    pub commit_status: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            evaluate: Duration::from_secs(5),
            endorse: Duration::from_secs(15),
            submit: Duration::from_secs(30),
            commit_status: Duration::from_secs(60),
        }
    }
}

/// Observable lifecycle state of one chain's session slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

enum Slot {
    Disconnected,
    Connecting,
    Connected(Arc<ChainSession>),
}

impl Slot {
    fn state(&self) -> SessionState {
        match self {
            Slot::Disconnected => SessionState::Disconnected,
            Slot::Connecting => SessionState::Connecting,
            Slot::Connected(_) => SessionState::Connected,
        }
    }
}

/// Per-chain outcome of a combined connect. Never collapsed to a single
/// boolean: callers decide what to do about partial failure.
#[derive(Debug)]
pub struct ConnectReport {
    pub hot: Result<(), ChainError>,
    pub cold: Result<(), ChainError>,
}

impl ConnectReport {
    pub fn all_connected(&self) -> bool {
        self.hot.is_ok() && self.cold.is_ok()
    }

    pub fn any_connected(&self) -> bool {
        self.hot.is_ok() || self.cold.is_ok()
    }
}

/// Contract handle bound to one chain's current session.
pub struct Contract {
    session: Arc<ChainSession>,
    name: String,
    deadlines: Deadlines,
}

impl Contract {
    /// Read-only query, bounded by the evaluate tier.
    pub async fn evaluate(&self, function: &str, args: &[String]) -> Result<Vec<u8>, ChainError> {
        let chain = self.session.chain();
        let proposal = self.session.proposal(&self.name, function, args);
        bounded(
            chain,
            TxPhase::Evaluate,
            self.deadlines.evaluate,
            self.session.transport().evaluate(&proposal),
        )
        .await
    }

    /// Write transaction: endorse, submit, and confirm commit, each phase
    /// under its own deadline. Returns the endorsed result payload.
    ///
    /// Not retried internally; a re-submission without an idempotency key
    /// risks duplicate ledger effects, so retry policy belongs to callers.
    pub async fn submit(&self, function: &str, args: &[String]) -> Result<Vec<u8>, ChainError> {
        let chain = self.session.chain();
        let transport = self.session.transport();
        let proposal = self.session.proposal(&self.name, function, args);

        let endorsed = bounded(
            chain,
            TxPhase::Endorse,
            self.deadlines.endorse,
            transport.endorse(&proposal),
        )
        .await?;

        bounded(
            chain,
            TxPhase::Submit,
            self.deadlines.submit,
            transport.submit(&endorsed),
        )
        .await?;

        let outcome = bounded(
            chain,
            TxPhase::CommitStatus,
            self.deadlines.commit_status,
            transport.commit_status(&endorsed.tx_id),
        )
        .await?;

        if !outcome.committed {
            return Err(ChainError::NotCommitted {
                chain,
                tx_id: endorsed.tx_id,
                reason: outcome.detail,
            });
        }

        Ok(endorsed.payload)
    }
}

async fn bounded<T>(
    chain: ChainId,
    phase: TxPhase,
    deadline: Duration,
    operation: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, ChainError> {
    match tokio::time::timeout(deadline, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ChainError::Ledger {
            chain,
            reason: e.to_string(),
        }),
        Err(_) => Err(ChainError::Timeout { chain, phase }),
    }
}

/// Owns the hot and cold chain sessions.
///
/// Constructed once by the composition root and passed by reference to
/// every consumer; there is no ambient global instance.
pub struct ChainSessionManager {
    connector: Arc<dyn ChainConnector>,
    deadlines: Deadlines,
    hot_config: ChainConfig,
    cold_config: ChainConfig,
    hot: RwLock<Slot>,
    cold: RwLock<Slot>,
}

impl ChainSessionManager {
    /// Production manager with the TLS connector and default tiers.
    pub fn new(hot_config: ChainConfig, cold_config: ChainConfig) -> Self {
        Self::with_connector(
            hot_config,
            cold_config,
            Arc::new(TlsChainConnector),
            Deadlines::default(),
        )
    }

    /// Manager with an injected connector and deadline tiers.
    pub fn with_connector(
        hot_config: ChainConfig,
        cold_config: ChainConfig,
        connector: Arc<dyn ChainConnector>,
        deadlines: Deadlines,
    ) -> Self {
        Self {
            connector,
            deadlines,
            hot_config,
            cold_config,
            hot: RwLock::new(Slot::Disconnected),
            cold: RwLock::new(Slot::Disconnected),
        }
    }

    fn slot(&self, chain: ChainId) -> &RwLock<Slot> {
        match chain {
            ChainId::Hot => &self.hot,
            ChainId::Cold => &self.cold,
        }
    }

    fn config(&self, chain: ChainId) -> &ChainConfig {
        match chain {
            ChainId::Hot => &self.hot_config,
            ChainId::Cold => &self.cold_config,
        }
    }

    /// Current lifecycle state of one chain's slot.
    pub async fn state(&self, chain: ChainId) -> SessionState {
        self.slot(chain).read().await.state()
    }

    /// Establish a session for one chain. A failure here never touches
    /// the other chain's slot.
    pub async fn connect(&self, chain: ChainId) -> Result<(), ChainError> {
        *self.slot(chain).write().await = Slot::Connecting;

        // The slot lock is not held across the handshake: calls arriving
        // while it runs observe Connecting and fail fast with NotConnected
        // instead of queueing behind a slow peer.
        let result = self.connector.open(self.config(chain)).await;

        let mut slot = self.slot(chain).write().await;
        match result {
            Ok(session) => {
                info!("Connected to {chain} chain");
                *slot = Slot::Connected(Arc::new(session));
                Ok(())
            }
            Err(e) => {
                error!("Failed to connect to {chain} chain: {e}");
                *slot = Slot::Disconnected;
                Err(e)
            }
        }
    }

    /// Connect both chains concurrently. Hot and cold are independent
    /// work: neither waits on nor rolls back the other, so one chain may
    /// come up degraded while the other fails.
    pub async fn connect_all(&self) -> ConnectReport {
        let (hot, cold) = tokio::join!(self.connect(ChainId::Hot), self.connect(ChainId::Cold));
        ConnectReport { hot, cold }
    }

    async fn session(&self, chain: ChainId) -> Result<Arc<ChainSession>, ChainError> {
        match &*self.slot(chain).read().await {
            Slot::Connected(session) => Ok(Arc::clone(session)),
            _ => Err(ChainError::NotConnected { chain }),
        }
    }

    /// Contract handle bound to the chain's current session.
    pub async fn contract(&self, chain: ChainId, name: &str) -> Result<Contract, ChainError> {
        Ok(Contract {
            session: self.session(chain).await?,
            name: name.to_string(),
            deadlines: self.deadlines,
        })
    }

    /// Submit a write transaction through the named contract.
    pub async fn submit(
        &self,
        chain: ChainId,
        contract: &str,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>, ChainError> {
        self.contract(chain, contract).await?.submit(function, args).await
    }

    /// Evaluate a read-only query through the named contract.
    pub async fn evaluate(
        &self,
        chain: ChainId,
        contract: &str,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>, ChainError> {
        self.contract(chain, contract).await?.evaluate(function, args).await
    }

    /// Close both sessions if present. Best effort: one chain's close
    /// failure never prevents attempting the other.
    pub async fn disconnect(&self) {
        for chain in [ChainId::Hot, ChainId::Cold] {
            let previous = {
                let mut slot = self.slot(chain).write().await;
                std::mem::replace(&mut *slot, Slot::Disconnected)
            };
            match previous {
                Slot::Connected(session) => match session.transport().close().await {
                    Ok(()) => info!("Disconnected from {chain} chain"),
                    Err(e) => warn!("Error closing {chain} chain session: {e}"),
                },
                _ => info!("{chain} chain already disconnected"),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chain::signer::tests::test_identity;
    use crate::chain::transport::{
        CommitOutcome, EndorsedProposal, PeerTransport, TransactionProposal,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    pub(crate) fn test_config(chain: ChainId) -> ChainConfig {
        let (endpoint, alias, channel) = match chain {
            ChainId::Hot => ("localhost:7051", "peer0.lab.hot.dfir.local", "evidence-hot"),
            ChainId::Cold => ("localhost:9051", "peer0.lab.cold.dfir.local", "evidence-cold"),
        };
        ChainConfig {
            chain,
            peer_endpoint: endpoint.to_string(),
            peer_host_alias: alias.to_string(),
            tls_cert_path: "/dev/null".to_string(),
            cert_path: "/dev/null".to_string(),
            key_path: "/dev/null".to_string(),
            msp_id: "ForensicLabMSP".to_string(),
            channel_name: channel.to_string(),
        }
    }

    /// Counting transport with configurable phase delays and response.
    pub(crate) struct MockTransport {
        pub response: Vec<u8>,
        pub evaluate_delay: Duration,
        pub endorse_delay: Duration,
        pub commit_delay: Duration,
        pub commit_ok: bool,
        pub fail_close: bool,
        pub invocations: AtomicUsize,
        pub closed: AtomicBool,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self {
                response: b"{}".to_vec(),
                evaluate_delay: Duration::ZERO,
                endorse_delay: Duration::ZERO,
                commit_delay: Duration::ZERO,
                commit_ok: true,
                fail_close: false,
                invocations: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl PeerTransport for Arc<MockTransport> {
        async fn evaluate(
            &self,
            _proposal: &TransactionProposal,
        ) -> Result<Vec<u8>, TransportError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.evaluate_delay).await;
            Ok(self.response.clone())
        }

        async fn endorse(
            &self,
            proposal: &TransactionProposal,
        ) -> Result<EndorsedProposal, TransportError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.endorse_delay).await;
            Ok(EndorsedProposal {
                tx_id: proposal.tx_id.clone(),
                payload: self.response.clone(),
            })
        }

        async fn submit(&self, _endorsed: &EndorsedProposal) -> Result<(), TransportError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn commit_status(&self, tx_id: &str) -> Result<CommitOutcome, TransportError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.commit_delay).await;
            Ok(CommitOutcome {
                tx_id: tx_id.to_string(),
                committed: self.commit_ok,
                detail: if self.commit_ok {
                    String::new()
                } else {
                    "ENDORSEMENT_POLICY_FAILURE".to_string()
                },
            })
        }

        async fn close(&self) -> Result<(), TransportError> {
            self.closed.store(true, Ordering::SeqCst);
            if self.fail_close {
                return Err(TransportError::Tls("close failed".to_string()));
            }
            Ok(())
        }
    }

    /// Connector handing out sessions over mock transports, with optional
    /// per-chain failure.
    pub(crate) struct MockConnector {
        pub hot: Option<Arc<MockTransport>>,
        pub cold: Option<Arc<MockTransport>>,
        pub connect_delay: Duration,
    }

    #[async_trait]
    impl ChainConnector for MockConnector {
        async fn open(&self, config: &ChainConfig) -> Result<ChainSession, ChainError> {
            tokio::time::sleep(self.connect_delay).await;
            let transport = match config.chain {
                ChainId::Hot => self.hot.clone(),
                ChainId::Cold => self.cold.clone(),
            };
            match transport {
                Some(t) => Ok(ChainSession::new(
                    config.chain,
                    config.channel_name.clone(),
                    test_identity(&config.msp_id),
                    Box::new(t),
                )),
                None => Err(ChainError::ConnectionFailed {
                    chain: config.chain,
                    reason: "peer unreachable".to_string(),
                }),
            }
        }
    }

    pub(crate) fn manager_with(
        hot: Option<Arc<MockTransport>>,
        cold: Option<Arc<MockTransport>>,
        deadlines: Deadlines,
    ) -> ChainSessionManager {
        ChainSessionManager::with_connector(
            test_config(ChainId::Hot),
            test_config(ChainId::Cold),
            Arc::new(MockConnector {
                hot,
                cold,
                connect_delay: Duration::ZERO,
            }),
            deadlines,
        )
    }

    fn fast_deadlines() -> Deadlines {
        Deadlines {
            evaluate: Duration::from_millis(20),
            endorse: Duration::from_millis(20),
            submit: Duration::from_millis(20),
            commit_status: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn operations_require_a_live_session() {
        let manager = manager_with(Some(Arc::new(MockTransport::default())), None, fast_deadlines());
        let err = manager
            .evaluate(ChainId::Hot, "custody", "ReadEvidence", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::NotConnected { chain: ChainId::Hot }));
    }

    #[tokio::test]
    async fn partial_connect_leaves_survivor_usable() {
        // Scenario: hot connects, cold is unreachable. The report carries
        // both outcomes and the hot session keeps serving calls.
        let hot = Arc::new(MockTransport::default());
        let manager = manager_with(Some(hot.clone()), None, fast_deadlines());

        let report = manager.connect_all().await;
        assert!(report.hot.is_ok());
        assert!(matches!(
            &report.cold,
            Err(ChainError::ConnectionFailed { chain: ChainId::Cold, .. })
        ));
        assert!(report.any_connected());
        assert!(!report.all_connected());

        assert_eq!(manager.state(ChainId::Hot).await, SessionState::Connected);
        assert_eq!(manager.state(ChainId::Cold).await, SessionState::Disconnected);

        let bytes = manager
            .evaluate(ChainId::Hot, "custody", "ReadEvidence", &["EV-1".to_string()])
            .await
            .unwrap();
        assert_eq!(bytes, b"{}");
    }

    #[tokio::test]
    async fn slow_handshake_is_observable_and_does_not_block_calls() {
        let manager = Arc::new(ChainSessionManager::with_connector(
            test_config(ChainId::Hot),
            test_config(ChainId::Cold),
            Arc::new(MockConnector {
                hot: Some(Arc::new(MockTransport::default())),
                cold: None,
                connect_delay: Duration::from_millis(80),
            }),
            fast_deadlines(),
        ));

        let connecting = Arc::clone(&manager);
        let handshake = tokio::spawn(async move { connecting.connect(ChainId::Hot).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Mid-handshake the slot reports Connecting, and a call on the
        // same chain fails fast rather than queueing behind the connect.
        assert_eq!(manager.state(ChainId::Hot).await, SessionState::Connecting);
        let err = manager
            .evaluate(ChainId::Hot, "custody", "ReadEvidence", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::NotConnected { chain: ChainId::Hot }));

        handshake.await.unwrap().unwrap();
        assert_eq!(manager.state(ChainId::Hot).await, SessionState::Connected);
    }

    #[tokio::test]
    async fn evaluate_has_its_own_deadline_tier() {
        let hot = Arc::new(MockTransport {
            evaluate_delay: Duration::from_millis(80),
            ..MockTransport::default()
        });
        let deadlines = Deadlines {
            evaluate: Duration::from_millis(20),
            // The submit tiers are generous; only the evaluate tier may trip.
            endorse: Duration::from_secs(5),
            submit: Duration::from_secs(5),
            commit_status: Duration::from_secs(5),
        };
        let manager = manager_with(Some(hot.clone()), None, deadlines);
        manager.connect(ChainId::Hot).await.unwrap();

        let err = manager
            .evaluate(ChainId::Hot, "custody", "ReadEvidence", &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChainError::Timeout { chain: ChainId::Hot, phase: TxPhase::Evaluate }
        ));

        // A submit through the same session still succeeds: the timeout
        // neither tore down the session nor leaked into other tiers.
        assert_eq!(manager.state(ChainId::Hot).await, SessionState::Connected);
        let bytes = manager
            .submit(ChainId::Hot, "custody", "CreateEvidence", &["EV-2".to_string()])
            .await
            .unwrap();
        assert_eq!(bytes, b"{}");
    }

    #[tokio::test]
    async fn commit_phase_deadline_is_distinct_from_endorse() {
        let hot = Arc::new(MockTransport {
            commit_delay: Duration::from_millis(80),
            ..MockTransport::default()
        });
        let deadlines = Deadlines {
            evaluate: Duration::from_secs(5),
            endorse: Duration::from_secs(5),
            submit: Duration::from_secs(5),
            commit_status: Duration::from_millis(20),
        };
        let manager = manager_with(Some(hot.clone()), None, deadlines);
        manager.connect(ChainId::Hot).await.unwrap();

        let err = manager
            .submit(ChainId::Hot, "custody", "CreateEvidence", &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChainError::Timeout { chain: ChainId::Hot, phase: TxPhase::CommitStatus }
        ));
        // Endorse and submit phases ran before the commit wait tripped.
        assert_eq!(hot.invocations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_commit_is_not_a_timeout() {
        let hot = Arc::new(MockTransport {
            commit_ok: false,
            ..MockTransport::default()
        });
        let manager = manager_with(Some(hot), None, fast_deadlines());
        manager.connect(ChainId::Hot).await.unwrap();

        let err = manager
            .submit(ChainId::Hot, "custody", "CreateEvidence", &[])
            .await
            .unwrap_err();
        match err {
            ChainError::NotCommitted { chain, reason, .. } => {
                assert_eq!(chain, ChainId::Hot);
                assert_eq!(reason, "ENDORSEMENT_POLICY_FAILURE");
            }
            other => panic!("expected NotCommitted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_is_best_effort_per_chain() {
        let hot = Arc::new(MockTransport {
            fail_close: true,
            ..MockTransport::default()
        });
        let cold = Arc::new(MockTransport::default());
        let manager = manager_with(Some(hot.clone()), Some(cold.clone()), fast_deadlines());
        let report = manager.connect_all().await;
        assert!(report.all_connected());

        manager.disconnect().await;

        // The hot close failed, but the cold close was still attempted.
        assert!(hot.closed.load(Ordering::SeqCst));
        assert!(cold.closed.load(Ordering::SeqCst));
        assert_eq!(manager.state(ChainId::Hot).await, SessionState::Disconnected);
        assert_eq!(manager.state(ChainId::Cold).await, SessionState::Disconnected);
    }
}
