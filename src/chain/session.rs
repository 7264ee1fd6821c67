//! Live chain sessions and their establishment.
//!
//! A [`ChainSession`] is the opaque handle for one chain: the secured peer
//! transport plus the signing identity and channel it is scoped to.
//! Sessions are created through the [`ChainConnector`] seam so the manager
//! can be exercised with mock connectors.

use async_trait::async_trait;
use log::{debug, info};
use rand_core::{OsRng, RngCore};
use tokio::net::TcpStream;

use crate::chain::config::{ChainConfig, ChainId};
use crate::chain::error::ChainError;
use crate::chain::signer::SigningIdentity;
use crate::chain::transport::{PeerTransport, TlsPeerTransport, TransactionProposal};

/// One chain's live session. Hot and cold sessions never share state.
pub struct ChainSession {
    chain: ChainId,
    channel: String,
    identity: SigningIdentity,
    transport: Box<dyn PeerTransport>,
}

impl ChainSession {
    pub fn new(
        chain: ChainId,
        channel: String,
        identity: SigningIdentity,
        transport: Box<dyn PeerTransport>,
    ) -> Self {
        Self {
            chain,
            channel,
            identity,
            transport,
        }
    }

    pub fn chain(&self) -> ChainId {
        self.chain
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn transport(&self) -> &dyn PeerTransport {
        self.transport.as_ref()
    }

    /// Build and sign a proposal for this session's channel.
    ///
    /// The transaction id is the digest of the proposal payload plus a
    /// random nonce, so repeated identical invocations stay distinct.
    pub fn proposal(
        &self,
        contract: &str,
        function: &str,
        args: &[String],
    ) -> TransactionProposal {
        let mut nonce = [0u8; 12];
        OsRng.fill_bytes(&mut nonce);

        let payload = proposal_payload(&self.channel, contract, function, args, &nonce);
        let tx_id = SigningIdentity::payload_digest(&payload);
        let signature = hex::encode(self.identity.sign(&payload));

        debug!(
            "Built proposal {} for {}/{} on {} chain",
            &tx_id[..8],
            contract,
            function,
            self.chain
        );

        TransactionProposal {
            tx_id,
            channel: self.channel.clone(),
            contract: contract.to_string(),
            function: function.to_string(),
            args: args.to_vec(),
            msp_id: self.identity.msp_id().to_string(),
            creator_cert: self.identity.certificate_pem().to_string(),
            signature,
        }
    }
}

/// Canonical byte encoding of a proposal for digesting and signing.
///
/// Every field is length-prefixed and the argument count is explicit, so
/// no two distinct proposals encode to the same bytes. Moving a byte
/// between adjacent arguments changes the encoding.
fn proposal_payload(
    channel: &str,
    contract: &str,
    function: &str,
    args: &[String],
    nonce: &[u8],
) -> Vec<u8> {
    let mut payload = Vec::new();
    for field in [channel, contract, function] {
        push_field(&mut payload, field.as_bytes());
    }
    payload.extend_from_slice(&(args.len() as u32).to_be_bytes());
    for arg in args {
        push_field(&mut payload, arg.as_bytes());
    }
    payload.extend_from_slice(nonce);
    payload
}

fn push_field(payload: &mut Vec<u8>, field: &[u8]) {
    payload.extend_from_slice(&(field.len() as u32).to_be_bytes());
    payload.extend_from_slice(field);
}

impl std::fmt::Debug for ChainSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainSession")
            .field("chain", &self.chain)
            .field("channel", &self.channel)
            .finish()
    }
}

/// Session establishment seam.
///
/// The production implementation performs credential reads and the TLS
/// handshake; tests substitute connectors that fail or hand out mock
/// transports.
#[async_trait]
pub trait ChainConnector: Send + Sync {
    async fn open(&self, config: &ChainConfig) -> Result<ChainSession, ChainError>;
}

/// Production connector: pinned-root TLS with host-alias verification.
pub struct TlsChainConnector;

#[async_trait]
impl ChainConnector for TlsChainConnector {
    async fn open(&self, config: &ChainConfig) -> Result<ChainSession, ChainError> {
        let chain = config.chain;
        let fail = |reason: String| ChainError::ConnectionFailed { chain, reason };

        // Credential artifacts: root trust anchor, enrollment cert, key.
        let tls_root = tokio::fs::read(&config.tls_cert_path)
            .await
            .map_err(|e| fail(format!("cannot read {}: {e}", config.tls_cert_path)))?;
        let cert_pem = tokio::fs::read(&config.cert_path)
            .await
            .map_err(|e| fail(format!("cannot read {}: {e}", config.cert_path)))?;
        let key_pem = tokio::fs::read(&config.key_path)
            .await
            .map_err(|e| fail(format!("cannot read {}: {e}", config.key_path)))?;

        let identity = SigningIdentity::from_pem(&config.msp_id, &cert_pem, &key_pem)
            .map_err(|e| fail(e.to_string()))?;

        // Trust only the chain's own root; verify the peer as its alias,
        // not as the endpoint address.
        let root = native_tls::Certificate::from_pem(&tls_root)
            .map_err(|e| fail(format!("invalid TLS root certificate: {e}")))?;
        let connector = native_tls::TlsConnector::builder()
            .add_root_certificate(root)
            .build()
            .map_err(|e| fail(e.to_string()))?;
        let connector = tokio_native_tls::TlsConnector::from(connector);

        let tcp = TcpStream::connect(&config.peer_endpoint)
            .await
            .map_err(|e| fail(format!("peer {} unreachable: {e}", config.peer_endpoint)))?;
        let tls = connector
            .connect(&config.peer_host_alias, tcp)
            .await
            .map_err(|e| fail(format!("TLS handshake failed: {e}")))?;

        info!(
            "Secured session to {} chain peer {} (alias {})",
            chain, config.peer_endpoint, config.peer_host_alias
        );

        Ok(ChainSession::new(
            chain,
            config.channel_name.clone(),
            identity,
            Box::new(TlsPeerTransport::new(tls)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::signer::tests::test_identity;
    use crate::chain::transport::{CommitOutcome, EndorsedProposal};
    use crate::chain::error::TransportError;

    struct NullTransport;

    #[async_trait]
    impl PeerTransport for NullTransport {
        async fn evaluate(
            &self,
            _proposal: &TransactionProposal,
        ) -> Result<Vec<u8>, TransportError> {
            Ok(Vec::new())
        }
        async fn endorse(
            &self,
            proposal: &TransactionProposal,
        ) -> Result<EndorsedProposal, TransportError> {
            Ok(EndorsedProposal {
                tx_id: proposal.tx_id.clone(),
                payload: Vec::new(),
            })
        }
        async fn submit(&self, _endorsed: &EndorsedProposal) -> Result<(), TransportError> {
            Ok(())
        }
        async fn commit_status(&self, tx_id: &str) -> Result<CommitOutcome, TransportError> {
            Ok(CommitOutcome {
                tx_id: tx_id.to_string(),
                committed: true,
                detail: String::new(),
            })
        }
        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn session() -> ChainSession {
        ChainSession::new(
            ChainId::Hot,
            "evidence-hot".to_string(),
            test_identity("ForensicLabMSP"),
            Box::new(NullTransport),
        )
    }

    #[test]
    fn proposal_carries_session_scope() {
        let s = session();
        let args = vec!["EV-1".to_string(), "sha256:feed".to_string()];
        let p = s.proposal("custody", "CreateEvidence", &args);

        assert_eq!(p.channel, "evidence-hot");
        assert_eq!(p.contract, "custody");
        assert_eq!(p.function, "CreateEvidence");
        assert_eq!(p.args, args);
        assert_eq!(p.msp_id, "ForensicLabMSP");
        assert_eq!(p.tx_id.len(), 64);
        assert!(!p.signature.is_empty());
    }

    #[test]
    fn signed_payload_distinguishes_argument_boundaries() {
        // Same concatenated bytes, different argument splits.
        let nonce = [7u8; 12];
        let left = proposal_payload(
            "evidence-hot",
            "custody",
            "CreateEvidence",
            &["ab".to_string(), "c".to_string()],
            &nonce,
        );
        let right = proposal_payload(
            "evidence-hot",
            "custody",
            "CreateEvidence",
            &["a".to_string(), "bc".to_string()],
            &nonce,
        );
        assert_ne!(left, right);
    }

    #[test]
    fn identical_invocations_get_distinct_tx_ids() {
        let s = session();
        let args = vec!["EV-1".to_string()];
        let a = s.proposal("custody", "ReadEvidence", &args);
        let b = s.proposal("custody", "ReadEvidence", &args);
        assert_ne!(a.tx_id, b.tx_id);
    }
}
