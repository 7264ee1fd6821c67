//! Peer wire layer.
//!
//! [`PeerTransport`] abstracts the four ledger operations a session needs
//! (evaluate, endorse, submit, commit status) so the manager can be tested
//! against mock peers. The production implementation speaks
//! length-prefixed JSON frames over the chain's mutually authenticated
//! TLS stream.
//!
//! Every request frame carries a request id and a background reader task
//! dispatches reply frames to their callers by that id. Any number of
//! calls may therefore be in flight on one connection, and a reply whose
//! caller has given up (a phase deadline, a dropped request) is discarded
//! instead of being delivered to the next call on the stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_native_tls::TlsStream;

use crate::chain::error::TransportError;

/// Largest frame accepted from a peer.
const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024; // 4 MB

/// A signed transaction proposal as sent to a peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionProposal {
    /// Unique transaction id (hex digest of the payload).
    pub tx_id: String,
    /// Channel the transaction is scoped to.
    pub channel: String,
    /// Target contract (chaincode) name.
    pub contract: String,
    /// Contract function to invoke.
    pub function: String,
    /// Positional string arguments.
    pub args: Vec<String>,
    /// MSP id of the submitting organization.
    pub msp_id: String,
    /// Submitter's enrollment certificate (PEM).
    pub creator_cert: String,
    /// DER ECDSA signature over the proposal payload, hex encoded.
    pub signature: String,
}

/// Result of a successful endorsement phase. The peer's simulated result
/// payload becomes the transaction response once the commit confirms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndorsedProposal {
    pub tx_id: String,
    /// Simulated transaction result from the endorsing peer.
    pub payload: Vec<u8>,
}

/// Outcome of the commit-status phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub tx_id: String,
    pub committed: bool,
    /// Peer-supplied detail, e.g. a validation code, when not committed.
    #[serde(default)]
    pub detail: String,
}

/// Ledger operations exposed by one chain's peer connection.
///
/// Implementations must be safe for concurrent use; a timed-out call must
/// leave the transport usable for subsequent calls.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Read-only query; no ordering or commit involved.
    async fn evaluate(&self, proposal: &TransactionProposal) -> Result<Vec<u8>, TransportError>;

    /// Endorsement phase: peer-side simulation and signing.
    async fn endorse(
        &self,
        proposal: &TransactionProposal,
    ) -> Result<EndorsedProposal, TransportError>;

    /// Submission phase: hand the endorsed transaction to ordering.
    async fn submit(&self, endorsed: &EndorsedProposal) -> Result<(), TransportError>;

    /// Commit-status phase: wait for the ledger commit confirmation.
    async fn commit_status(&self, tx_id: &str) -> Result<CommitOutcome, TransportError>;

    /// Close the underlying connection. Best effort.
    async fn close(&self) -> Result<(), TransportError>;
}

trait PeerStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T> PeerStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Operation part of a request frame.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum PeerRequest {
    Evaluate { proposal: TransactionProposal },
    Endorse { proposal: TransactionProposal },
    Submit { endorsed: EndorsedProposal },
    CommitStatus { tx_id: String },
}

/// Request frame sent to a peer: correlation id plus operation.
#[derive(Debug, Serialize, Deserialize)]
struct RequestFrame {
    id: u64,
    #[serde(flatten)]
    op: PeerRequest,
}

/// Reply frame received from a peer. The id echoes the request frame.
#[derive(Debug, Serialize, Deserialize)]
struct PeerReply {
    #[serde(default)]
    id: u64,
    ok: bool,
    #[serde(default)]
    tx_id: String,
    #[serde(default)]
    payload: Vec<u8>,
    #[serde(default)]
    committed: bool,
    #[serde(default)]
    detail: String,
    #[serde(default)]
    error: Option<String>,
}

type PendingMap = StdMutex<HashMap<u64, oneshot::Sender<PeerReply>>>;

fn lock_pending(
    pending: &PendingMap,
) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<PeerReply>>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

/// Removes a call's reply slot when the call completes or is abandoned.
/// A late reply then finds no slot and is discarded by the reader task
/// rather than answering whichever call comes next.
struct ReplySlot {
    id: u64,
    pending: Arc<PendingMap>,
}

impl Drop for ReplySlot {
    fn drop(&mut self) {
        lock_pending(&self.pending).remove(&self.id);
    }
}

struct WriteState {
    half: Option<WriteHalf<Box<dyn PeerStream>>>,
    /// Set for the duration of each frame write. Observing it set on
    /// entry means a cancelled call left a partial frame on the stream,
    /// after which the framing cannot be trusted.
    poisoned: bool,
}

/// Production transport over the chain's secured stream.
///
/// Each frame is a serialized request prefixed with a 4-byte big-endian
/// length, written from a single buffer in one call. Only the write of a
/// frame is serialized; replies are matched to callers by request id, so
/// calls multiplex freely on one connection.
pub struct TlsPeerTransport {
    writer: Mutex<WriteState>,
    pending: Arc<PendingMap>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl TlsPeerTransport {
    pub fn new(stream: TlsStream<TcpStream>) -> Self {
        Self::over(stream)
    }

    fn over<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let boxed: Box<dyn PeerStream> = Box::new(stream);
        let (read_half, write_half) = tokio::io::split(boxed);
        let pending: Arc<PendingMap> = Arc::new(StdMutex::new(HashMap::new()));
        let reader = tokio::spawn(read_replies(read_half, Arc::clone(&pending)));

        Self {
            writer: Mutex::new(WriteState {
                half: Some(write_half),
                poisoned: false,
            }),
            pending,
            next_id: AtomicU64::new(0),
            reader,
        }
    }

    async fn round_trip(&self, op: PeerRequest) -> Result<PeerReply, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::to_vec(&RequestFrame { id, op })
            .map_err(|e| TransportError::Frame(e.to_string()))?;

        // Header and body go out from one buffer in one write, so a call
        // cancelled mid-frame cannot interleave with another call's frame.
        let mut frame = Vec::with_capacity(4 + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(&body);

        let (reply_tx, reply_rx) = oneshot::channel();
        lock_pending(&self.pending).insert(id, reply_tx);
        let _slot = ReplySlot {
            id,
            pending: Arc::clone(&self.pending),
        };

        {
            let mut writer = self.writer.lock().await;
            let WriteState { half, poisoned } = &mut *writer;
            if *poisoned {
                return Err(TransportError::Tls(
                    "stream desynchronized by an interrupted write".to_string(),
                ));
            }
            let half = half
                .as_mut()
                .ok_or_else(|| TransportError::Tls("connection closed".to_string()))?;

            *poisoned = true;
            half.write_all(&frame).await?;
            half.flush().await?;
            *poisoned = false;
        }

        let reply = reply_rx.await.map_err(|_| {
            TransportError::Tls("connection closed while awaiting reply".to_string())
        })?;

        if !reply.ok {
            return Err(TransportError::Peer(
                reply
                    .error
                    .unwrap_or_else(|| "unspecified peer error".to_string()),
            ));
        }
        Ok(reply)
    }
}

impl Drop for TlsPeerTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Reads reply frames for one connection and dispatches them by id.
async fn read_replies(mut reader: ReadHalf<Box<dyn PeerStream>>, pending: Arc<PendingMap>) {
    loop {
        let mut len_buf = [0u8; 4];
        if reader.read_exact(&mut len_buf).await.is_err() {
            break;
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_SIZE {
            warn!("Peer reply frame of {len} bytes exceeds limit, closing connection");
            break;
        }

        let mut buf = vec![0u8; len];
        if reader.read_exact(&mut buf).await.is_err() {
            break;
        }

        let reply: PeerReply = match serde_json::from_slice(&buf) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Malformed peer reply frame, closing connection: {e}");
                break;
            }
        };

        let slot = lock_pending(&pending).remove(&reply.id);
        match slot {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => debug!("Discarding reply for abandoned request {}", reply.id),
        }
    }

    // Connection gone: wake any calls still waiting on a reply.
    lock_pending(&pending).clear();
}

#[async_trait]
impl PeerTransport for TlsPeerTransport {
    async fn evaluate(&self, proposal: &TransactionProposal) -> Result<Vec<u8>, TransportError> {
        let reply = self
            .round_trip(PeerRequest::Evaluate {
                proposal: proposal.clone(),
            })
            .await?;
        Ok(reply.payload)
    }

    async fn endorse(
        &self,
        proposal: &TransactionProposal,
    ) -> Result<EndorsedProposal, TransportError> {
        let reply = self
            .round_trip(PeerRequest::Endorse {
                proposal: proposal.clone(),
            })
            .await?;
        Ok(EndorsedProposal {
            tx_id: proposal.tx_id.clone(),
            payload: reply.payload,
        })
    }

    async fn submit(&self, endorsed: &EndorsedProposal) -> Result<(), TransportError> {
        self.round_trip(PeerRequest::Submit {
            endorsed: endorsed.clone(),
        })
        .await?;
        Ok(())
    }

    async fn commit_status(&self, tx_id: &str) -> Result<CommitOutcome, TransportError> {
        let reply = self
            .round_trip(PeerRequest::CommitStatus {
                tx_id: tx_id.to_string(),
            })
            .await?;
        Ok(CommitOutcome {
            tx_id: reply.tx_id,
            committed: reply.committed,
            detail: reply.detail,
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.reader.abort();
        let mut writer = self.writer.lock().await;
        if let Some(mut half) = writer.half.take() {
            half.shutdown().await?;
        }
        lock_pending(&self.pending).clear();
        Ok(())
    }
}
