//! Connection lifecycle for the edge transport
//!
//! One `GrpcConnection` wraps one TLS+HTTP/2 session, inbound or outbound.
//! The h2 state machine runs on a background driver task owned by the
//! connection; tearing the connection down aborts that task, which drops the
//! h2 state machine and the TLS stream under it, so the peer observes EOF
//! instead of a silently stalled session.

use async_trait::async_trait;
use bytes::Bytes;
use h2::client::SendRequest;
use h2::server::SendResponse;
use h2::RecvStream;
use harbormaster_transport::{
    ConnectionStats, TransportConnection, TransportError, TransportResult,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::stream::GrpcStream;

/// Byte counters shared between a connection and its streams
#[derive(Debug, Default)]
pub(crate) struct TrafficCounters {
    pub(crate) sent: AtomicU64,
    pub(crate) received: AtomicU64,
}

/// A stream the peer opened, waiting for our 200 response
type PendingStream = (SendResponse<Bytes>, RecvStream);

/// What this end of the session may do with streams
enum Role {
    /// Accepted from an agent; the driver hands new streams through the channel
    Inbound(Mutex<mpsc::Receiver<PendingStream>>),
    /// Dialed by an agent; streams are opened on the h2 request handle
    Outbound(Mutex<SendRequest<Bytes>>),
}

/// One TLS+HTTP/2 session
pub struct GrpcConnection {
    id: String,
    remote_addr: SocketAddr,
    role: Role,
    driver: JoinHandle<()>,
    closed: Arc<AtomicBool>,
    counters: Arc<TrafficCounters>,
    streams_opened: AtomicUsize,
    established_at: Instant,
}

impl std::fmt::Debug for GrpcConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcConnection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field(
                "role",
                match self.role {
                    Role::Inbound(_) => &"inbound",
                    Role::Outbound(_) => &"outbound",
                },
            )
            .finish()
    }
}

impl GrpcConnection {
    /// Server side: take an accepted TLS stream through the HTTP/2 handshake
    pub async fn inbound<T>(io: T, remote_addr: SocketAddr) -> TransportResult<Self>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut session = h2::server::handshake(io).await.map_err(|e| {
            TransportError::ConnectionError(format!("HTTP/2 handshake failed: {}", e))
        })?;

        let id = format!("edge-in-{}", uuid::Uuid::new_v4());
        let closed = Arc::new(AtomicBool::new(false));
        let (pending_tx, pending_rx) = mpsc::channel(32);

        let driver = tokio::spawn({
            let id = id.clone();
            let closed = closed.clone();
            async move {
                while let Some(next) = session.accept().await {
                    match next {
                        Ok((request, responder)) => {
                            if pending_tx
                                .send((responder, request.into_body()))
                                .await
                                .is_err()
                            {
                                // Connection handle dropped, nobody to accept
                                break;
                            }
                        }
                        Err(e) => {
                            debug!(connection = %id, "HTTP/2 session ended: {}", e);
                            break;
                        }
                    }
                }
                closed.store(true, Ordering::SeqCst);
            }
        });

        Ok(Self {
            id,
            remote_addr,
            role: Role::Inbound(Mutex::new(pending_rx)),
            driver,
            closed,
            counters: Arc::default(),
            streams_opened: AtomicUsize::new(0),
            established_at: Instant::now(),
        })
    }

    /// Client side: take a connected TLS stream through the HTTP/2 handshake
    pub async fn outbound<T>(io: T, remote_addr: SocketAddr) -> TransportResult<Self>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (requests, session) = h2::client::handshake(io).await.map_err(|e| {
            TransportError::ConnectionError(format!("HTTP/2 handshake failed: {}", e))
        })?;

        let id = format!("edge-out-{}", uuid::Uuid::new_v4());
        let closed = Arc::new(AtomicBool::new(false));

        let driver = tokio::spawn({
            let id = id.clone();
            let closed = closed.clone();
            async move {
                if let Err(e) = session.await {
                    // GOAWAY and socket EOF are the normal ways out
                    if !e.is_go_away() && !e.is_io() {
                        warn!(connection = %id, "HTTP/2 session error: {}", e);
                    }
                }
                closed.store(true, Ordering::SeqCst);
            }
        });

        Ok(Self {
            id,
            remote_addr,
            role: Role::Outbound(Mutex::new(requests)),
            driver,
            closed,
            counters: Arc::default(),
            streams_opened: AtomicUsize::new(0),
            established_at: Instant::now(),
        })
    }

    /// Tear the session down without waiting for in-flight streams
    ///
    /// Aborting the driver drops the h2 state machine and with it the TLS
    /// stream, closing the socket. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.driver.abort();
        debug!(connection = %self.id, "Connection torn down");
    }
}

impl Drop for GrpcConnection {
    fn drop(&mut self) {
        // The driver must not outlive the connection handle
        self.driver.abort();
    }
}

#[async_trait]
impl TransportConnection for GrpcConnection {
    type Stream = GrpcStream;

    async fn open_stream(&self) -> TransportResult<Self::Stream> {
        let Role::Outbound(requests) = &self.role else {
            return Err(TransportError::ProtocolError(
                "Inbound connections cannot initiate streams".to_string(),
            ));
        };

        if self.is_closed() {
            return Err(TransportError::ConnectionError(
                "Connection closed".to_string(),
            ));
        }

        // Clone the shared handle so concurrent opens do not serialize on
        // the lock while waiting for stream capacity
        let handle = requests.lock().await.clone();
        let mut handle = handle.ready().await.map_err(|e| {
            TransportError::ConnectionError(format!("HTTP/2 connection not ready: {}", e))
        })?;

        let request = http::Request::post("https://harbormaster/edge.EdgeService/Tunnel")
            .body(())
            .map_err(|e| TransportError::ProtocolError(e.to_string()))?;

        let (response, sender) = handle.send_request(request, false).map_err(|e| {
            TransportError::ConnectionError(format!("Failed to open stream: {}", e))
        })?;
        let stream_id = sender.stream_id().as_u32();

        let response = response.await.map_err(|e| {
            TransportError::ConnectionError(format!("No response for new stream: {}", e))
        })?;
        if !response.status().is_success() {
            return Err(TransportError::ConnectionError(format!(
                "Peer refused stream: {}",
                response.status()
            )));
        }

        self.streams_opened.fetch_add(1, Ordering::Relaxed);
        debug!(connection = %self.id, stream_id, "Opened stream");

        Ok(GrpcStream::new(
            sender,
            response.into_body(),
            stream_id,
            self.counters.clone(),
        ))
    }

    async fn accept_stream(&self) -> TransportResult<Option<Self::Stream>> {
        let Role::Inbound(pending) = &self.role else {
            return Err(TransportError::ProtocolError(
                "Outbound connections do not accept streams".to_string(),
            ));
        };

        let next = pending.lock().await.recv().await;
        let Some((mut responder, body)) = next else {
            // Driver gone, session over
            return Ok(None);
        };

        let ok = http::Response::builder()
            .status(200)
            .body(())
            .map_err(|e| TransportError::ProtocolError(e.to_string()))?;
        let sender = responder.send_response(ok, false).map_err(|e| {
            TransportError::ConnectionError(format!("Failed to answer stream: {}", e))
        })?;
        let stream_id = sender.stream_id().as_u32();

        self.streams_opened.fetch_add(1, Ordering::Relaxed);
        debug!(connection = %self.id, stream_id, "Accepted stream");

        Ok(Some(GrpcStream::new(
            sender,
            body,
            stream_id,
            self.counters.clone(),
        )))
    }

    async fn close(&self, _error_code: u32, reason: &str) {
        debug!(connection = %self.id, reason = %reason, "Closing connection");
        self.shutdown();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn remote_address(&self) -> SocketAddr {
        self.remote_addr
    }

    fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            bytes_sent: self.counters.sent.load(Ordering::Relaxed),
            bytes_received: self.counters.received.load(Ordering::Relaxed),
            active_streams: self.streams_opened.load(Ordering::Relaxed),
            rtt_ms: None,
            uptime_secs: self.established_at.elapsed().as_secs(),
        }
    }

    fn connection_id(&self) -> String {
        self.id.clone()
    }
}
