//! Message stream over one HTTP/2 stream
//!
//! Frames are length-prefixed and decoded out of a single receive buffer;
//! HTTP/2 DATA chunk boundaries carry no meaning, a frame may span several
//! chunks and a chunk may carry several frames.

use bytes::{Bytes, BytesMut};
use h2::{RecvStream, SendStream};
use harbormaster_proto::{EdgeCodec, EdgeMessage};
use harbormaster_transport::{TransportError, TransportResult, TransportStream};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::connection::TrafficCounters;

pub struct GrpcStream {
    send: SendStream<Bytes>,
    recv: RecvStream,
    id: u64,
    inbound: BytesMut,
    eof: bool,
    fin_sent: bool,
    counters: Arc<TrafficCounters>,
}

impl std::fmt::Debug for GrpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcStream")
            .field("id", &self.id)
            .field("buffered", &self.inbound.len())
            .field("eof", &self.eof)
            .finish()
    }
}

impl GrpcStream {
    pub(crate) fn new(
        send: SendStream<Bytes>,
        recv: RecvStream,
        id: u32,
        counters: Arc<TrafficCounters>,
    ) -> Self {
        Self {
            send,
            recv,
            id: id as u64,
            inbound: BytesMut::new(),
            eof: false,
            fin_sent: false,
            counters,
        }
    }

    /// Pull the next DATA chunk into the receive buffer
    ///
    /// Returns `false` once the peer has finished sending.
    async fn fill_inbound(&mut self) -> TransportResult<bool> {
        if self.eof {
            return Ok(false);
        }
        match self.recv.data().await {
            Some(Ok(chunk)) => {
                // Release flow-control credit as soon as the bytes are buffered
                let _ = self.recv.flow_control().release_capacity(chunk.len());
                self.counters
                    .received
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                self.inbound.extend_from_slice(&chunk);
                Ok(true)
            }
            Some(Err(e)) => {
                self.eof = true;
                Err(TransportError::ConnectionError(format!(
                    "Stream receive failed: {}",
                    e
                )))
            }
            None => {
                self.eof = true;
                Ok(false)
            }
        }
    }

    fn write(&mut self, data: Bytes, end_of_stream: bool) -> TransportResult<()> {
        if self.fin_sent {
            return Err(TransportError::StreamClosed);
        }
        self.send.reserve_capacity(data.len());
        self.counters
            .sent
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        self.send
            .send_data(data, end_of_stream)
            .map_err(|e| TransportError::ConnectionError(format!("Stream send failed: {}", e)))
    }
}

#[async_trait::async_trait]
impl TransportStream for GrpcStream {
    async fn send_message(&mut self, message: &EdgeMessage) -> TransportResult<()> {
        let frame = EdgeCodec::encode(message)
            .map_err(|e| TransportError::ProtocolError(e.to_string()))?;
        self.write(Bytes::from(frame), false)
    }

    async fn recv_message(&mut self) -> TransportResult<Option<EdgeMessage>> {
        loop {
            if let Some(message) = EdgeCodec::decode(&mut self.inbound)
                .map_err(|e| TransportError::ProtocolError(e.to_string()))?
            {
                return Ok(Some(message));
            }
            if !self.fill_inbound().await? {
                return if self.inbound.is_empty() {
                    Ok(None)
                } else {
                    Err(TransportError::ProtocolError(
                        "Stream ended inside a frame".to_string(),
                    ))
                };
            }
        }
    }

    async fn send_bytes(&mut self, data: &[u8]) -> TransportResult<()> {
        self.write(Bytes::copy_from_slice(data), false)
    }

    async fn recv_bytes(&mut self, max_size: usize) -> TransportResult<Bytes> {
        if self.inbound.is_empty() && !self.fill_inbound().await? {
            return Ok(Bytes::new());
        }
        let take = self.inbound.len().min(max_size);
        Ok(self.inbound.split_to(take).freeze())
    }

    async fn finish(&mut self) -> TransportResult<()> {
        self.write(Bytes::new(), true)?;
        self.fin_sent = true;
        Ok(())
    }

    fn stream_id(&self) -> u64 {
        self.id
    }

    fn is_closed(&self) -> bool {
        self.fin_sent || self.eof
    }
}
