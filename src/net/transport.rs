//! Transport boundary
//!
//! The producer owns exactly one transport handle at a time and serializes
//! all access to it; implementations only need to move bytes.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// A point-to-point packet transport
#[async_trait]
pub trait PacketTransport: Send {
    /// Establish the connection. Must leave the handle fresh on failure.
    async fn connect(&mut self, endpoint: &str) -> Result<()>;

    /// Transmit one framed packet.
    async fn send(&mut self, payload: Bytes) -> Result<()>;

    /// Graceful close. Idempotent.
    async fn close(&mut self);

    /// Drop any live connection state, leaving a fresh handle. Called after
    /// failures so the next connect starts clean.
    fn reset(&mut self);
}

/// TCP transport carrying pre-framed packets
#[derive(Default)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PacketTransport for TcpTransport {
    async fn connect(&mut self, endpoint: &str) -> Result<()> {
        self.stream = None;
        let stream = TcpStream::connect(endpoint)
            .await
            .map_err(|e| PipelineError::Transport(format!("connect {}: {}", endpoint, e)))?;
        // Encoded packets are latency-sensitive; never batch them
        stream
            .set_nodelay(true)
            .map_err(|e| PipelineError::Transport(format!("set nodelay: {}", e)))?;
        debug!("Connected to {}", endpoint);
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, payload: Bytes) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| PipelineError::Transport("transport not connected".into()))?;
        stream
            .write_all(&payload)
            .await
            .map_err(|e| PipelineError::Transport(format!("write: {}", e)))
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!("Transport closed");
        }
    }

    fn reset(&mut self) {
        self.stream = None;
    }
}
