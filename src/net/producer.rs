//! Network producer
//!
//! Owns the transport connection, serializes encoded packets onto the wire,
//! and sheds video load when the transport cannot keep pace. Connection
//! state, the transport handle, and the backpressure bookkeeping all live
//! behind one mutex so connect, write, and disconnect never interleave on
//! the shared handle.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{info, warn};

use super::transport::PacketTransport;
use crate::error::{PipelineError, Result};
use crate::events::{EventBus, PipelineEvent};
use crate::utils::LogThrottler;
use crate::video::EncodedPacket;

/// Elapsed time between video transmissions that flags backpressure
const DEFAULT_MAX_VIDEO_BACKLOG: Duration = Duration::from_millis(500);
/// Sampling modulus while backpressured: one video packet in N is kept
const DEFAULT_KEEP_ONE_IN: u32 = 3;

/// Connection lifecycle state
///
/// Transitions are one-directional except `Erred`, which only an explicit
/// disconnect (then reconnect) recovers from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Erred,
}

/// Producer configuration
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Video transmission gap beyond which backpressure is flagged
    pub max_video_backlog: Duration,
    /// Keep one video packet in this many while backpressured
    pub keep_one_in: u32,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            max_video_backlog: DEFAULT_MAX_VIDEO_BACKLOG,
            keep_one_in: DEFAULT_KEEP_ONE_IN,
        }
    }
}

/// Producer statistics
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ProducerStats {
    /// Packets transmitted
    pub packets_sent: u64,
    /// Video packets shed by the backpressure policy
    pub video_dropped: u64,
    /// Packets discarded because the producer was not connected
    pub discarded: u64,
    /// Whether backpressure is currently flagged
    pub backpressured: bool,
}

/// State guarded by the producer mutex
struct ProducerInner {
    transport: Box<dyn PacketTransport>,
    /// When the last video packet was transmitted
    last_video_sent: Option<Instant>,
    backpressured: bool,
    /// Video packets seen since backpressure started
    shed_counter: u32,
}

/// Serializes encoded packets onto an owned transport connection
pub struct NetworkProducer {
    config: ProducerConfig,
    inner: Mutex<ProducerInner>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    events: Arc<EventBus>,
    packets_sent: AtomicU64,
    video_dropped: AtomicU64,
    discarded: AtomicU64,
    backpressure_flag: AtomicBool,
    drop_warnings: LogThrottler,
}

impl NetworkProducer {
    pub fn new(transport: Box<dyn PacketTransport>, events: Arc<EventBus>) -> Self {
        Self::with_config(transport, events, ProducerConfig::default())
    }

    pub fn with_config(
        transport: Box<dyn PacketTransport>,
        events: Arc<EventBus>,
        config: ProducerConfig,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            inner: Mutex::new(ProducerInner {
                transport,
                last_video_sent: None,
                backpressured: false,
                shed_counter: 0,
            }),
            state_tx,
            state_rx,
            events,
            packets_sent: AtomicU64::new(0),
            video_dropped: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            backpressure_flag: AtomicBool::new(false),
            drop_warnings: LogThrottler::with_secs(5),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection state changes
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn stats(&self) -> ProducerStats {
        ProducerStats {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            video_dropped: self.video_dropped.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            backpressured: self.backpressure_flag.load(Ordering::Relaxed),
        }
    }

    /// Connect to `endpoint`. On failure the transport handle is reset and a
    /// failure notification fires before the error propagates.
    ///
    /// `Erred` only transitions to `Disconnected` through an explicit
    /// [`Self::disconnect`]; connecting straight from `Erred` is rejected.
    pub async fn connect(&self, endpoint: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match self.state() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Erred => {
                return Err(PipelineError::Transport(
                    "connection erred; disconnect before reconnecting".into(),
                ))
            }
            _ => {}
        }

        let _ = self.state_tx.send(ConnectionState::Connecting);
        match inner.transport.connect(endpoint).await {
            Ok(()) => {
                inner.last_video_sent = None;
                inner.backpressured = false;
                inner.shed_counter = 0;
                self.backpressure_flag.store(false, Ordering::Relaxed);
                let _ = self.state_tx.send(ConnectionState::Connected);
                info!("Producer connected to {}", endpoint);
                self.events.publish(PipelineEvent::ConnectionEstablished {
                    endpoint: endpoint.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                inner.transport.reset();
                let _ = self.state_tx.send(ConnectionState::Disconnected);
                warn!("Producer connect to {} failed: {}", endpoint, e);
                self.events.publish(PipelineEvent::ConnectionFailed {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Write one encoded packet.
    ///
    /// Not connected (including `Erred`) discards the packet silently: a
    /// real-time stream prefers shedding to stalling, so this is a
    /// warning-level condition, not a fault. Transport failure transitions
    /// to `Erred`, recreates the handle, notifies listeners, and propagates.
    pub async fn write(&self, packet: EncodedPacket) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if self.state() != ConnectionState::Connected {
            if self.drop_warnings.should_log("write_not_connected") {
                warn!("Discarding packet: producer not connected");
            }
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        if packet.is_video {
            let now = Instant::now();
            let over_backlog = inner
                .last_video_sent
                .is_some_and(|sent| now.duration_since(sent) > self.config.max_video_backlog);

            if over_backlog != inner.backpressured {
                inner.backpressured = over_backlog;
                if !over_backlog {
                    inner.shed_counter = 0;
                }
                self.backpressure_flag.store(over_backlog, Ordering::Relaxed);
                if over_backlog {
                    warn!(
                        "Video backlog exceeded {:?}, shedding 1 of {}",
                        self.config.max_video_backlog, self.config.keep_one_in
                    );
                } else {
                    info!("Video backpressure cleared");
                }
                self.events
                    .publish(PipelineEvent::BackpressureChanged { active: over_backlog });
            }

            if inner.backpressured {
                inner.shed_counter += 1;
                if inner.shed_counter % self.config.keep_one_in != 0 {
                    self.video_dropped.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
            }

            self.transmit(&mut inner, packet).await?;
            inner.last_video_sent = Some(now);
            Ok(())
        } else {
            // Non-video units carry codec state; never shed them
            self.transmit(&mut inner, packet).await
        }
    }

    async fn transmit(&self, inner: &mut ProducerInner, packet: EncodedPacket) -> Result<()> {
        match inner.transport.send(packet.to_wire()).await {
            Ok(()) => {
                self.packets_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                let _ = self.state_tx.send(ConnectionState::Erred);
                inner.transport.reset();
                warn!("Transport write failed, connection erred: {}", e);
                self.events.publish(PipelineEvent::ConnectionLost {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Tear down the transport and return to `Disconnected`. Idempotent and
    /// safe to call from `Erred`.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        inner.transport.close().await;
        inner.last_video_sent = None;
        inner.backpressured = false;
        inner.shed_counter = 0;
        self.backpressure_flag.store(false, Ordering::Relaxed);
        if self.state() != ConnectionState::Disconnected {
            let _ = self.state_tx.send(ConnectionState::Disconnected);
            info!("Producer disconnected");
        }
    }
}
