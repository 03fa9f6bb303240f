//! Frame relay: unbounded-rate capture signals in, bounded-rate rendered
//! frames out.
//!
//! Admission runs through the [`FramePacer`] before anything is queued; the
//! small render queue feeds one dedicated worker task that owns all render
//! state. The worker coalesces bursts down to the newest frame, applies the
//! current orientation transform, and presents the result to the encoder
//! sink with the original capture timestamp. An orientation change triggers
//! one immediate re-render of the retained frame.

pub mod pacer;

pub use pacer::{FramePacer, PacerStats};

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::capture::FrameSink;
use crate::orientation::OrientationTracker;
use crate::video::{Frame, RenderedFrame};

/// Render queue depth; admission already bounds the rate, this only absorbs
/// scheduling jitter
const DEFAULT_QUEUE_DEPTH: usize = 4;
/// Per-render drain cap for coalescing queued frames
const DEFAULT_DRAIN_LIMIT: usize = 3;
/// Default output frame-rate cap
const DEFAULT_MAX_FPS: u32 = 24;

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Output frame-rate cap; derives the minimum inter-frame interval
    pub max_fps: u32,
    /// Render queue depth
    pub queue_depth: usize,
    /// Maximum queued frames coalesced per render pass
    pub drain_limit: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_fps: DEFAULT_MAX_FPS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            drain_limit: DEFAULT_DRAIN_LIMIT,
        }
    }
}

impl RelayConfig {
    pub fn with_max_fps(mut self, fps: u32) -> Self {
        self.max_fps = fps;
        self
    }
}

/// Relay statistics; drops are policy, not errors
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RelayStats {
    /// Frame-available signals seen
    pub received: u64,
    /// Frames presented to the encoder (including orientation re-renders)
    pub processed: u64,
    /// Signals discarded by pacing, queue overflow, or coalescing
    pub dropped: u64,
}

/// The encoder input boundary: receives finished frames in submission order.
pub trait EncoderSink: Send {
    fn submit(&mut self, frame: RenderedFrame);
}

enum RenderMsg {
    Frame(Frame),
    /// Re-render the retained frame under the current orientation
    Refresh,
    Shutdown(oneshot::Sender<()>),
}

/// Forwards paced capture frames to the encoder through one render worker
pub struct FrameRelay {
    pacer: Arc<FramePacer>,
    tx: mpsc::Sender<RenderMsg>,
    processed: Arc<AtomicU64>,
    worker: Mutex<Option<JoinHandle<()>>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl FrameRelay {
    /// Spawn the render worker and the orientation-change forwarder.
    pub fn spawn(
        config: RelayConfig,
        tracker: Arc<OrientationTracker>,
        sink: Box<dyn EncoderSink>,
    ) -> Arc<Self> {
        let pacer = Arc::new(FramePacer::for_fps(config.max_fps));
        let processed = Arc::new(AtomicU64::new(0));
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));

        let worker = RenderWorker {
            rx,
            sink,
            tracker: tracker.clone(),
            pacer: pacer.clone(),
            processed: processed.clone(),
            drain_limit: config.drain_limit,
            last_frame: None,
        };
        let worker_handle = tokio::spawn(worker.run());

        // Orientation notifications are serialized onto the render context
        // instead of touching render state from the notifier's thread
        let forwarder_handle = {
            let tx = tx.clone();
            let mut sub = tracker.subscribe();
            tokio::spawn(async move {
                loop {
                    match sub.recv().await {
                        Ok(_) => {
                            if tx.send(RenderMsg::Refresh).await.is_err() {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            debug!("Orientation forwarder lagged by {}", n);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        };

        Arc::new(Self {
            pacer,
            tx,
            processed,
            worker: Mutex::new(Some(worker_handle)),
            forwarder: Mutex::new(Some(forwarder_handle)),
        })
    }

    /// Handle one upstream frame-available signal.
    ///
    /// Signals below the minimum inter-frame interval are discarded here,
    /// before entering any queue. Queue overflow also discards rather than
    /// waiting: the render worker always prefers fresher input.
    pub fn frame_available(&self, frame: Frame) {
        if !self.pacer.admit() {
            return;
        }
        match self.tx.try_send(RenderMsg::Frame(frame)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.pacer.count_late_drop();
                trace!("Render queue full, dropping admitted frame");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("Render worker gone, dropping frame");
            }
        }
    }

    pub fn stats(&self) -> RelayStats {
        let pacing = self.pacer.stats();
        RelayStats {
            received: pacing.received,
            processed: self.processed.load(Ordering::Relaxed),
            dropped: pacing.dropped,
        }
    }

    /// Drain the render worker and stop. Idempotent.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.forwarder.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.worker.lock().await.take() {
            let (ack_tx, ack_rx) = oneshot::channel();
            if self.tx.send(RenderMsg::Shutdown(ack_tx)).await.is_ok() {
                let _ = ack_rx.await;
            }
            let _ = handle.await;
        }
    }
}

impl FrameSink for FrameRelay {
    fn frame_available(&self, frame: Frame) {
        FrameRelay::frame_available(self, frame);
    }
}

/// Single-owner render context. All GPU-side state lives here; the task
/// processes messages in submission order.
struct RenderWorker {
    rx: mpsc::Receiver<RenderMsg>,
    sink: Box<dyn EncoderSink>,
    tracker: Arc<OrientationTracker>,
    pacer: Arc<FramePacer>,
    processed: Arc<AtomicU64>,
    drain_limit: usize,
    /// Most recent rendered frame, retained for orientation re-renders
    last_frame: Option<Frame>,
}

impl RenderWorker {
    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                RenderMsg::Frame(frame) => {
                    let mut latest = frame;
                    let mut shutdown = None;
                    // Coalesce any backlog so output reflects the newest
                    // frame, never an increasingly stale one
                    for _ in 0..self.drain_limit {
                        match self.rx.try_recv() {
                            Ok(RenderMsg::Frame(next)) => {
                                self.pacer.count_late_drop();
                                latest = next;
                            }
                            Ok(RenderMsg::Refresh) => {}
                            Ok(RenderMsg::Shutdown(ack)) => {
                                shutdown = Some(ack);
                                break;
                            }
                            Err(_) => break,
                        }
                    }
                    self.render(latest);
                    if let Some(ack) = shutdown {
                        let _ = ack.send(());
                        return;
                    }
                }
                RenderMsg::Refresh => {
                    // Re-render once immediately so the next output already
                    // reflects the new orientation
                    if let Some(frame) = self.last_frame.clone() {
                        self.render(frame);
                    }
                }
                RenderMsg::Shutdown(ack) => {
                    let _ = ack.send(());
                    return;
                }
            }
        }
    }

    fn render(&mut self, frame: Frame) {
        let orientation = self.tracker.current();
        let rendered = RenderedFrame {
            data: frame.data_bytes(),
            size: self.tracker.oriented_size(frame.size),
            rotation: orientation.rotation,
            mirrored: orientation.mirrored,
            pts_us: frame.pts_us,
        };
        self.sink.submit(rendered);
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.last_frame = Some(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orientation::Rotation;
    use crate::video::Size;
    use bytes::Bytes;
    use parking_lot::Mutex as PlMutex;
    use std::time::Duration;

    #[derive(Clone)]
    struct CollectSink {
        frames: Arc<PlMutex<Vec<RenderedFrame>>>,
    }

    impl CollectSink {
        fn new() -> (Self, Arc<PlMutex<Vec<RenderedFrame>>>) {
            let frames = Arc::new(PlMutex::new(Vec::new()));
            (Self { frames: frames.clone() }, frames)
        }
    }

    impl EncoderSink for CollectSink {
        fn submit(&mut self, frame: RenderedFrame) {
            self.frames.lock().push(frame);
        }
    }

    fn frame(pts_us: u64, sequence: u64) -> Frame {
        Frame::new(Bytes::from_static(b"frame-payload-data"), Size::HD1080, pts_us, sequence)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_drops_before_enqueue() {
        let tracker = Arc::new(OrientationTracker::new());
        let (sink, frames) = CollectSink::new();
        let relay = FrameRelay::spawn(RelayConfig::default(), tracker, Box::new(sink));

        // 50 signals with no elapsed time: one admitted, rest discarded
        for i in 0..50 {
            relay.frame_available(frame(i * 1_000, i));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        relay.shutdown().await;

        assert_eq!(frames.lock().len(), 1);
        let stats = relay.stats();
        assert_eq!(stats.received, 50);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.dropped, 49);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_stream_renders_at_cap() {
        let tracker = Arc::new(OrientationTracker::new());
        let (sink, frames) = CollectSink::new();
        let relay = FrameRelay::spawn(
            RelayConfig::default().with_max_fps(30),
            tracker,
            Box::new(sink),
        );

        // 20 signals at ~60 Hz against a 30 fps cap
        for i in 0..20u64 {
            relay.frame_available(frame(i * 16_667, i));
            tokio::time::advance(Duration::from_micros(16_667)).await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        relay.shutdown().await;

        let rendered = frames.lock();
        assert_eq!(rendered.len(), 10);
        // Capture timestamps survive the render pass, in order
        let pts: Vec<u64> = rendered.iter().map(|f| f.pts_us).collect();
        let mut sorted = pts.clone();
        sorted.sort_unstable();
        assert_eq!(pts, sorted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_applies_orientation_transform() {
        let tracker = Arc::new(OrientationTracker::new());
        tracker.set_facing(true);
        let (sink, frames) = CollectSink::new();
        let relay = FrameRelay::spawn(RelayConfig::default(), tracker.clone(), Box::new(sink));

        relay.frame_available(frame(0, 0));
        tokio::time::sleep(Duration::from_millis(5)).await;
        relay.shutdown().await;

        let rendered = frames.lock();
        assert_eq!(rendered.len(), 1);
        // Portrait posture normalizes the landscape capture size
        assert_eq!(rendered[0].size, Size::new(1080, 1920));
        assert!(rendered[0].mirrored);
        assert_eq!(rendered[0].rotation, Rotation::Deg0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_orientation_change_rerenders_retained_frame() {
        let tracker = Arc::new(OrientationTracker::new());
        let (sink, frames) = CollectSink::new();
        let relay = FrameRelay::spawn(RelayConfig::default(), tracker.clone(), Box::new(sink));

        relay.frame_available(frame(7_000, 0));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(frames.lock().len(), 1);

        // No new capture frame needed: the retained frame re-renders under
        // the new orientation
        tracker.set_rotation(Rotation::Deg90);
        tokio::time::sleep(Duration::from_millis(5)).await;
        relay.shutdown().await;

        let rendered = frames.lock();
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[1].pts_us, 7_000);
        assert_eq!(rendered[1].rotation, Rotation::Deg90);
        assert_eq!(rendered[1].size, Size::new(1920, 1080));
        let stats = relay.stats();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.received, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_idempotent() {
        let tracker = Arc::new(OrientationTracker::new());
        let (sink, _frames) = CollectSink::new();
        let relay = FrameRelay::spawn(RelayConfig::default(), tracker, Box::new(sink));

        relay.shutdown().await;
        relay.shutdown().await;
        // Late signals after shutdown are discarded without panicking
        relay.frame_available(frame(0, 0));
    }
}
