//! End-to-end pipeline test against mock device and transport boundaries.
//!
//! Drives the full path: session open, repeating request, 60 Hz frame
//! delivery into the relay, orientation transform, and packet egress through
//! the producer. Uses the paused tokio clock so pacing is deterministic.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex as PlMutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

use camcast::capture::{
    CaptureBackend, CaptureDevice, CaptureSessionManager, CaptureState, FrameRateRange,
    OutputTarget,
};
use camcast::error::Result;
use camcast::events::EventBus;
use camcast::net::{ConnectionState, NetworkProducer, PacketTransport};
use camcast::orientation::{OrientationTracker, Rotation};
use camcast::relay::{EncoderSink, FrameRelay, RelayConfig};
use camcast::video::{ColorProfile, EncodedPacket, Frame, RenderedFrame, Size};

/// Shared state letting the test deliver frames through the submitted
/// repeating request, the way a live device would.
#[derive(Default)]
struct DeviceState {
    submitted: PlMutex<Vec<OutputTarget>>,
}

struct StubBackend {
    state: Arc<DeviceState>,
    ranges: Vec<FrameRateRange>,
}

#[async_trait]
impl CaptureBackend for StubBackend {
    async fn open(&self, _device_id: &str) -> Result<Box<dyn CaptureDevice>> {
        let (capture_state, _) = tokio::sync::watch::channel(CaptureState::Running);
        Ok(Box::new(StubDevice {
            state: self.state.clone(),
            ranges: self.ranges.clone(),
            capture_state,
        }))
    }
}

struct StubDevice {
    state: Arc<DeviceState>,
    ranges: Vec<FrameRateRange>,
    capture_state: tokio::sync::watch::Sender<CaptureState>,
}

#[async_trait]
impl CaptureDevice for StubDevice {
    fn fps_ranges(&self) -> Vec<FrameRateRange> {
        self.ranges.clone()
    }

    fn state_watch(&self) -> tokio::sync::watch::Receiver<CaptureState> {
        self.capture_state.subscribe()
    }

    async fn configure(&mut self, _targets: &[OutputTarget], _color: ColorProfile) -> Result<()> {
        Ok(())
    }

    async fn submit_repeating(
        &mut self,
        targets: &[OutputTarget],
        _range: FrameRateRange,
    ) -> Result<()> {
        *self.state.submitted.lock() = targets.to_vec();
        Ok(())
    }

    async fn stop_repeating(&mut self) -> Result<()> {
        self.state.submitted.lock().clear();
        Ok(())
    }

    async fn release(&mut self) {}
}

/// Encoder stand-in: one rendered frame becomes one video packet.
struct StubEncoder {
    rendered: Arc<PlMutex<Vec<RenderedFrame>>>,
}

impl EncoderSink for StubEncoder {
    fn submit(&mut self, frame: RenderedFrame) {
        self.rendered.lock().push(frame);
    }
}

#[derive(Default)]
struct WireLog {
    sent: PlMutex<Vec<Bytes>>,
}

struct StubTransport {
    log: Arc<WireLog>,
}

#[async_trait]
impl PacketTransport for StubTransport {
    async fn connect(&mut self, _endpoint: &str) -> Result<()> {
        Ok(())
    }

    async fn send(&mut self, payload: Bytes) -> Result<()> {
        self.log.sent.lock().push(payload);
        Ok(())
    }

    async fn close(&mut self) {}

    fn reset(&mut self) {}
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test(start_paused = true)]
async fn test_capture_to_transmit_pipeline() {
    init_tracing();
    let events = Arc::new(EventBus::new());
    let tracker = Arc::new(OrientationTracker::with_events(events.clone()));

    let rendered = Arc::new(PlMutex::new(Vec::new()));
    let relay = FrameRelay::spawn(
        RelayConfig::default().with_max_fps(30),
        tracker.clone(),
        Box::new(StubEncoder {
            rendered: rendered.clone(),
        }),
    );

    let device_state = Arc::new(DeviceState::default());
    let manager = CaptureSessionManager::new(
        Arc::new(StubBackend {
            state: device_state.clone(),
            ranges: vec![FrameRateRange::new(30, 30), FrameRateRange::new(30, 60)],
        }),
        events.clone(),
    );

    let target = OutputTarget::new(relay.clone());
    let surface = target.id();
    manager
        .open("/dev/video0", vec![target], ColorProfile::default())
        .await
        .unwrap();
    let range = manager.start_repeating(30, &[surface]).await.unwrap();
    assert_eq!(range, FrameRateRange::new(30, 30));

    // The device delivers 100 frames at ~60 Hz against the 30 fps request
    for i in 0..100u64 {
        let frame = Frame::new(
            Bytes::from_static(b"captured-frame-payload"),
            Size::HD1080,
            i * 16_667,
            i,
        );
        for target in device_state.submitted.lock().iter() {
            target.sink().frame_available(frame.clone());
        }
        tokio::time::advance(Duration::from_micros(16_667)).await;
    }

    // Rotate mid-stream: the retained frame re-renders immediately
    tracker.set_rotation(Rotation::Deg90);
    tokio::time::sleep(Duration::from_millis(10)).await;
    relay.shutdown().await;
    manager.close().await;

    let stats = relay.stats();
    assert_eq!(stats.received, 100);
    // Roughly half the 60 Hz stream survives the 30 fps gate
    assert!(stats.processed >= 45, "processed {}", stats.processed);
    assert!(stats.dropped >= 45, "dropped {}", stats.dropped);
    assert_eq!(stats.processed + stats.dropped, 101); // +1 orientation re-render

    let frames = rendered.lock().clone();
    assert!(!frames.is_empty());
    // Capture timestamps survive rendering, in nondecreasing order
    let pts: Vec<u64> = frames.iter().map(|f| f.pts_us).collect();
    assert!(pts.windows(2).all(|w| w[0] <= w[1]));
    let last = frames.last().unwrap();
    assert_eq!(last.rotation, Rotation::Deg90);
    // Deg90 is landscape posture; the landscape capture size stays as-is
    assert_eq!(last.size, Size::new(1920, 1080));

    // Encoded output flows through the producer onto the wire
    let log = Arc::new(WireLog::default());
    let producer = NetworkProducer::new(
        Box::new(StubTransport { log: log.clone() }),
        events.clone(),
    );
    tokio_test::assert_ok!(producer.connect("127.0.0.1:9000").await);
    assert_eq!(producer.state(), ConnectionState::Connected);

    for frame in &frames {
        producer
            .write(EncodedPacket::video(frame.data.clone(), frame.pts_us))
            .await
            .unwrap();
    }
    producer.disconnect().await;
    assert_eq!(producer.state(), ConnectionState::Disconnected);

    let sent = log.sent.lock();
    assert_eq!(sent.len(), frames.len());
    // Wire framing: [len:u32 BE][kind:u8][pts:u64 BE][payload]
    let first = &sent[0];
    let payload_len = frames[0].data.len();
    assert_eq!(
        u32::from_be_bytes([first[0], first[1], first[2], first[3]]) as usize,
        1 + 8 + payload_len
    );
    assert_eq!(first[4], 1); // video
    assert_eq!(&first[13..], &frames[0].data[..]);
}
