//! V4L2 capture backend
//!
//! Concrete implementation of the capture boundary over memory-mapped V4L2
//! streaming. The device is validated and probed at open; the repeating
//! request runs as a blocking capture loop that pushes frames to every
//! registered output target.

use bytes::Bytes;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

use async_trait::async_trait;

use super::backend::{CaptureBackend, CaptureDevice, CaptureState, OutputTarget};
use super::fps::FrameRateRange;
use crate::error::{DeviceFault, PipelineError, Result};
use crate::events::{EventBus, PipelineEvent};
use crate::utils::LogThrottler;
use crate::video::{ColorProfile, Frame, Size};

/// Number of memory-mapped capture buffers
const DEFAULT_BUFFER_COUNT: u32 = 2;
/// Frames smaller than this are driver glitches, not video
const MIN_FRAME_SIZE: usize = 128;

/// V4L2 backend configuration
#[derive(Debug, Clone)]
pub struct V4l2Config {
    /// Desired capture size (the driver may adjust it)
    pub size: Size,
    /// Capture FourCC
    pub fourcc: [u8; 4],
    /// Number of mmap buffers
    pub buffer_count: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            size: Size::HD1080,
            fourcc: *b"MJPG",
            buffer_count: DEFAULT_BUFFER_COUNT,
        }
    }
}

/// Capture backend over V4L2 devices
pub struct V4l2Backend {
    config: V4l2Config,
    events: Arc<EventBus>,
}

impl V4l2Backend {
    pub fn new(config: V4l2Config, events: Arc<EventBus>) -> Self {
        Self { config, events }
    }
}

#[async_trait]
impl CaptureBackend for V4l2Backend {
    async fn open(&self, device_id: &str) -> Result<Box<dyn CaptureDevice>> {
        let path = device_id.to_string();
        let config = self.config.clone();
        let events = self.events.clone();
        let device = tokio::task::spawn_blocking(move || V4l2Device::probe(path, config, events))
            .await
            .map_err(|e| PipelineError::Internal(format!("open task failed: {}", e)))??;
        Ok(Box::new(device))
    }
}

/// An opened (probed) V4L2 device.
///
/// No file handle is held between requests; the capture loop opens its own
/// handle so the blocking thread is the sole owner of the stream.
struct V4l2Device {
    path: String,
    config: V4l2Config,
    size: Size,
    ranges: Vec<FrameRateRange>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    state: Arc<watch::Sender<CaptureState>>,
    state_rx: watch::Receiver<CaptureState>,
    events: Arc<EventBus>,
}

impl V4l2Device {
    /// Open, capability-check, and probe the device, then drop the handle.
    fn probe(path: String, config: V4l2Config, events: Arc<EventBus>) -> Result<Self> {
        let device = Device::with_path(&path).map_err(|e| classify_open_error(&path, &e))?;

        let caps = device.query_caps().map_err(|e| {
            PipelineError::device(&path, DeviceFault::ServiceCrashed, e.to_string())
        })?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(PipelineError::ConfigurationFailed(format!(
                "{} has no video capture capability",
                path
            )));
        }

        let requested = Format::new(
            config.size.width,
            config.size.height,
            FourCC::new(&config.fourcc),
        );
        let actual = device
            .set_format(&requested)
            .map_err(|e| PipelineError::ConfigurationFailed(format!("set format: {}", e)))?;
        if actual.width != config.size.width || actual.height != config.size.height {
            warn!(
                "Requested {} got {}x{}",
                config.size, actual.width, actual.height
            );
        }
        let size = Size::new(actual.width, actual.height);

        let ranges = enumerate_fps_ranges(&device, actual.fourcc, size);
        info!(
            "Probed {}: {} {} fps ranges",
            path,
            size,
            ranges.len()
        );

        let (state_tx, state_rx) = watch::channel(CaptureState::Stopped);
        Ok(Self {
            path,
            config,
            size,
            ranges,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
            state: Arc::new(state_tx),
            state_rx,
            events,
        })
    }

    async fn join_worker(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.await;
        }
        // Device loss stays observable after the worker is gone
        if *self.state_rx.borrow() != CaptureState::DeviceLost {
            let _ = self.state.send(CaptureState::Stopped);
        }
    }
}

#[async_trait]
impl CaptureDevice for V4l2Device {
    fn fps_ranges(&self) -> Vec<FrameRateRange> {
        self.ranges.clone()
    }

    fn state_watch(&self) -> watch::Receiver<CaptureState> {
        self.state_rx.clone()
    }

    async fn configure(&mut self, targets: &[OutputTarget], color: ColorProfile) -> Result<()> {
        if targets.is_empty() {
            return Err(PipelineError::ConfigurationFailed(
                "target set is empty".into(),
            ));
        }
        // V4L2 has no per-session color profile negotiation; record and go
        debug!("Configured {} with {} targets, {:?}", self.path, targets.len(), color);
        Ok(())
    }

    async fn submit_repeating(
        &mut self,
        targets: &[OutputTarget],
        range: FrameRateRange,
    ) -> Result<()> {
        // Replace any active request
        self.join_worker().await;

        let path = self.path.clone();
        let size = self.size;
        let fourcc = self.config.fourcc;
        let fps = range.upper;

        // Validate the rate before committing to the loop
        tokio::task::spawn_blocking({
            let path = path.clone();
            move || -> Result<()> {
                let device =
                    Device::with_path(&path).map_err(|e| classify_open_error(&path, &e))?;
                let params = v4l::video::capture::Parameters::with_fps(fps);
                device.set_params(&params).map_err(|e| {
                    PipelineError::ConfigurationFailed(format!("set frame rate: {}", e))
                })?;
                Ok(())
            }
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("submit task failed: {}", e)))??;

        self.stop = Arc::new(AtomicBool::new(false));
        let stop = self.stop.clone();
        let targets = targets.to_vec();
        let buffer_count = self.config.buffer_count;
        let state = self.state.clone();
        let events = self.events.clone();
        let handle = tokio::task::spawn_blocking(move || {
            if let Err(e) = capture_loop(
                &path,
                size,
                fourcc,
                fps,
                buffer_count,
                &targets,
                &stop,
                &state,
                &events,
            ) {
                error!("Capture loop on {} ended: {}", path, e);
            }
        });
        self.worker = Some(handle);
        Ok(())
    }

    async fn stop_repeating(&mut self) -> Result<()> {
        self.join_worker().await;
        Ok(())
    }

    async fn release(&mut self) {
        self.join_worker().await;
        debug!("Released {}", self.path);
    }
}

/// Main capture loop (runs on a blocking thread, sole owner of the stream)
#[allow(clippy::too_many_arguments)]
fn capture_loop(
    path: &str,
    size: Size,
    fourcc: [u8; 4],
    fps: u32,
    buffer_count: u32,
    targets: &[OutputTarget],
    stop: &AtomicBool,
    state: &watch::Sender<CaptureState>,
    events: &EventBus,
) -> Result<()> {
    let device = Device::with_path(path).map_err(|e| classify_open_error(path, &e))?;
    device
        .set_format(&Format::new(size.width, size.height, FourCC::new(&fourcc)))
        .map_err(|e| PipelineError::ConfigurationFailed(format!("set format: {}", e)))?;
    let _ = device.set_params(&v4l::video::capture::Parameters::with_fps(fps));

    let mut stream = MmapStream::with_buffers(&device, Type::VideoCapture, buffer_count)
        .map_err(|e| PipelineError::ConfigurationFailed(format!("map buffers: {}", e)))?;

    info!("Repeating capture running on {} at {} fps", path, fps);
    let _ = state.send(CaptureState::Running);
    let error_throttler = LogThrottler::with_secs(5);
    let mut sequence = 0u64;

    while !stop.load(Ordering::Relaxed) {
        let (buf, meta) = match stream.next() {
            Ok(item) => item,
            Err(e) => {
                if e.kind() == io::ErrorKind::TimedOut {
                    warn!("Capture timeout on {} - no signal?", path);
                    let _ = state.send(CaptureState::NoSignal);
                    continue;
                }
                if is_device_lost(&e) {
                    report_device_lost(state, events, path, &e);
                    return Err(PipelineError::device(
                        path,
                        DeviceFault::Crashed,
                        e.to_string(),
                    ));
                }
                if error_throttler.should_log("capture_error") {
                    error!("Capture error on {}: {}", path, e);
                }
                continue;
            }
        };
        if *state.borrow() != CaptureState::Running {
            let _ = state.send(CaptureState::Running);
        }

        let used = (meta.bytesused as usize).min(buf.len());
        if used < MIN_FRAME_SIZE {
            debug!("Dropping runt frame: {} bytes", used);
            continue;
        }

        let pts_us = meta.timestamp.sec.max(0) as u64 * 1_000_000 + meta.timestamp.usec as u64;
        let data = Bytes::copy_from_slice(&buf[..used]);
        for target in targets {
            target
                .sink()
                .frame_available(Frame::new(data.clone(), size, pts_us, sequence));
        }
        sequence += 1;
    }

    info!("Repeating capture stopped on {}", path);
    Ok(())
}

/// Make a mid-stream device loss observable: the watch channel flips to
/// `DeviceLost` and a failure event fires, so the host can reopen.
fn report_device_lost(
    state: &watch::Sender<CaptureState>,
    events: &EventBus,
    path: &str,
    err: &io::Error,
) {
    let _ = state.send(CaptureState::DeviceLost);
    events.publish(PipelineEvent::CaptureFailed {
        device: path.to_string(),
        reason: err.to_string(),
    });
}

/// Map a device-open failure to the platform fault taxonomy.
fn classify_open_error(path: &str, err: &io::Error) -> PipelineError {
    let fault = match err.raw_os_error() {
        Some(16) => DeviceFault::Unavailable, // EBUSY
        Some(1) | Some(13) => DeviceFault::Disabled, // EPERM, EACCES
        Some(2) | Some(6) | Some(19) => DeviceFault::Crashed, // ENOENT, ENXIO, ENODEV
        _ => DeviceFault::ServiceCrashed,
    };
    PipelineError::device(path, fault, err.to_string())
}

/// Errors that mean the device is gone, not transiently unhappy.
fn is_device_lost(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(6) | Some(19) | Some(5) | Some(32) | Some(108) // ENXIO, ENODEV, EIO, EPIPE, ESHUTDOWN
    )
}

/// Collect the advertised frame-rate ranges for the active format.
fn enumerate_fps_ranges(device: &Device, fourcc: FourCC, size: Size) -> Vec<FrameRateRange> {
    let mut ranges = Vec::new();

    match device.enum_frameintervals(fourcc, size.width, size.height) {
        Ok(intervals) => {
            for interval in intervals {
                match interval.interval {
                    v4l::frameinterval::FrameIntervalEnum::Discrete(fraction) => {
                        if fraction.numerator > 0 {
                            ranges.push(FrameRateRange::fixed(
                                fraction.denominator / fraction.numerator,
                            ));
                        }
                    }
                    v4l::frameinterval::FrameIntervalEnum::Stepwise(step) => {
                        if step.max.numerator > 0 && step.min.numerator > 0 {
                            let lower = step.max.denominator / step.max.numerator;
                            let upper = step.min.denominator / step.min.numerator;
                            ranges.push(FrameRateRange::new(lower, upper));
                        }
                    }
                }
            }
        }
        Err(e) => {
            debug!("Frame interval enumeration failed: {}", e);
        }
    }

    if ranges.is_empty() {
        // Drivers that do not enumerate intervals usually sustain 30
        ranges.push(FrameRateRange::fixed(30));
    }
    ranges.sort_by(|a, b| b.upper.cmp(&a.upper));
    ranges.dedup();
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_classification() {
        let busy = io::Error::from_raw_os_error(16);
        match classify_open_error("/dev/video9", &busy) {
            PipelineError::Device { fault, .. } => assert_eq!(fault, DeviceFault::Unavailable),
            other => panic!("unexpected error: {}", other),
        }

        let denied = io::Error::from_raw_os_error(13);
        match classify_open_error("/dev/video9", &denied) {
            PipelineError::Device { fault, .. } => assert_eq!(fault, DeviceFault::Disabled),
            other => panic!("unexpected error: {}", other),
        }

        let gone = io::Error::from_raw_os_error(19);
        match classify_open_error("/dev/video9", &gone) {
            PipelineError::Device { fault, .. } => assert_eq!(fault, DeviceFault::Crashed),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_device_loss_is_observable() {
        let (state_tx, state_rx) = watch::channel(CaptureState::Running);
        let events = EventBus::new();
        let mut rx = events.subscribe();

        let gone = io::Error::from_raw_os_error(19);
        report_device_lost(&state_tx, &events, "/dev/video0", &gone);

        assert_eq!(*state_rx.borrow(), CaptureState::DeviceLost);
        match rx.try_recv().unwrap() {
            PipelineEvent::CaptureFailed { device, .. } => assert_eq!(device, "/dev/video0"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_device_lost_detection() {
        assert!(is_device_lost(&io::Error::from_raw_os_error(19)));
        assert!(is_device_lost(&io::Error::from_raw_os_error(5)));
        assert!(!is_device_lost(&io::Error::from_raw_os_error(11))); // EAGAIN
    }
}
