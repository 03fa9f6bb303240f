//! Capture boundary traits
//!
//! The session manager talks to hardware through these traits; the concrete
//! V4L2 backend lives in [`crate::capture::v4l2`], and tests substitute mock
//! implementations.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use super::fps::FrameRateRange;
use crate::error::Result;
use crate::video::{ColorProfile, Frame};

/// Identity of an output target within a session's target set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TargetId(Uuid);

impl TargetId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Push-based frame consumer registered as a capture output target.
///
/// Called from the capture delivery thread; implementations must not block
/// and must not queue without bound.
pub trait FrameSink: Send + Sync {
    fn frame_available(&self, frame: Frame);
}

/// An output target: a sink plus its identity in the target set
#[derive(Clone)]
pub struct OutputTarget {
    id: TargetId,
    sink: Arc<dyn FrameSink>,
}

impl OutputTarget {
    pub fn new(sink: Arc<dyn FrameSink>) -> Self {
        Self {
            id: TargetId::new(),
            sink,
        }
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn sink(&self) -> &Arc<dyn FrameSink> {
        &self.sink
    }
}

impl fmt::Debug for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputTarget").field("id", &self.id).finish()
    }
}

/// Factory boundary for opening capture devices.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Open the named device. Errors carry the platform fault classification
    /// ([`crate::error::DeviceFault`]).
    async fn open(&self, device_id: &str) -> Result<Box<dyn CaptureDevice>>;
}

/// Delivery state of an open device, observable through a watch channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    /// No repeating request is running
    Stopped,
    /// Frames are being delivered
    Running,
    /// The device produced no frame within the delivery timeout
    NoSignal,
    /// The device disappeared mid-stream; reopen to recover
    DeviceLost,
}

/// An open capture device.
///
/// Exactly one repeating request is active at a time; submitting a new one
/// replaces the previous request.
#[async_trait]
pub trait CaptureDevice: Send {
    /// Frame-rate ranges the device can sustain
    fn fps_ranges(&self) -> Vec<FrameRateRange>;

    /// Watch the delivery state of the repeating request.
    fn state_watch(&self) -> watch::Receiver<CaptureState>;

    /// Configure the session with its output target set. A rejection is a
    /// configuration fault, not a device fault.
    async fn configure(&mut self, targets: &[OutputTarget], color: ColorProfile) -> Result<()>;

    /// Build and submit the repeating capture request for `targets`.
    async fn submit_repeating(
        &mut self,
        targets: &[OutputTarget],
        range: FrameRateRange,
    ) -> Result<()>;

    /// Stop the active repeating request, draining in-flight delivery.
    async fn stop_repeating(&mut self) -> Result<()>;

    /// Release the device. Idempotent.
    async fn release(&mut self);
}
