//! Capture-side pipeline: device boundary, frame-rate selection, and
//! session lifecycle.

pub mod backend;
pub mod fps;
pub mod session;
pub mod v4l2;

pub use backend::{CaptureBackend, CaptureDevice, CaptureState, FrameSink, OutputTarget, TargetId};
pub use fps::{select_range, FrameRateRange};
pub use session::CaptureSessionManager;
pub use v4l2::{V4l2Backend, V4l2Config};
