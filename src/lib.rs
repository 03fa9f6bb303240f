//! camcast: real-time video capture, transform, encode, and transmit pipeline.
//!
//! The pipeline moves frames through four stages, each owned by one
//! component:
//!
//! - [`capture::CaptureSessionManager`] opens a capture device, selects a
//!   frame-rate range, and drives a repeating capture request into a set of
//!   output targets.
//! - [`orientation::OrientationTracker`] holds the current device rotation
//!   and mirroring state and broadcasts changes.
//! - [`relay::FrameRelay`] turns the uncontrolled frame-available stream
//!   into a bounded-rate sequence of oriented frames for the encoder, with
//!   a drop-before-enqueue pacing policy.
//! - [`net::NetworkProducer`] owns the transport connection, frames encoded
//!   packets onto the wire, and sheds video under backpressure.
//!
//! Frames are dropped by policy throughout the pipeline; drops are counted,
//! never treated as errors. Lifecycle transitions are published on the
//! [`events::EventBus`] for the host application.

pub mod capture;
pub mod error;
pub mod events;
pub mod net;
pub mod orientation;
pub mod relay;
pub mod utils;
pub mod video;

pub use error::{DeviceFault, PipelineError, Result};
