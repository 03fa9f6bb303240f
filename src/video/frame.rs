//! Raw and rendered frame data structures
//!
//! A [`Frame`] is produced by the capture backend and handed to the relay by
//! move; the relay exclusively owns it for the duration of one render pass.
//! A [`RenderedFrame`] is the relay's output, carrying the orientation
//! transform metadata the encoder needs, with the original capture timestamp
//! preserved.

use bytes::Bytes;
use std::time::Instant;

use super::format::Size;
use crate::orientation::Rotation;

/// A raw frame delivered by the capture pipeline
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame payload (surface-resident image data)
    data: Bytes,
    /// Frame dimensions
    pub size: Size,
    /// Presentation timestamp in microseconds, monotonically increasing
    pub pts_us: u64,
    /// Capture sequence number
    pub sequence: u64,
    /// Wall-clock instant the frame was captured
    pub capture_ts: Instant,
}

impl Frame {
    pub fn new(data: Bytes, size: Size, pts_us: u64, sequence: u64) -> Self {
        Self {
            data,
            size,
            pts_us,
            sequence,
            capture_ts: Instant::now(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Cheap reference-counted handle to the payload
    pub fn data_bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Time since capture
    pub fn age(&self) -> std::time::Duration {
        self.capture_ts.elapsed()
    }
}

/// A frame after the orientation-aware render pass, ready for the encoder
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    /// Frame payload
    pub data: Bytes,
    /// Oriented output dimensions
    pub size: Size,
    /// Rotation applied at draw time
    pub rotation: Rotation,
    /// Whether the draw was mirrored (front-facing source)
    pub mirrored: bool,
    /// Original capture timestamp, in microseconds
    pub pts_us: u64,
}
