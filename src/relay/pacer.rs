//! Frame pacing with a drop-before-enqueue policy
//!
//! The capture side delivers frame-available signals at an uncontrolled rate.
//! The pacer admits at most one frame per minimum inter-frame interval and
//! rejects the rest before they touch any queue, so burst delivery cannot
//! grow memory.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Pacing statistics
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PacerStats {
    /// Upstream signals seen
    pub received: u64,
    /// Signals admitted for rendering
    pub accepted: u64,
    /// Signals rejected by the pacing policy
    pub dropped: u64,
}

/// Admission gate in front of the render queue
pub struct FramePacer {
    min_interval: Duration,
    last_accepted: Mutex<Option<Instant>>,
    received: AtomicU64,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl FramePacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: Mutex::new(None),
            received: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Gate at a target frame-rate cap (e.g. 24 fps caps one frame per ~41 ms)
    pub fn for_fps(fps: u32) -> Self {
        Self::new(Duration::from_millis(1000 / fps.max(1) as u64))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Decide admission for one frame-available signal. `false` means the
    /// signal must be discarded immediately, not queued.
    pub fn admit(&self) -> bool {
        self.received.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut last = self.last_accepted.lock();
        match *last {
            Some(prev) if now.duration_since(prev) < self.min_interval => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            _ => {
                *last = Some(now);
                self.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
        }
    }

    /// Count a frame dropped after admission (queue overflow, superseded
    /// during drain), so the totals still add up.
    pub fn count_late_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> PacerStats {
        PacerStats {
            received: self.received.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
