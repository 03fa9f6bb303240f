//! Frame-rate range selection
//!
//! Capture devices advertise closed frame-rate intervals; the session manager
//! picks one for the repeating request.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A device-advertised closed frame-rate interval [lower, upper]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRateRange {
    pub lower: u32,
    pub upper: u32,
}

impl FrameRateRange {
    /// Fixed low-power range, preferred whenever the device advertises it
    pub const LOW_POWER: FrameRateRange = FrameRateRange::fixed(15);

    pub const fn new(lower: u32, upper: u32) -> Self {
        Self { lower, upper }
    }

    /// A fixed range [fps, fps]
    pub const fn fixed(fps: u32) -> Self {
        Self { lower: fps, upper: fps }
    }

    pub fn contains(&self, fps: u32) -> bool {
        self.lower <= fps && fps <= self.upper
    }

    pub fn is_fixed(&self) -> bool {
        self.lower == self.upper
    }

    pub fn as_tuple(&self) -> (u32, u32) {
        (self.lower, self.upper)
    }
}

impl fmt::Display for FrameRateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

/// Pick the range to use for a repeating request targeting `target_fps`.
///
/// Priority order:
/// 1. the fixed low-power range, when advertised;
/// 2. the first advertised range containing the target rate;
/// 3. the range with the greatest lower bound not above the target rate;
/// 4. any advertised range as a last resort.
///
/// Returns `None` only when the device advertises nothing.
pub fn select_range(target_fps: u32, available: &[FrameRateRange]) -> Option<FrameRateRange> {
    if let Some(range) = available.iter().find(|r| **r == FrameRateRange::LOW_POWER) {
        return Some(*range);
    }
    if let Some(range) = available.iter().find(|r| r.contains(target_fps)) {
        return Some(*range);
    }
    if let Some(range) = available
        .iter()
        .filter(|r| r.lower <= target_fps)
        .max_by_key(|r| r.lower)
    {
        return Some(*range);
    }
    available.first().copied()
}
