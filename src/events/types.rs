//! Pipeline event types
//!
//! Tagged-variant events delivered through the event bus so a host
//! application can react to capture lifecycle, orientation, and connection
//! changes without a callback interface per component.

use serde::{Deserialize, Serialize};

/// Pipeline event enumeration
///
/// Serialized with `serde(tag = "event", content = "data")`, producing:
/// ```json
/// { "event": "connection.lost", "data": { "reason": "broken pipe" } }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum PipelineEvent {
    /// A capture session was opened and configured
    #[serde(rename = "capture.session_opened")]
    CaptureSessionOpened {
        /// Device identifier (e.g. /dev/video0)
        device: String,
        /// Session id
        session_id: String,
    },

    /// A repeating capture request was submitted successfully
    #[serde(rename = "capture.started")]
    CaptureStarted {
        device: String,
        /// Selected frame-rate range (lower, upper)
        fps_range: (u32, u32),
    },

    /// Opening or configuring a capture session failed
    #[serde(rename = "capture.failed")]
    CaptureFailed { device: String, reason: String },

    /// The capture session was closed
    #[serde(rename = "capture.closed")]
    CaptureClosed { device: String },

    /// Device orientation or mirroring changed
    #[serde(rename = "orientation.changed")]
    OrientationChanged {
        /// Rotation in degrees (0, 90, 180, 270)
        rotation: u32,
        /// Whether output should be mirrored (front-facing device)
        mirrored: bool,
    },

    /// Transport connection established
    #[serde(rename = "connection.established")]
    ConnectionEstablished { endpoint: String },

    /// Transport connection attempt failed
    #[serde(rename = "connection.failed")]
    ConnectionFailed { endpoint: String, reason: String },

    /// An established connection was lost mid-stream
    #[serde(rename = "connection.lost")]
    ConnectionLost { reason: String },

    /// Network backpressure started or cleared
    #[serde(rename = "network.backpressure")]
    BackpressureChanged { active: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = PipelineEvent::ConnectionLost {
            reason: "broken pipe".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"connection.lost\""));
        assert!(json.contains("broken pipe"));
    }

    #[test]
    fn test_event_round_trip() {
        let event = PipelineEvent::CaptureStarted {
            device: "/dev/video0".to_string(),
            fps_range: (30, 30),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: PipelineEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, PipelineEvent::CaptureStarted { fps_range: (30, 30), .. }));
    }
}
