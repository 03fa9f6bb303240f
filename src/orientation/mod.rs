//! Device orientation and mirroring tracking
//!
//! The tracker holds the current rotation and mirror state, readable
//! lock-free on the render hot path, and pushes change notifications to
//! subscribers so the relay can re-render without waiting for a new capture
//! frame.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::events::{EventBus, PipelineEvent};
use crate::video::Size;

/// Notification channel capacity; orientation changes are rare
const ORIENTATION_CHANNEL_CAPACITY: usize = 16;

/// Device rotation, one of the four cardinal values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    /// Quarter-turn rotations put the device in landscape posture
    pub fn is_sideways(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// A rotation + mirror snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Orientation {
    pub rotation: Rotation,
    /// True when the active device is front-facing
    pub mirrored: bool,
}

/// Tracks device posture and publishes change notifications
pub struct OrientationTracker {
    current: ArcSwap<Orientation>,
    tx: broadcast::Sender<Orientation>,
    events: Option<Arc<EventBus>>,
}

impl OrientationTracker {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(ORIENTATION_CHANNEL_CAPACITY);
        Self {
            current: ArcSwap::from_pointee(Orientation::default()),
            tx,
            events: None,
        }
    }

    /// Additionally mirror orientation changes onto the pipeline event bus.
    pub fn with_events(events: Arc<EventBus>) -> Self {
        let mut tracker = Self::new();
        tracker.events = Some(events);
        tracker
    }

    fn announce(&self, next: Orientation) {
        let _ = self.tx.send(next);
        if let Some(events) = &self.events {
            events.publish(PipelineEvent::OrientationChanged {
                rotation: next.rotation.degrees(),
                mirrored: next.mirrored,
            });
        }
    }

    /// Current snapshot, lock-free
    pub fn current(&self) -> Orientation {
        **self.current.load()
    }

    /// Subscribe to orientation-change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<Orientation> {
        self.tx.subscribe()
    }

    /// Update the sensor rotation; notifies subscribers only on change.
    pub fn set_rotation(&self, rotation: Rotation) {
        let prev = self.current();
        if prev.rotation == rotation {
            return;
        }
        let next = Orientation { rotation, ..prev };
        self.current.store(Arc::new(next));
        debug!("Orientation rotation changed to {} degrees", rotation.degrees());
        self.announce(next);
    }

    /// Record the active device's facing. Mirroring follows front-facing;
    /// switching between two devices with equal mirroring fires nothing,
    /// a mirror change fires exactly one notification.
    pub fn set_facing(&self, front_facing: bool) {
        let prev = self.current();
        if prev.mirrored == front_facing {
            return;
        }
        let next = Orientation {
            mirrored: front_facing,
            ..prev
        };
        self.current.store(Arc::new(next));
        debug!("Orientation mirroring changed to {}", front_facing);
        self.announce(next);
    }

    /// Normalize `size` to the device posture: dimensions are swapped only
    /// when the posture implied by the current rotation differs from the
    /// posture implied by `size` itself.
    pub fn oriented_size(&self, size: Size) -> Size {
        let landscape_posture = self.current().rotation.is_sideways();
        if landscape_posture == size.is_landscape() {
            size
        } else {
            size.swapped()
        }
    }

    /// Buffer allocation size: dimensions ordered (max, min) regardless of
    /// posture. Intentionally independent of [`Self::oriented_size`].
    pub fn default_buffer_size(&self, size: Size) -> Size {
        size.ordered_desc()
    }
}

impl Default for OrientationTracker {
    fn default() -> Self {
        Self::new()
    }
}
