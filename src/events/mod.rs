//! Event fan-out for pipeline state notifications
//!
//! A broadcast-backed bus distributes tagged pipeline events to any number
//! of subscribers (host application, tests, telemetry adapters).

pub mod types;

pub use types::PipelineEvent;

use tokio::sync::broadcast;

/// Event channel capacity (ring buffer size)
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Broadcast bus for pipeline events
///
/// Events are fire-and-forget: publishing with no active subscribers drops
/// the event, and a subscriber that falls too far behind sees a `Lagged`
/// error rather than stalling the publisher.
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: PipelineEvent) {
        // send errors only when there are no subscribers, which is normal
        let _ = self.tx.send(event);
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(PipelineEvent::BackpressureChanged { active: true });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, PipelineEvent::BackpressureChanged { active: true }));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(PipelineEvent::CaptureClosed {
            device: "/dev/video0".to_string(),
        });

        assert!(matches!(rx1.recv().await.unwrap(), PipelineEvent::CaptureClosed { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), PipelineEvent::CaptureClosed { .. }));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        // Must not panic
        bus.publish(PipelineEvent::BackpressureChanged { active: false });
    }
}
