//! Bridge implementation that maps domain events to broadcast transport.
//!
//! The [`BroadcastEventBridge`] lives at the boundary between domain services
//! and transport concerns, mapping typed domain events to the WebSocket
//! broadcast channel. Sending never blocks; events published with no
//! subscribers are simply dropped.

use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{BroadcastEvent, CastEvent, ControllerEvent};

/// Bridges domain events to the WebSocket broadcast channel.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Creates a new bridge wrapping an existing broadcast sender.
    #[must_use]
    pub fn with_sender(tx: broadcast::Sender<BroadcastEvent>) -> Self {
        Self { tx }
    }

    /// Returns a new receiver for the broadcast channel.
    ///
    /// WebSocket handlers use this to subscribe to events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }

    /// Returns a reference to the broadcast sender.
    #[must_use]
    pub fn sender(&self) -> &broadcast::Sender<BroadcastEvent> {
        &self.tx
    }
}

/// Generates an [`EventEmitter`] method that maps the event into the
/// broadcast envelope and sends it without blocking.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Err(e) = self.tx.send(BroadcastEvent::$variant(event)) {
                log::trace!("[EventBridge] no broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_cast, CastEvent, Cast);
    impl_emit!(emit_controller, ControllerEvent, Controller);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::CastStatus;

    #[tokio::test]
    async fn bridge_forwards_events_to_subscribers() {
        let bridge = BroadcastEventBridge::new(8);
        let mut rx = bridge.subscribe();

        bridge.emit_cast(CastEvent::StatusChanged {
            status: CastStatus::Connected,
            timestamp: 1,
        });

        match rx.recv().await.unwrap() {
            BroadcastEvent::Cast(CastEvent::StatusChanged { status, .. }) => {
                assert_eq!(status, CastStatus::Connected);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emitting_without_subscribers_does_not_panic() {
        let bridge = BroadcastEventBridge::new(8);
        bridge.emit_controller(ControllerEvent::SelectCore {
            core_id: "c1".into(),
            timestamp: 0,
        });
    }
}
