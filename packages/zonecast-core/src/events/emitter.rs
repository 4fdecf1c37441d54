//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete
//! broadcast channels, enabling testing and alternative delivery paths.

use super::{CastEvent, ControllerEvent};

/// Trait for emitting domain events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Emits a cast-domain event.
    fn emit_cast(&self, event: CastEvent);

    /// Emits a controller-boundary event.
    fn emit_controller(&self, event: ControllerEvent);
}

/// No-op emitter for tests that don't observe events.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_cast(&self, _event: CastEvent) {}

    fn emit_controller(&self, _event: ControllerEvent) {}
}

/// Logging emitter for debugging and development.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_cast(&self, event: CastEvent) {
        tracing::debug!(?event, "cast_event");
    }

    fn emit_controller(&self, event: ControllerEvent) {
        tracing::debug!(?event, "controller_event");
    }
}
