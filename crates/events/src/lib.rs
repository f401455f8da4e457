#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for async communication in strap
//!
//! The engine reports every phase to an observer; this crate gives hosts a
//! one-way stream of the same lifecycle as domain events, with metadata and
//! tracing integration, so output and logging live outside the engine.
//!
//! ## Architecture
//!
//! - **Domain-driven events**: Events grouped by phase (Detect, Plan, Apply, Elevation)
//! - **Unified `EventEmitter` trait**: Single, consistent API for all event emissions
//! - **Tracing integration**: Each event knows its log level and target

pub mod meta;
pub use meta::{EventLevel, EventMeta, EventSource};

pub mod events;
pub use events::{
    AppEvent, ApplyEvent, DetectEvent, ElevationEvent, FailureContext, GeneralEvent, PlanEvent,
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// An event together with the metadata captured when it was emitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub meta: EventMeta,
    pub event: AppEvent,
}

impl EventMessage {
    /// Wrap an event, deriving level and source from its domain
    #[must_use]
    pub fn new(event: AppEvent) -> Self {
        let meta = EventMeta::new(event.log_level(), event.event_source());
        Self { meta, event }
    }

    /// Wrap an event and tag it with a correlation id (usually the run id)
    #[must_use]
    pub fn correlated(event: AppEvent, correlation_id: impl Into<String>) -> Self {
        let mut message = Self::new(event);
        message.meta = message.meta.with_correlation_id(correlation_id);
        message
    }
}

/// Type alias for event sender
pub type EventSender = UnboundedSender<EventMessage>;

/// Type alias for event receiver
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<EventMessage>;

/// Create a new event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// The unified trait for emitting events throughout the strap system
///
/// This trait provides a single, consistent API for emitting events regardless of
/// whether you have a raw `EventSender` or a struct that contains one.
pub trait EventEmitter {
    /// Get the event sender for this emitter
    fn event_sender(&self) -> Option<&EventSender>;

    /// Correlation id attached to every emitted event
    fn correlation_id(&self) -> Option<String> {
        None
    }

    /// Emit an event through this emitter
    fn emit(&self, event: AppEvent) {
        if let Some(sender) = self.event_sender() {
            let message = match self.correlation_id() {
                Some(id) => EventMessage::correlated(event, id),
                None => EventMessage::new(event),
            };
            // Ignore send errors - if receiver is dropped, we just continue
            let _ = sender.send(message);
        }
    }

    /// Emit a warning event
    fn emit_warning(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::warning(message)));
    }

    /// Emit an error event
    fn emit_error(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::error(message)));
    }
}

/// Implementation of `EventEmitter` for the raw `EventSender`
/// This allows `EventSender` to be used directly where `EventEmitter` is expected
impl EventEmitter for EventSender {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(self)
    }
}
