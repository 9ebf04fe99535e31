//! Event Bus - every host event as one serializable enum
//!
//! Design: `BusSink` implements all sink interfaces and republishes each
//! callback onto a tokio broadcast channel, for hosts that prefer a stream
//! over callbacks.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::bridge::ScriptOutcome;
use crate::engine::{Point, SessionId};
use crate::gesture::CompositionPhase;
use crate::sinks::{
    outcome_value, ChannelInvocation, ChannelSink, ConsoleMessage, DiagnosticSink, EventSinks,
    InputFeedbackSink, LoadFailure, NavigationSink, PresentationSink, ScriptResultSink,
    StorageFallback,
};

/// Session-originated events, by sink category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    LoadStarted { session: SessionId, url: String },
    LoadFinished { session: SessionId, url: String, http_status: i32 },
    LoadFailed(LoadFailure),
    UrlChanged { session: SessionId, url: String },
    Focused { session: SessionId },
    TitleChanged { session: SessionId, title: String },
    CursorChanged { session: SessionId, cursor: i32 },
    Tooltip { session: SessionId, text: String },
    Console(ConsoleMessage),
    FocusedNodeChanged { session: SessionId, editable: bool, caret: Option<Point> },
    CompositionAnchor { session: SessionId, at: Point, phase: CompositionPhase },
    ChannelInvoked(ChannelInvocation),
    ScriptResolved { session: SessionId, correlation: u64, is_error: bool, value: Value },
    StorageFallback(StorageFallback),
}

impl HostEvent {
    /// Session the event belongs to; `None` for host-wide diagnostics
    pub fn session(&self) -> Option<SessionId> {
        match self {
            HostEvent::LoadStarted { session, .. }
            | HostEvent::LoadFinished { session, .. }
            | HostEvent::UrlChanged { session, .. }
            | HostEvent::Focused { session }
            | HostEvent::TitleChanged { session, .. }
            | HostEvent::CursorChanged { session, .. }
            | HostEvent::Tooltip { session, .. }
            | HostEvent::FocusedNodeChanged { session, .. }
            | HostEvent::CompositionAnchor { session, .. }
            | HostEvent::ScriptResolved { session, .. } => Some(*session),
            HostEvent::LoadFailed(failure) => Some(failure.session),
            HostEvent::Console(message) => Some(message.session),
            HostEvent::ChannelInvoked(invocation) => Some(invocation.session),
            HostEvent::StorageFallback(_) => None,
        }
    }
}

/// Broadcast channel of [`HostEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HostEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event
    pub fn publish(&self, event: HostEvent) {
        let _ = self.tx.send(event); // Ignore error if no subscribers
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.tx.subscribe()
    }

    /// Sinks that republish onto this bus
    pub fn sinks(&self) -> EventSinks {
        let mut sinks = EventSinks::new();
        sinks.add_all(Arc::new(BusSink { bus: self.clone() }));
        sinks
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

struct BusSink {
    bus: EventBus,
}

impl NavigationSink for BusSink {
    fn load_started(&self, session: SessionId, url: &str) {
        self.bus.publish(HostEvent::LoadStarted {
            session,
            url: url.to_string(),
        });
    }

    fn load_finished(&self, session: SessionId, url: &str, http_status: i32) {
        self.bus.publish(HostEvent::LoadFinished {
            session,
            url: url.to_string(),
            http_status,
        });
    }

    fn load_failed(&self, failure: &LoadFailure) {
        self.bus.publish(HostEvent::LoadFailed(failure.clone()));
    }

    fn url_changed(&self, session: SessionId, url: &str) {
        self.bus.publish(HostEvent::UrlChanged {
            session,
            url: url.to_string(),
        });
    }
}

impl PresentationSink for BusSink {
    fn focused(&self, session: SessionId) {
        self.bus.publish(HostEvent::Focused { session });
    }

    fn title_changed(&self, session: SessionId, title: &str) {
        self.bus.publish(HostEvent::TitleChanged {
            session,
            title: title.to_string(),
        });
    }

    fn cursor_changed(&self, session: SessionId, cursor: i32) {
        self.bus.publish(HostEvent::CursorChanged { session, cursor });
    }

    fn tooltip(&self, session: SessionId, text: &str) {
        self.bus.publish(HostEvent::Tooltip {
            session,
            text: text.to_string(),
        });
    }

    fn console_message(&self, message: &ConsoleMessage) {
        self.bus.publish(HostEvent::Console(message.clone()));
    }
}

impl InputFeedbackSink for BusSink {
    fn focused_node_changed(&self, session: SessionId, editable: bool, caret: Option<Point>) {
        self.bus.publish(HostEvent::FocusedNodeChanged {
            session,
            editable,
            caret,
        });
    }

    fn composition_anchor(&self, session: SessionId, at: Point, phase: CompositionPhase) {
        self.bus
            .publish(HostEvent::CompositionAnchor { session, at, phase });
    }
}

impl ChannelSink for BusSink {
    fn channel_invoked(&self, invocation: &ChannelInvocation) {
        self.bus.publish(HostEvent::ChannelInvoked(invocation.clone()));
    }
}

impl ScriptResultSink for BusSink {
    fn script_resolved(&self, session: SessionId, correlation: u64, outcome: &ScriptOutcome) {
        self.bus.publish(HostEvent::ScriptResolved {
            session,
            correlation,
            is_error: outcome.is_err(),
            value: outcome_value(outcome),
        });
    }
}

impl DiagnosticSink for BusSink {
    fn storage_fallback(&self, fallback: &StorageFallback) {
        self.bus.publish(HostEvent::StorageFallback(fallback.clone()));
    }
}
