//! Host event sinks
//!
//! One named interface per category of session-originated event. Every
//! method has a no-op default, so a sink implements only what it cares
//! about. Callbacks run on the affine thread and must not block.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::bridge::ScriptOutcome;
use crate::engine::{FrameId, Point, SessionId};
use crate::gesture::CompositionPhase;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadFailure {
    pub session: SessionId,
    pub url: String,
    pub code: i32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    pub session: SessionId,
    pub level: i32,
    pub message: String,
    pub source: String,
    pub line: i32,
}

/// A call from content to a host-exposed channel function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInvocation {
    pub session: SessionId,
    pub frame: FrameId,
    pub function: String,
    pub argument: String,
    /// Empty when the caller passed no callback
    pub callback_token: String,
}

/// A profile that had to share the global storage context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageFallback {
    pub profile: String,
    pub reason: String,
}

pub trait NavigationSink: Send + Sync {
    fn load_started(&self, _session: SessionId, _url: &str) {}
    fn load_finished(&self, _session: SessionId, _url: &str, _http_status: i32) {}
    fn load_failed(&self, _failure: &LoadFailure) {}
    fn url_changed(&self, _session: SessionId, _url: &str) {}
}

pub trait PresentationSink: Send + Sync {
    fn focused(&self, _session: SessionId) {}
    fn title_changed(&self, _session: SessionId, _title: &str) {}
    fn cursor_changed(&self, _session: SessionId, _cursor: i32) {}
    fn tooltip(&self, _session: SessionId, _text: &str) {}
    fn console_message(&self, _message: &ConsoleMessage) {}
}

pub trait InputFeedbackSink: Send + Sync {
    /// Focus moved inside content; `caret` is where an IME window would anchor
    fn focused_node_changed(&self, _session: SessionId, _editable: bool, _caret: Option<Point>) {}
    fn composition_anchor(&self, _session: SessionId, _at: Point, _phase: CompositionPhase) {}
}

pub trait ChannelSink: Send + Sync {
    fn channel_invoked(&self, _invocation: &ChannelInvocation) {}
}

pub trait ScriptResultSink: Send + Sync {
    fn script_resolved(&self, _session: SessionId, _correlation: u64, _outcome: &ScriptOutcome) {}
}

pub trait DiagnosticSink: Send + Sync {
    fn storage_fallback(&self, _fallback: &StorageFallback) {}
}

/// Sinks attached to a host, by category
#[derive(Default, Clone)]
pub struct EventSinks {
    navigation: Vec<Arc<dyn NavigationSink>>,
    presentation: Vec<Arc<dyn PresentationSink>>,
    input: Vec<Arc<dyn InputFeedbackSink>>,
    channels: Vec<Arc<dyn ChannelSink>>,
    scripts: Vec<Arc<dyn ScriptResultSink>>,
    diagnostics: Vec<Arc<dyn DiagnosticSink>>,
}

impl EventSinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_navigation(&mut self, sink: Arc<dyn NavigationSink>) {
        self.navigation.push(sink);
    }

    pub fn add_presentation(&mut self, sink: Arc<dyn PresentationSink>) {
        self.presentation.push(sink);
    }

    pub fn add_input(&mut self, sink: Arc<dyn InputFeedbackSink>) {
        self.input.push(sink);
    }

    pub fn add_channels(&mut self, sink: Arc<dyn ChannelSink>) {
        self.channels.push(sink);
    }

    pub fn add_scripts(&mut self, sink: Arc<dyn ScriptResultSink>) {
        self.scripts.push(sink);
    }

    pub fn add_diagnostics(&mut self, sink: Arc<dyn DiagnosticSink>) {
        self.diagnostics.push(sink);
    }

    /// Register one sink for every category
    pub fn add_all<T>(&mut self, sink: Arc<T>)
    where
        T: NavigationSink
            + PresentationSink
            + InputFeedbackSink
            + ChannelSink
            + ScriptResultSink
            + DiagnosticSink
            + 'static,
    {
        self.navigation.push(sink.clone());
        self.presentation.push(sink.clone());
        self.input.push(sink.clone());
        self.channels.push(sink.clone());
        self.scripts.push(sink.clone());
        self.diagnostics.push(sink);
    }

    /// Append every sink of `other`
    pub fn extend(&mut self, other: EventSinks) {
        self.navigation.extend(other.navigation);
        self.presentation.extend(other.presentation);
        self.input.extend(other.input);
        self.channels.extend(other.channels);
        self.scripts.extend(other.scripts);
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn navigation(&self, f: impl Fn(&dyn NavigationSink)) {
        self.navigation.iter().for_each(|sink| f(sink.as_ref()));
    }

    pub fn presentation(&self, f: impl Fn(&dyn PresentationSink)) {
        self.presentation.iter().for_each(|sink| f(sink.as_ref()));
    }

    pub fn input(&self, f: impl Fn(&dyn InputFeedbackSink)) {
        self.input.iter().for_each(|sink| f(sink.as_ref()));
    }

    pub fn channels(&self, f: impl Fn(&dyn ChannelSink)) {
        self.channels.iter().for_each(|sink| f(sink.as_ref()));
    }

    pub fn scripts(&self, f: impl Fn(&dyn ScriptResultSink)) {
        self.scripts.iter().for_each(|sink| f(sink.as_ref()));
    }

    pub fn diagnostics(&self, f: impl Fn(&dyn DiagnosticSink)) {
        self.diagnostics.iter().for_each(|sink| f(sink.as_ref()));
    }

    pub fn is_empty(&self) -> bool {
        self.navigation.is_empty()
            && self.presentation.is_empty()
            && self.input.is_empty()
            && self.channels.is_empty()
            && self.scripts.is_empty()
            && self.diagnostics.is_empty()
    }
}

/// Serializable form of a script outcome, for sinks that forward it
pub fn outcome_value(outcome: &ScriptOutcome) -> Value {
    match outcome {
        Ok(value) => value.clone(),
        Err(message) => serde_json::json!({ "error": message }),
    }
}
