//! Script Bridge
//!
//! Correlates host -> script evaluations with the results that come back
//! over the process-message channel, and completes script -> host channel
//! calls.
//!
//! Design decisions:
//! 1. Correlation ids come from a counter, never from the clock
//! 2. A pending call is registered before its script is submitted
//! 3. Each continuation runs at most once; late or unknown results are ignored
//! 4. Teardown discards a session's pending calls without running them

pub mod message;
pub mod script;

use std::collections::HashMap;

use crate::engine::{FrameId, Point, SessionHandle, SessionId};

pub use message::{InboundMessage, ScriptOutcome};

/// Receives the outcome of one evaluation
pub type Continuation = Box<dyn FnOnce(ScriptOutcome) + Send + 'static>;

struct PendingCall {
    session: SessionId,
    continuation: Continuation,
}

#[derive(Default)]
pub struct ScriptBridge {
    next_correlation: u64,
    pending: HashMap<u64, PendingCall>,
}

impl ScriptBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire-and-forget execution in the main frame
    pub fn execute(&self, handle: &mut dyn SessionHandle, code: &str) -> bool {
        let Some(frame) = handle.main_frame() else {
            tracing::debug!(session = handle.id(), "No main frame, script dropped");
            return false;
        };
        handle.execute_script(frame, code);
        true
    }

    /// Evaluate `code` in the main frame and hand the outcome to `continuation`.
    ///
    /// Returns the correlation id, or `None` when nothing was submitted.
    pub fn evaluate(
        &mut self,
        handle: &mut dyn SessionHandle,
        code: &str,
        continuation: Continuation,
    ) -> Option<u64> {
        let session = handle.id();
        if code.trim().is_empty() {
            continuation(Ok(serde_json::Value::Null));
            return None;
        }
        let Some(frame) = handle.main_frame() else {
            tracing::debug!(session, "No main frame, evaluation dropped");
            return None;
        };

        self.next_correlation += 1;
        let correlation = self.next_correlation;
        self.pending.insert(
            correlation,
            PendingCall {
                session,
                continuation,
            },
        );

        tracing::debug!(session, correlation, "Submitting evaluation");
        handle.execute_script(frame, &script::wrap_evaluation(correlation, code));
        Some(correlation)
    }

    /// Deliver a result reported by `session`.
    ///
    /// Unknown ids (already resolved, or torn down) are ignored. A result for
    /// another session's call is ignored too and that call stays pending.
    pub fn resolve(&mut self, session: SessionId, correlation: u64, outcome: ScriptOutcome) -> bool {
        match self.pending.get(&correlation) {
            Some(call) if call.session != session => {
                tracing::debug!(
                    session,
                    owner = call.session,
                    correlation,
                    "Result from foreign session ignored"
                );
                false
            }
            Some(_) => {
                let Some(call) = self.pending.remove(&correlation) else {
                    return false;
                };
                tracing::debug!(session, correlation, "Evaluation resolved");
                (call.continuation)(outcome);
                true
            }
            None => {
                tracing::debug!(session, correlation, "Result for unknown correlation ignored");
                false
            }
        }
    }

    /// Forget every pending call of `session` without running it
    pub fn discard_session(&mut self, session: SessionId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, call| call.session != session);
        let discarded = before - self.pending.len();
        if discarded > 0 {
            tracing::debug!(session, discarded, "Discarded pending evaluations");
        }
        discarded
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Complete a script-side channel callback inside `frame`.
    ///
    /// Dropped when the token or frame is malformed, or when `frame` is no
    /// longer the main frame.
    pub fn send_channel_callback(
        &self,
        handle: &mut dyn SessionHandle,
        is_error: bool,
        result: &str,
        token: &str,
        frame: &str,
    ) -> bool {
        let session = handle.id();
        let Some(token) = message::parse_callback_token(token) else {
            tracing::debug!(session, token = %token, "Malformed callback token");
            return false;
        };
        let Some(frame) = message::parse_frame_id(frame) else {
            tracing::debug!(session, frame = %frame, "Malformed frame id");
            return false;
        };
        if handle.main_frame() != Some(frame) {
            tracing::debug!(session, frame, "Frame navigated away, callback dropped");
            return false;
        }
        handle.send_process_message(frame, message::channel_callback(token, is_error, result));
        true
    }

    pub fn install_channels(&self, handle: &mut dyn SessionHandle, names: &[String]) -> bool {
        self.execute(handle, &script::install_channels(names))
    }

    /// Run a content-level `contextmenu` at `at`, in `frame` or the main frame
    pub fn synthesize_context_menu(
        &self,
        handle: &mut dyn SessionHandle,
        frame: Option<FrameId>,
        at: Point,
    ) -> bool {
        let Some(frame) = frame.or_else(|| handle.main_frame()) else {
            return false;
        };
        handle.execute_script(frame, &script::context_menu(at));
        true
    }
}
