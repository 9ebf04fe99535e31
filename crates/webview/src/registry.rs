//! Session Registry
//!
//! Owns every live session record, keyed by the id the engine assigned.
//! Lives inside the affine state, so nothing here locks.
//!
//! Lifecycle:
//! 1. `begin_create` parks a pending creation under a fresh ticket, then asks
//!    the engine
//! 2. `confirm_created` turns the ticket into a session once the engine
//!    reports the id
//! 3. `request_close` asks the engine to tear down; the record stays
//! 4. `remove` drops the record when the engine confirms teardown

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::engine::{
    CreateParams, CreationTicket, Engine, FrameId, SessionHandle, SessionId, ViewGeometry,
};
use crate::error::{Error, Result};
use crate::gesture::GestureState;
use crate::host::CreatedSession;
use crate::storage::StorageContext;

/// Where the outcome of a creation request is delivered
pub type CreationReply = oneshot::Sender<Result<CreatedSession>>;

/// URL used when a session is created without one
pub const BLANK_URL: &str = "about:blank";

/// Per-session record
pub struct Session {
    id: SessionId,
    handle: Option<Box<dyn SessionHandle>>,
    geometry: ViewGeometry,
    gesture: GestureState,
    focused: bool,
    closing: bool,
    context: Arc<StorageContext>,
}

impl Session {
    fn new(handle: Box<dyn SessionHandle>, context: Arc<StorageContext>) -> Self {
        Self {
            id: handle.id(),
            handle: Some(handle),
            geometry: ViewGeometry::default(),
            gesture: GestureState::default(),
            focused: false,
            closing: false,
            context,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Live engine handle; `None` once teardown was confirmed
    pub fn handle_mut(&mut self) -> Option<&mut Box<dyn SessionHandle>> {
        self.handle.as_mut()
    }

    pub fn main_frame(&self) -> Option<FrameId> {
        self.handle.as_ref().and_then(|handle| handle.main_frame())
    }

    pub fn geometry(&self) -> ViewGeometry {
        self.geometry
    }

    pub fn set_geometry(&mut self, geometry: ViewGeometry) {
        self.geometry = geometry;
    }

    pub fn gesture(&self) -> &GestureState {
        &self.gesture
    }

    pub fn gesture_mut(&mut self) -> &mut GestureState {
        &mut self.gesture
    }

    /// Gesture state and engine handle together, for input routing
    pub fn input_parts(&mut self) -> (&mut GestureState, Option<&mut Box<dyn SessionHandle>>) {
        (&mut self.gesture, self.handle.as_mut())
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn context(&self) -> &Arc<StorageContext> {
        &self.context
    }
}

struct PendingCreation {
    context: Arc<StorageContext>,
    reply: CreationReply,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    pending: HashMap<CreationTicket, PendingCreation>,
    next_ticket: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the engine for a new session.
    ///
    /// The pending entry exists before the engine is called, so even a
    /// confirmation delivered synchronously finds it. Failures go to `reply`.
    pub fn begin_create(
        &mut self,
        engine: &mut dyn Engine,
        context: Arc<StorageContext>,
        url: &str,
        frame_rate: u32,
        reply: CreationReply,
    ) -> Option<CreationTicket> {
        self.next_ticket += 1;
        let ticket = CreationTicket(self.next_ticket);
        let url = if url.is_empty() { BLANK_URL } else { url };

        let params = CreateParams {
            ticket,
            url: url.to_string(),
            frame_rate,
            context: context.handle(),
        };
        self.pending
            .insert(ticket, PendingCreation { context, reply });

        tracing::debug!(ticket = ticket.0, url = %url, "Requesting session creation");
        match engine.create_session(params) {
            Ok(()) => Some(ticket),
            Err(err) => {
                tracing::error!(ticket = ticket.0, error = %err, "Engine refused session creation");
                self.creation_failed(ticket, err.to_string());
                None
            }
        }
    }

    /// Record the engine's confirmation. Returns the new id and where to
    /// deliver it, or `None` when the confirmation cannot be used.
    pub fn confirm_created(
        &mut self,
        ticket: CreationTicket,
        mut handle: Box<dyn SessionHandle>,
    ) -> Option<(SessionId, CreationReply)> {
        let id = handle.id();
        let Some(pending) = self.pending.remove(&ticket) else {
            tracing::warn!(ticket = ticket.0, session = id, "Unsolicited session, closing it");
            handle.close(true);
            return None;
        };

        if self.sessions.contains_key(&id) {
            tracing::warn!(session = id, "Engine reused a live session id, closing the newcomer");
            handle.close(true);
            let _ = pending.reply.send(Err(Error::SessionCreation(format!(
                "duplicate session id {id}"
            ))));
            return None;
        }

        tracing::info!(
            session = id,
            profile = pending.context.profile_id().unwrap_or(""),
            "Session created"
        );
        self.sessions
            .insert(id, Session::new(handle, pending.context));
        Some((id, pending.reply))
    }

    /// The engine gave up on a creation request
    pub fn creation_failed(&mut self, ticket: CreationTicket, reason: String) {
        match self.pending.remove(&ticket) {
            Some(pending) => {
                tracing::warn!(ticket = ticket.0, reason = %reason, "Session creation failed");
                let _ = pending.reply.send(Err(Error::SessionCreation(reason)));
            }
            None => tracing::debug!(ticket = ticket.0, "Failure for unknown creation ticket"),
        }
    }

    pub fn lookup(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn lookup_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Live engine handle of `id`, if any
    pub fn handle_mut(&mut self, id: SessionId) -> Option<&mut Box<dyn SessionHandle>> {
        self.sessions.get_mut(&id)?.handle_mut()
    }

    /// Ask the engine to tear `id` down. A second request is a no-op.
    pub fn request_close(&mut self, id: SessionId, force: bool) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            tracing::debug!(session = id, "Close for unknown session");
            return false;
        };
        if session.closing {
            tracing::debug!(session = id, "Close already requested");
            return false;
        }
        session.closing = true;
        if let Some(handle) = session.handle.as_mut() {
            tracing::info!(session = id, force, "Closing session");
            handle.close(force);
        }
        true
    }

    /// Request teardown of every live session, optionally muting first.
    ///
    /// A forced pass re-issues the close for sessions already closing.
    pub fn close_all(&mut self, force: bool, mute: bool) {
        for id in self.ids() {
            if mute {
                if let Some(handle) = self.handle_mut(id) {
                    handle.set_audio_muted(true);
                }
            }
            let closing = self.lookup(id).is_some_and(|session| session.is_closing());
            if !(force && closing) {
                self.request_close(id, force);
                continue;
            }
            if let Some(handle) = self.handle_mut(id) {
                tracing::info!(session = id, "Forcing close of closing session");
                handle.close(true);
            }
        }
    }

    /// Drop the record of a session whose teardown the engine confirmed
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let mut session = self.sessions.remove(&id)?;
        session.handle = None;
        tracing::info!(session = id, "Session removed");
        Some(session)
    }

    /// Snapshot of the live ids
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn pending_creations(&self) -> usize {
        self.pending.len()
    }
}
