//! Engine Client - the rendering engine as the host sees it
//!
//! Design decisions:
//! 1. The engine lives on the affine thread and is never shared, so the trait
//!    does not require `Send`
//! 2. Calls into the engine are synchronous; everything the engine reports
//!    back arrives as an [`EngineEvent`] posted through [`EngineEvents`]
//! 3. Session creation is confirmed asynchronously, correlated by ticket

use thiserror::Error;
use url::Url;

use super::protocol::{
    ContextHandle, ContextSettings, Cookie, CreateParams, CreationTicket, EngineSettings, FrameId,
    Point, ProcessMessage, Rect, SessionId,
};
use super::session::SessionHandle;
use crate::dispatcher::AffineHandle;
use crate::host::HostState;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine unavailable")]
    Unavailable,

    #[error("Engine rejected request: {0}")]
    Rejected(String),
}

/// Receives the outcome of a cookie visit
pub type CookieVisitor = Box<dyn FnOnce(Vec<Cookie>) + Send + 'static>;

/// The engine's cookie store
pub trait CookieManager {
    fn set_cookie(&mut self, url: &Url, cookie: Cookie);
    fn delete_cookies(&mut self, url: &Url, name: &str);
    fn visit_all(&mut self, visitor: CookieVisitor);
    fn visit_url(&mut self, url: &Url, include_http_only: bool, visitor: CookieVisitor);
}

pub trait Engine {
    fn initialize(&mut self, settings: &EngineSettings) -> Result<(), EngineError>;

    /// Build an isolated, persistent storage context
    fn create_context(&mut self, settings: &ContextSettings) -> Result<ContextHandle, EngineError>;

    /// Start creating a session. Confirmation follows as
    /// `SessionCreated`/`SessionCreationFailed` carrying `params.ticket`.
    fn create_session(&mut self, params: CreateParams) -> Result<(), EngineError>;

    /// Global cookie manager, if the engine has one right now
    fn cookie_manager(&mut self) -> Option<&mut dyn CookieManager>;

    fn shutdown(&mut self);
}

/// Notifications the engine posts back to the host
pub enum EngineEvent {
    SessionCreated {
        ticket: CreationTicket,
        session: Box<dyn SessionHandle>,
    },
    SessionCreationFailed {
        ticket: CreationTicket,
        reason: String,
    },
    /// Teardown confirmed; the handle is dead
    SessionClosed {
        session: SessionId,
    },
    LoadStart {
        session: SessionId,
        is_main: bool,
        url: String,
    },
    LoadEnd {
        session: SessionId,
        is_main: bool,
        url: String,
        http_status: i32,
    },
    LoadError {
        session: SessionId,
        frame: FrameId,
        is_main: bool,
        code: i32,
        text: String,
        failed_url: String,
    },
    AddressChanged {
        session: SessionId,
        is_main: bool,
        url: String,
    },
    TitleChanged {
        session: SessionId,
        title: String,
    },
    CursorChanged {
        session: SessionId,
        cursor: i32,
    },
    Tooltip {
        session: SessionId,
        text: String,
    },
    ConsoleMessage {
        session: SessionId,
        level: i32,
        message: String,
        source: String,
        line: i32,
    },
    GotFocus {
        session: SessionId,
    },
    /// The engine started a drag inside the session's content
    StartDragging {
        session: SessionId,
        at: Point,
    },
    ImeCompositionRangeChanged {
        session: SessionId,
        character_bounds: Vec<Rect>,
    },
    /// The engine wants to show its native context menu
    ContextMenuRequested {
        session: SessionId,
        frame: FrameId,
        at: Point,
    },
    /// Content asked to open a new window
    PopupRequested {
        session: SessionId,
        frame: Option<FrameId>,
        target_url: String,
    },
    /// Inbound message from the script execution context
    ProcessMessage {
        session: SessionId,
        frame: FrameId,
        message: ProcessMessage,
    },
}

impl std::fmt::Debug for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineEvent::SessionCreated { ticket, session } => f
                .debug_struct("SessionCreated")
                .field("ticket", ticket)
                .field("session", &session.id())
                .finish(),
            EngineEvent::SessionCreationFailed { ticket, reason } => f
                .debug_struct("SessionCreationFailed")
                .field("ticket", ticket)
                .field("reason", reason)
                .finish(),
            EngineEvent::SessionClosed { session } => {
                f.debug_struct("SessionClosed").field("session", session).finish()
            }
            other => f
                .debug_struct("EngineEvent")
                .field("session", &other.session())
                .finish_non_exhaustive(),
        }
    }
}

impl EngineEvent {
    /// Session the event belongs to, once one exists
    pub fn session(&self) -> Option<SessionId> {
        match self {
            EngineEvent::SessionCreated { session, .. } => Some(session.id()),
            EngineEvent::SessionCreationFailed { .. } => None,
            EngineEvent::SessionClosed { session }
            | EngineEvent::LoadStart { session, .. }
            | EngineEvent::LoadEnd { session, .. }
            | EngineEvent::LoadError { session, .. }
            | EngineEvent::AddressChanged { session, .. }
            | EngineEvent::TitleChanged { session, .. }
            | EngineEvent::CursorChanged { session, .. }
            | EngineEvent::Tooltip { session, .. }
            | EngineEvent::ConsoleMessage { session, .. }
            | EngineEvent::GotFocus { session }
            | EngineEvent::StartDragging { session, .. }
            | EngineEvent::ImeCompositionRangeChanged { session, .. }
            | EngineEvent::ContextMenuRequested { session, .. }
            | EngineEvent::PopupRequested { session, .. }
            | EngineEvent::ProcessMessage { session, .. } => Some(*session),
        }
    }
}

/// Cloneable channel the engine adapter uses to report back.
///
/// Safe to use from any thread; delivery always happens on the affine thread,
/// in posting order.
#[derive(Clone)]
pub struct EngineEvents {
    affine: AffineHandle<HostState>,
}

impl EngineEvents {
    pub(crate) fn new(affine: AffineHandle<HostState>) -> Self {
        Self { affine }
    }

    pub fn post(&self, event: EngineEvent) {
        self.affine
            .run_affine(move |state| state.handle_engine_event(event));
    }
}
