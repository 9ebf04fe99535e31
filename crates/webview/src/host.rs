//! Host Facade
//!
//! `Host` is the thread-safe public surface. Every command is posted to the
//! affine thread and applied to `HostState`, which owns the engine, the
//! session registry, the storage contexts and the script bridge.
//!
//! Unknown session ids are silent no-ops: callers race with teardown.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::oneshot;

use crate::bridge::{script, Continuation, InboundMessage, ScriptBridge, ScriptOutcome};
use crate::config::HostConfig;
use crate::cookies::{self, CookieJar};
use crate::dispatcher::AffinityDispatcher;
use crate::engine::{
    modifiers, CreationTicket, Engine, EngineEvent, EngineEvents, EngineSettings, FrameId,
    KeyEvent, MouseButton, MouseEvent, Point, ProcessMessage, Rect, SessionHandle, SessionId,
    ViewGeometry, ERR_ABORTED,
};
use crate::error::{Error, Result};
use crate::gesture::{CompositionPhase, MultiClickPolicy, PointerCommand};
use crate::registry::{CreationReply, SessionRegistry};
use crate::sinks::{ChannelInvocation, ConsoleMessage, EventSinks, LoadFailure, StorageFallback};
use crate::storage::StorageContextManager;

/// Host-side surface a session renders into (texture id, window handle...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresentationHandle(pub i64);

/// Mints and releases presentation surfaces for sessions
pub trait PresentationFactory: Send {
    fn create(&mut self, session: SessionId) -> Option<PresentationHandle>;
    fn release(&mut self, session: SessionId, handle: PresentationHandle);
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedSession {
    pub id: SessionId,
    pub presentation: Option<PresentationHandle>,
}

struct HostInner {
    dispatcher: AffinityDispatcher<HostState>,
    config: HostConfig,
}

/// Cloneable handle to a running host
#[derive(Clone)]
pub struct Host {
    inner: Arc<HostInner>,
}

/// Non-owning [`Host`] reference
#[derive(Clone)]
pub struct WeakHost {
    inner: Weak<HostInner>,
}

impl WeakHost {
    pub fn upgrade(&self) -> Option<Host> {
        self.inner.upgrade().map(|inner| Host { inner })
    }
}

impl Host {
    /// Start the affine thread and build the engine on it
    pub fn start<F>(config: HostConfig, engine_factory: F) -> Result<Self>
    where
        F: FnOnce(EngineEvents) -> Box<dyn Engine> + Send + 'static,
    {
        let state_config = config.clone();
        let dispatcher = AffinityDispatcher::spawn("webview-affine", move |affine| {
            let engine = engine_factory(EngineEvents::new(affine));
            HostState::new(engine, state_config)
        })?;

        tracing::info!(app_id = %config.app_id, "Host started");
        Ok(Self {
            inner: Arc::new(HostInner { dispatcher, config }),
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    pub fn downgrade(&self) -> WeakHost {
        WeakHost {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn post<F>(&self, f: F)
    where
        F: FnOnce(&mut HostState) + Send + 'static,
    {
        self.inner.dispatcher.run_affine(f);
    }

    /// Add event sinks; they see every event from now on
    pub fn attach_sinks(&self, sinks: EventSinks) {
        self.post(move |state| state.sinks.extend(sinks));
    }

    pub fn set_presentation_factory(&self, factory: Box<dyn PresentationFactory>) {
        self.post(move |state| state.presentation_factory = Some(factory));
    }

    /// Initialize the engine. Later calls are no-ops.
    pub async fn init(&self, user_agent: Option<String>) -> Result<()> {
        self.inner
            .dispatcher
            .call(move |state| state.init(user_agent))
            .await?
    }

    /// Wait until every task posted so far, and what it triggered, has run
    pub async fn flush(&self) -> Result<()> {
        self.inner.dispatcher.call(|_| ()).await
    }

    // ---- Sessions ----

    /// Create a session and wait for the engine to confirm it.
    ///
    /// An empty `profile` shares the global storage context.
    pub async fn create(
        &self,
        url: impl Into<String>,
        profile: impl Into<String>,
    ) -> Result<CreatedSession> {
        let (url, profile) = (url.into(), profile.into());
        let (tx, rx) = oneshot::channel();
        self.post(move |state| state.create(url, profile, tx));
        rx.await.map_err(|_| Error::DispatcherGone)?
    }

    /// Blocking [`create`](Self::create), for threads outside any async runtime
    pub fn create_blocking(
        &self,
        url: impl Into<String>,
        profile: impl Into<String>,
    ) -> Result<CreatedSession> {
        if self.inner.dispatcher.is_affine_thread() {
            return Err(Error::AffineReentry);
        }
        let (url, profile) = (url.into(), profile.into());
        let (tx, rx) = oneshot::channel();
        self.post(move |state| state.create(url, profile, tx));
        rx.blocking_recv().map_err(|_| Error::DispatcherGone)?
    }

    pub fn close(&self, id: SessionId) {
        self.post(move |state| {
            state.registry.request_close(id, true);
        });
    }

    pub async fn session_ids(&self) -> Result<Vec<SessionId>> {
        self.inner.dispatcher.call(|state| state.registry.ids()).await
    }

    // ---- Navigation ----

    pub fn load_url(&self, id: SessionId, url: impl Into<String>) {
        let url = url.into();
        self.post(move |state| state.load_url(id, &url));
    }

    pub fn go_back(&self, id: SessionId) {
        self.post(move |state| {
            if let Some(handle) = state.handle(id) {
                if handle.can_go_back() {
                    handle.go_back();
                }
            }
        });
    }

    pub fn go_forward(&self, id: SessionId) {
        self.post(move |state| {
            if let Some(handle) = state.handle(id) {
                if handle.can_go_forward() {
                    handle.go_forward();
                }
            }
        });
    }

    pub fn reload(&self, id: SessionId) {
        self.post(move |state| {
            if let Some(handle) = state.handle(id) {
                handle.reload();
            }
        });
    }

    pub fn open_dev_tools(&self, id: SessionId) {
        self.post(move |state| {
            if let Some(handle) = state.handle(id) {
                handle.show_dev_tools();
            }
        });
    }

    // ---- View and input ----

    /// Non-positive values fall back to 1
    pub fn set_size(&self, id: SessionId, dpi: f32, width: i32, height: i32) {
        self.post(move |state| state.set_size(id, ViewGeometry::clamped(dpi, width, height)));
    }

    /// `button`: 0 left, 1 middle, 2 right
    pub fn cursor_down(&self, id: SessionId, x: i32, y: i32, button: i32) {
        let now = Instant::now();
        self.post(move |state| {
            let policy = state.click_policy;
            state.pointer(id, |gesture| {
                gesture.pointer_down(Point::new(x, y), MouseButton::from_code(button), now, &policy)
            });
        });
    }

    pub fn cursor_up(&self, id: SessionId, x: i32, y: i32, button: i32) {
        self.post(move |state| {
            state.pointer(id, |gesture| {
                gesture.pointer_up(Point::new(x, y), MouseButton::from_code(button))
            });
        });
    }

    pub fn cursor_move(&self, id: SessionId, x: i32, y: i32) {
        self.post(move |state| {
            state.pointer(id, |gesture| gesture.pointer_move(Point::new(x, y), false));
        });
    }

    /// Move with the left button held
    pub fn cursor_drag(&self, id: SessionId, x: i32, y: i32) {
        self.post(move |state| {
            state.pointer(id, |gesture| gesture.pointer_move(Point::new(x, y), true));
        });
    }

    pub fn scroll(&self, id: SessionId, x: i32, y: i32, delta_x: i32, delta_y: i32) {
        self.post(move |state| {
            if let Some(handle) = state.handle(id) {
                let (dx, dy) = wheel_deltas(delta_x, delta_y);
                handle.send_mouse_wheel(MouseEvent::at(Point::new(x, y), 0), dx, dy);
            }
        });
    }

    /// Route a key event to the focused session
    pub fn send_key_event(&self, event: KeyEvent) {
        self.post(move |state| state.key_event(&event));
    }

    pub fn set_focus(&self, id: SessionId, focused: bool) {
        self.post(move |state| state.set_focus(id, focused));
    }

    pub fn ime_set_composition(&self, id: SessionId, text: impl Into<String>) {
        let text = text.into();
        self.post(move |state| {
            if let Some(session) = state.registry.lookup_mut(id) {
                let (gesture, handle) = session.input_parts();
                let selection = gesture.ime_mut().set_composition(&text);
                if let Some(handle) = handle {
                    handle.ime_set_composition(&text, selection);
                }
            }
        });
    }

    pub fn ime_commit_text(&self, id: SessionId, text: impl Into<String>) {
        let text = text.into();
        self.post(move |state| {
            if let Some(session) = state.registry.lookup_mut(id) {
                let (gesture, handle) = session.input_parts();
                gesture.ime_mut().commit();
                if let Some(handle) = handle {
                    handle.ime_commit_text(&text);
                    handle.ime_finish_composing();
                }
            }
        });
    }

    // ---- Cookies ----

    pub fn set_cookie(&self, domain: impl Into<String>, name: impl Into<String>, value: impl Into<String>) {
        let (domain, name, value) = (domain.into(), name.into(), value.into());
        self.post(move |state| {
            if let Err(err) = cookies::set(state.engine.cookie_manager(), &domain, &name, &value) {
                tracing::warn!(domain = %domain, error = %err, "Cookie not set");
            }
        });
    }

    pub fn delete_cookie(&self, domain: impl Into<String>, name: impl Into<String>) {
        let (domain, name) = (domain.into(), name.into());
        self.post(move |state| {
            if let Err(err) = cookies::delete(state.engine.cookie_manager(), &domain, &name) {
                tracing::warn!(domain = %domain, error = %err, "Cookie not deleted");
            }
        });
    }

    pub async fn visit_all_cookies(&self) -> Result<CookieJar> {
        let (tx, rx) = oneshot::channel::<Result<CookieJar>>();
        self.post(move |state| {
            if !state.initialized {
                let _ = tx.send(Err(Error::NotInitialized));
                return;
            }
            cookies::visit_all(state.engine.cookie_manager(), move |jar| {
                let _ = tx.send(Ok(jar));
            });
        });
        rx.await.map_err(|_| Error::DispatcherGone)?
    }

    pub async fn visit_url_cookies(
        &self,
        domain: impl Into<String>,
        include_http_only: bool,
    ) -> Result<CookieJar> {
        let domain = domain.into();
        let (tx, rx) = oneshot::channel::<Result<CookieJar>>();
        self.post(move |state| {
            if !state.initialized {
                let _ = tx.send(Err(Error::NotInitialized));
                return;
            }
            let url = match cookies::cookie_url(&domain) {
                Ok(url) => url,
                Err(err) => {
                    let _ = tx.send(Err(err));
                    return;
                }
            };
            cookies::visit_url(state.engine.cookie_manager(), &url, include_http_only, move |jar| {
                let _ = tx.send(Ok(jar));
            });
        });
        rx.await.map_err(|_| Error::DispatcherGone)?
    }

    // ---- Script bridge ----

    /// Expose `names` as global functions in the session's main frame
    pub fn set_script_channels(&self, id: SessionId, names: Vec<String>) {
        self.post(move |state| {
            if let Some(handle) = state.registry.handle_mut(id) {
                state.bridge.install_channels(&mut **handle, &names);
            }
        });
    }

    /// Complete a channel call made from content
    pub fn send_channel_callback(
        &self,
        id: SessionId,
        is_error: bool,
        result: impl Into<String>,
        token: impl Into<String>,
        frame: impl Into<String>,
    ) {
        let (result, token, frame) = (result.into(), token.into(), frame.into());
        self.post(move |state| {
            if let Some(handle) = state.registry.handle_mut(id) {
                state
                    .bridge
                    .send_channel_callback(&mut **handle, is_error, &result, &token, &frame);
            }
        });
    }

    pub fn execute_script(&self, id: SessionId, code: impl Into<String>) {
        let code = code.into();
        self.post(move |state| {
            if let Some(handle) = state.registry.handle_mut(id) {
                state.bridge.execute(&mut **handle, &code);
            }
        });
    }

    /// Evaluate in the main frame; `continuation` runs on the affine thread.
    ///
    /// Never runs if the session is torn down before the result arrives.
    pub fn evaluate_with(&self, id: SessionId, code: impl Into<String>, continuation: Continuation) {
        let code = code.into();
        self.post(move |state| match state.registry.handle_mut(id) {
            Some(handle) => {
                state.bridge.evaluate(&mut **handle, &code, continuation);
            }
            None => {
                tracing::debug!(session = id, "Evaluate for unknown session");
                continuation(Ok(Value::Null));
            }
        });
    }

    /// Evaluate in the main frame and wait for the value.
    ///
    /// The request is posted before this returns. A thrown error becomes
    /// [`Error::Script`]; teardown before the result becomes [`Error::Cancelled`].
    pub fn evaluate(
        &self,
        id: SessionId,
        code: impl Into<String>,
    ) -> impl Future<Output = Result<Value>> + Send + 'static {
        let (tx, rx) = oneshot::channel::<ScriptOutcome>();
        self.evaluate_with(
            id,
            code,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );
        async move {
            match rx.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(message)) => Err(Error::Script(message)),
                Err(_) => Err(Error::Cancelled),
            }
        }
    }

    // ---- Teardown ----

    /// Mute and close every session, give confirmations `quit_grace` to land,
    /// shut the engine down, then stop the affine thread.
    pub async fn quit(&self) -> Result<()> {
        let closing = self.inner.dispatcher.call(|state| state.begin_quit()).await?;
        tracing::info!(sessions = closing, "Quitting");

        tokio::time::sleep(self.inner.config.quit_grace()).await;
        self.inner.dispatcher.call(|state| state.finish_quit()).await?;

        let inner = self.inner.clone();
        if tokio::task::spawn_blocking(move || inner.dispatcher.stop())
            .await
            .is_err()
        {
            tracing::error!("Affine thread stop panicked");
        }
        Ok(())
    }
}

/// Wheel deltas as the engine expects them: scaled and Y-inverted except on macOS
fn wheel_deltas(delta_x: i32, delta_y: i32) -> (i32, i32) {
    if cfg!(target_os = "macos") {
        (delta_x, delta_y)
    } else {
        (delta_x.saturating_mul(3), delta_y.saturating_mul(-3))
    }
}

/// Everything the affine thread owns
pub struct HostState {
    engine: Box<dyn Engine>,
    config: HostConfig,
    initialized: bool,
    registry: SessionRegistry,
    storage: StorageContextManager,
    bridge: ScriptBridge,
    sinks: EventSinks,
    presentation_factory: Option<Box<dyn PresentationFactory>>,
    presentations: HashMap<SessionId, PresentationHandle>,
    focused: Option<SessionId>,
    click_policy: MultiClickPolicy,
}

impl HostState {
    fn new(engine: Box<dyn Engine>, config: HostConfig) -> Self {
        let storage =
            StorageContextManager::new(&config.cache_root(), config.persist_session_cookies);
        Self {
            engine,
            click_policy: MultiClickPolicy::from(&config.multi_click),
            config,
            initialized: false,
            registry: SessionRegistry::new(),
            storage,
            bridge: ScriptBridge::new(),
            sinks: EventSinks::new(),
            presentation_factory: None,
            presentations: HashMap::new(),
            focused: None,
        }
    }

    fn handle(&mut self, id: SessionId) -> Option<&mut Box<dyn SessionHandle>> {
        let handle = self.registry.handle_mut(id);
        if handle.is_none() {
            tracing::debug!(session = id, "Unknown session");
        }
        handle
    }

    fn init(&mut self, user_agent: Option<String>) -> Result<()> {
        if self.initialized {
            tracing::debug!("Engine already initialized");
            return Ok(());
        }
        if user_agent.is_some() {
            self.config.user_agent = user_agent;
        }

        let root = self.config.cache_root();
        if let Err(err) = std::fs::create_dir_all(&root) {
            tracing::warn!(path = ?root, error = %err, "Cannot create cache root");
        }

        self.engine.initialize(&EngineSettings {
            user_agent: self.config.user_agent.clone(),
            root_cache_path: root.clone(),
            persist_session_cookies: self.config.persist_session_cookies,
            windowless_rendering: true,
        })?;
        self.initialized = true;
        tracing::info!(cache_root = ?root, "Engine initialized");
        Ok(())
    }

    fn create(&mut self, url: String, profile: String, reply: CreationReply) {
        if !self.initialized {
            let _ = reply.send(Err(Error::NotInitialized));
            return;
        }

        let resolved = self.storage.resolve(self.engine.as_mut(), &profile);
        if let Some(err) = resolved.fallback {
            let fallback = StorageFallback {
                profile: profile.clone(),
                reason: err.to_string(),
            };
            self.sinks.diagnostics(|sink| sink.storage_fallback(&fallback));
        }

        self.registry.begin_create(
            self.engine.as_mut(),
            resolved.context,
            &url,
            self.config.windowless_frame_rate,
            reply,
        );
    }

    fn load_url(&mut self, id: SessionId, url: &str) {
        let Some(handle) = self.handle(id) else {
            return;
        };
        match handle.main_frame() {
            Some(frame) => handle.load_url(frame, url),
            None => tracing::debug!(session = id, "No main frame, load dropped"),
        }
    }

    fn set_size(&mut self, id: SessionId, geometry: ViewGeometry) {
        let Some(session) = self.registry.lookup_mut(id) else {
            return;
        };
        session.set_geometry(geometry);
        if let Some(handle) = session.handle_mut() {
            handle.was_resized(geometry);
        }
    }

    /// Feed one pointer input through the session's gesture state
    fn pointer<F>(&mut self, id: SessionId, interpret: F)
    where
        F: FnOnce(&mut crate::gesture::GestureState) -> PointerCommand,
    {
        let Some(session) = self.registry.lookup_mut(id) else {
            tracing::debug!(session = id, "Pointer input for unknown session");
            return;
        };
        let (gesture, handle) = session.input_parts();
        let command = interpret(gesture);
        let Some(handle) = handle else {
            return;
        };
        let handle: &mut dyn SessionHandle = &mut **handle;

        match command {
            PointerCommand::Click {
                event,
                button,
                mouse_up,
                click_count,
            } => handle.send_mouse_click(event, button, mouse_up, click_count),
            PointerCommand::ContextMenu { at } => {
                self.bridge.synthesize_context_menu(handle, None, at);
            }
            PointerCommand::Move { event } => handle.send_mouse_move(event, false),
            PointerCommand::DragOver { event } => handle.drag_target_drag_over(event),
            PointerCommand::Drop { event } => {
                handle.drag_target_drop(event);
                handle.drag_source_ended(Point::new(event.x, event.y));
            }
            PointerCommand::Nothing => {}
        }
    }

    fn key_event(&mut self, event: &KeyEvent) {
        let Some(id) = self.focused else {
            tracing::debug!("Key event without a focused session");
            return;
        };
        let Some(handle) = self.handle(id) else {
            return;
        };
        handle.send_key_event(event);
        if event.is_dev_tools_shortcut() {
            handle.show_dev_tools();
        }
    }

    fn set_focus(&mut self, id: SessionId, focused: bool) {
        let Some(session) = self.registry.lookup_mut(id) else {
            tracing::debug!(session = id, "Focus for unknown session");
            return;
        };
        session.set_focused(focused);
        if let Some(handle) = session.handle_mut() {
            handle.set_focus(focused);
        }

        if focused {
            if let Some(previous) = self.focused.replace(id).filter(|prev| *prev != id) {
                if let Some(session) = self.registry.lookup_mut(previous) {
                    session.set_focused(false);
                }
            }
        } else if self.focused == Some(id) {
            self.focused = None;
        }
    }

    fn begin_quit(&mut self) -> usize {
        let live = self.registry.len();
        self.registry.close_all(true, true);
        live
    }

    fn finish_quit(&mut self) {
        if !self.registry.is_empty() {
            tracing::warn!(remaining = self.registry.len(), "Sessions still open at shutdown");
        }
        if self.initialized {
            self.engine.shutdown();
            self.initialized = false;
            tracing::info!("Engine shut down");
        }
    }

    // ---- Engine notifications ----

    pub(crate) fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::SessionCreated { ticket, session } => self.session_created(ticket, session),
            EngineEvent::SessionCreationFailed { ticket, reason } => {
                self.registry.creation_failed(ticket, reason)
            }
            EngineEvent::SessionClosed { session } => self.session_closed(session),
            EngineEvent::LoadStart { session, is_main, url } => {
                if is_main {
                    self.sinks.navigation(|sink| sink.load_started(session, &url));
                }
            }
            EngineEvent::LoadEnd {
                session,
                is_main,
                url,
                http_status,
            } => {
                if is_main {
                    self.sinks
                        .navigation(|sink| sink.load_finished(session, &url, http_status));
                }
            }
            EngineEvent::LoadError {
                session,
                frame,
                is_main,
                code,
                text,
                failed_url,
            } => self.load_error(session, frame, is_main, code, text, failed_url),
            EngineEvent::AddressChanged { session, is_main, url } => {
                if is_main {
                    self.sinks.navigation(|sink| sink.url_changed(session, &url));
                }
            }
            EngineEvent::TitleChanged { session, title } => {
                self.sinks.presentation(|sink| sink.title_changed(session, &title));
            }
            EngineEvent::CursorChanged { session, cursor } => {
                self.sinks.presentation(|sink| sink.cursor_changed(session, cursor));
            }
            EngineEvent::Tooltip { session, text } => {
                self.sinks.presentation(|sink| sink.tooltip(session, &text));
            }
            EngineEvent::ConsoleMessage {
                session,
                level,
                message,
                source,
                line,
            } => {
                let message = ConsoleMessage {
                    session,
                    level,
                    message,
                    source,
                    line,
                };
                self.sinks.presentation(|sink| sink.console_message(&message));
            }
            EngineEvent::GotFocus { session } => {
                self.sinks.presentation(|sink| sink.focused(session));
            }
            EngineEvent::StartDragging { session, at } => self.start_dragging(session, at),
            EngineEvent::ImeCompositionRangeChanged {
                session,
                character_bounds,
            } => self.composition_range_changed(session, &character_bounds),
            EngineEvent::ContextMenuRequested { session, frame, at } => {
                if let Some(handle) = self.registry.handle_mut(session) {
                    self.bridge
                        .synthesize_context_menu(&mut **handle, Some(frame), at);
                }
            }
            EngineEvent::PopupRequested {
                session,
                target_url,
                ..
            } => {
                tracing::debug!(session, url = %target_url, "Popup redirected to main frame");
                self.load_url(session, &target_url);
            }
            EngineEvent::ProcessMessage {
                session,
                frame,
                message,
            } => self.process_message(session, frame, &message),
        }
    }

    fn session_created(&mut self, ticket: CreationTicket, handle: Box<dyn SessionHandle>) {
        let Some((id, reply)) = self.registry.confirm_created(ticket, handle) else {
            return;
        };
        let presentation = self
            .presentation_factory
            .as_mut()
            .and_then(|factory| factory.create(id));
        if let Some(presentation) = presentation {
            self.presentations.insert(id, presentation);
        }
        if reply.send(Ok(CreatedSession { id, presentation })).is_err() {
            tracing::debug!(session = id, "Creator stopped waiting");
        }
    }

    fn session_closed(&mut self, id: SessionId) {
        self.bridge.discard_session(id);
        if self.registry.remove(id).is_none() {
            tracing::debug!(session = id, "Teardown for unknown session");
        }
        if let Some(presentation) = self.presentations.remove(&id) {
            if let Some(factory) = self.presentation_factory.as_mut() {
                factory.release(id, presentation);
            }
        }
        if self.focused == Some(id) {
            self.focused = None;
        }
    }

    fn load_error(
        &mut self,
        session: SessionId,
        frame: FrameId,
        is_main: bool,
        code: i32,
        text: String,
        failed_url: String,
    ) {
        if self.config.engine_error_ui || code == ERR_ABORTED {
            tracing::debug!(session, code, "Load error left to the engine");
            return;
        }
        let Some(handle) = self.registry.handle_mut(session) else {
            return;
        };
        tracing::warn!(session, code, is_main, url = %failed_url, error = %text, "Load failed");

        let page = script::error_page(&failed_url, &text, code);
        handle.load_url(frame, &script::data_uri(&page, "text/html"));

        let failure = LoadFailure {
            session,
            url: failed_url,
            code,
            text,
        };
        self.sinks.navigation(|sink| sink.load_failed(&failure));
    }

    fn start_dragging(&mut self, id: SessionId, at: Point) {
        let Some(session) = self.registry.lookup_mut(id) else {
            return;
        };
        let (gesture, handle) = session.input_parts();
        if !gesture.begin_drag() {
            return;
        }
        if let Some(handle) = handle {
            handle.drag_target_drag_enter(MouseEvent::at(at, modifiers::LEFT_MOUSE_BUTTON));
        }
    }

    fn composition_range_changed(&mut self, id: SessionId, bounds: &[Rect]) {
        let Some(session) = self.registry.lookup_mut(id) else {
            return;
        };
        if let Some((at, phase)) = session.gesture_mut().ime_mut().composition_range_changed(bounds) {
            self.sinks.input(|sink| sink.composition_anchor(id, at, phase));
        }
    }

    fn process_message(&mut self, session: SessionId, frame: FrameId, message: &ProcessMessage) {
        let Some(inbound) = InboundMessage::decode(message) else {
            tracing::debug!(session, name = %message.name, "Dropping malformed bridge message");
            return;
        };

        match inbound {
            InboundMessage::FocusedNodeChanged { editable, caret } => {
                self.sinks
                    .input(|sink| sink.focused_node_changed(session, editable, caret));
                if let (true, Some(caret)) = (editable, caret) {
                    if let Some(record) = self.registry.lookup_mut(session) {
                        record.gesture_mut().ime_mut().set_anchor(caret);
                    }
                    self.sinks.input(|sink| {
                        sink.composition_anchor(session, caret, CompositionPhase::Composing)
                    });
                }
            }
            InboundMessage::ChannelInvocation {
                function,
                argument,
                callback_token,
            } => {
                let invocation = ChannelInvocation {
                    session,
                    frame,
                    function,
                    argument,
                    callback_token,
                };
                self.sinks.channels(|sink| sink.channel_invoked(&invocation));
            }
            InboundMessage::EvaluationResult {
                correlation,
                outcome,
            } => {
                let reported = outcome.clone();
                if self.bridge.resolve(session, correlation, outcome) {
                    self.sinks
                        .scripts(|sink| sink.script_resolved(session, correlation, &reported));
                }
            }
        }
    }
}
