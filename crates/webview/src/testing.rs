//! Recording stand-in engine for unit tests
//!
//! `FakeEngine` and every `FakeSession` it mints append to one shared
//! `EngineLog`. Knobs on the log steer how the fake answers. When built with
//! `EngineEvents`, creation and teardown are confirmed the way a real engine
//! does it: by posting back to the affine thread.

use parking_lot::Mutex;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::HostConfig;
use crate::host::Host;

use crate::engine::{
    ContextHandle, ContextSettings, Cookie, CookieManager, CookieVisitor, CreateParams, Engine,
    EngineError, EngineEvent, EngineEvents, EngineSettings, FrameId, KeyEvent, MouseButton,
    MouseEvent, Point, ProcessMessage, SessionHandle, SessionId, ViewGeometry,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Initialize { user_agent: Option<String>, root: PathBuf },
    CreateContext { cache_path: PathBuf },
    CreateSession { url: String, context: ContextHandle, frame_rate: u32 },
    Shutdown,
    SetCookie { url: String, cookie: Cookie },
    DeleteCookies { url: String, name: String },
    LoadUrl { session: SessionId, frame: FrameId, url: String },
    GoBack { session: SessionId },
    GoForward { session: SessionId },
    Reload { session: SessionId },
    ExecuteScript { session: SessionId, frame: FrameId, code: String },
    ProcessMessage { session: SessionId, frame: FrameId, message: ProcessMessage },
    Resized { session: SessionId, geometry: ViewGeometry },
    MouseClick {
        session: SessionId,
        event: MouseEvent,
        button: MouseButton,
        mouse_up: bool,
        click_count: u8,
    },
    MouseMove { session: SessionId, event: MouseEvent, leave: bool },
    MouseWheel { session: SessionId, event: MouseEvent, delta_x: i32, delta_y: i32 },
    Key { session: SessionId, event: KeyEvent },
    DragEnter { session: SessionId, event: MouseEvent },
    DragOver { session: SessionId, event: MouseEvent },
    Drop { session: SessionId, event: MouseEvent },
    DragSourceEnded { session: SessionId, at: Point },
    Focus { session: SessionId, focused: bool },
    ImeSetComposition { session: SessionId, text: String, selection: Range<u32> },
    ImeCommit { session: SessionId, text: String },
    ImeFinish { session: SessionId },
    DevTools { session: SessionId },
    Mute { session: SessionId, muted: bool },
    Close { session: SessionId, force: bool },
}

pub(crate) struct EngineLog {
    pub calls: Vec<Call>,
    /// `create_context` fails
    pub fail_contexts: bool,
    /// `create_session` fails synchronously
    pub fail_sessions: bool,
    /// `create_session` succeeds, then reports `SessionCreationFailed`
    pub report_creation_failure: bool,
    /// Teardown requests are confirmed with `SessionClosed`
    pub confirm_close: bool,
    pub cookie_manager: bool,
    /// Cookie visits drop the visitor without calling it
    pub drop_visitors: bool,
    pub cookies: Vec<Cookie>,
    pub history: bool,
    pub next_session: SessionId,
    pub next_context: u64,
    /// Channel back to the host, once an attached engine exists
    pub events: Option<EngineEvents>,
}

impl Default for EngineLog {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            fail_contexts: false,
            fail_sessions: false,
            report_creation_failure: false,
            confirm_close: true,
            cookie_manager: true,
            drop_visitors: false,
            cookies: Vec::new(),
            history: false,
            next_session: 1,
            next_context: 1,
            events: None,
        }
    }
}

pub(crate) type SharedLog = Arc<Mutex<EngineLog>>;

pub(crate) fn shared_log() -> SharedLog {
    Arc::new(Mutex::new(EngineLog::default()))
}

/// Frame id the fake assigns as main frame of `session`
pub(crate) fn main_frame_of(session: SessionId) -> FrameId {
    session as FrameId * 100
}

/// Poll `check` until it holds or a second has passed
pub(crate) async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Initialized host over a `FakeEngine` writing to `log`, caching under a temp dir
pub(crate) async fn running_host(log: &SharedLog) -> (Host, tempfile::TempDir) {
    let root = tempfile::tempdir().unwrap();
    let config = HostConfig {
        cache_root: Some(root.path().to_path_buf()),
        quit_grace_ms: 0,
        ..HostConfig::default()
    };
    let engine_log = log.clone();
    let host = Host::start(config, move |events| -> Box<dyn Engine> {
        Box::new(FakeEngine::new(engine_log, events))
    })
    .unwrap();
    host.init(None).await.unwrap();
    (host, root)
}

pub(crate) struct FakeEngine {
    log: SharedLog,
    events: Option<EngineEvents>,
    cookies: FakeCookies,
}

impl FakeEngine {
    pub fn new(log: SharedLog, events: EngineEvents) -> Self {
        log.lock().events = Some(events.clone());
        Self {
            cookies: FakeCookies { log: log.clone() },
            log,
            events: Some(events),
        }
    }

    /// Engine with nobody listening: creation is never confirmed
    pub fn detached(log: SharedLog) -> Self {
        Self {
            cookies: FakeCookies { log: log.clone() },
            log,
            events: None,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().calls.clone()
    }
}

impl Engine for FakeEngine {
    fn initialize(&mut self, settings: &EngineSettings) -> Result<(), EngineError> {
        self.log.lock().calls.push(Call::Initialize {
            user_agent: settings.user_agent.clone(),
            root: settings.root_cache_path.clone(),
        });
        Ok(())
    }

    fn create_context(&mut self, settings: &ContextSettings) -> Result<ContextHandle, EngineError> {
        let mut log = self.log.lock();
        log.calls.push(Call::CreateContext {
            cache_path: settings.cache_path.clone(),
        });
        if log.fail_contexts {
            return Err(EngineError::Rejected("context refused".to_string()));
        }
        let handle = ContextHandle(log.next_context);
        log.next_context += 1;
        Ok(handle)
    }

    fn create_session(&mut self, params: CreateParams) -> Result<(), EngineError> {
        let (id, report_failure) = {
            let mut log = self.log.lock();
            log.calls.push(Call::CreateSession {
                url: params.url.clone(),
                context: params.context,
                frame_rate: params.frame_rate,
            });
            if log.fail_sessions {
                return Err(EngineError::Unavailable);
            }
            let id = log.next_session;
            log.next_session += 1;
            (id, log.report_creation_failure)
        };

        if let Some(events) = &self.events {
            if report_failure {
                events.post(EngineEvent::SessionCreationFailed {
                    ticket: params.ticket,
                    reason: "renderer crashed".to_string(),
                });
            } else {
                events.post(EngineEvent::SessionCreated {
                    ticket: params.ticket,
                    session: Box::new(FakeSession::new(id, self.log.clone(), Some(events.clone()))),
                });
            }
        }
        Ok(())
    }

    fn cookie_manager(&mut self) -> Option<&mut dyn CookieManager> {
        if self.log.lock().cookie_manager {
            Some(&mut self.cookies)
        } else {
            None
        }
    }

    fn shutdown(&mut self) {
        self.log.lock().calls.push(Call::Shutdown);
    }
}

struct FakeCookies {
    log: SharedLog,
}

impl CookieManager for FakeCookies {
    fn set_cookie(&mut self, url: &Url, cookie: Cookie) {
        let mut log = self.log.lock();
        log.calls.push(Call::SetCookie {
            url: url.to_string(),
            cookie: cookie.clone(),
        });
        log.cookies
            .retain(|c| !(c.domain == cookie.domain && c.name == cookie.name));
        log.cookies.push(cookie);
    }

    fn delete_cookies(&mut self, url: &Url, name: &str) {
        let mut log = self.log.lock();
        log.calls.push(Call::DeleteCookies {
            url: url.to_string(),
            name: name.to_string(),
        });
        let host = url.host_str().unwrap_or_default().to_string();
        log.cookies
            .retain(|c| !(c.domain.trim_start_matches('.') == host && c.name == name));
    }

    fn visit_all(&mut self, visitor: CookieVisitor) {
        if self.log.lock().drop_visitors {
            return;
        }
        let cookies = self.log.lock().cookies.clone();
        visitor(cookies);
    }

    fn visit_url(&mut self, url: &Url, include_http_only: bool, visitor: CookieVisitor) {
        if self.log.lock().drop_visitors {
            return;
        }
        let host = url.host_str().unwrap_or_default().to_string();
        let cookies = self
            .log
            .lock()
            .cookies
            .iter()
            .filter(|c| c.domain.trim_start_matches('.') == host)
            .filter(|c| include_http_only || !c.http_only)
            .cloned()
            .collect();
        visitor(cookies);
    }
}

pub(crate) struct FakeSession {
    id: SessionId,
    main_frame: Option<FrameId>,
    log: SharedLog,
    events: Option<EngineEvents>,
}

impl FakeSession {
    pub fn new(id: SessionId, log: SharedLog, events: Option<EngineEvents>) -> Self {
        Self {
            id,
            main_frame: Some(main_frame_of(id)),
            log,
            events,
        }
    }

    pub fn without_main_frame(id: SessionId, log: SharedLog) -> Self {
        Self {
            id,
            main_frame: None,
            log,
            events: None,
        }
    }

    fn record(&self, call: Call) {
        self.log.lock().calls.push(call);
    }
}

impl SessionHandle for FakeSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn main_frame(&self) -> Option<FrameId> {
        self.main_frame
    }

    fn load_url(&mut self, frame: FrameId, url: &str) {
        self.record(Call::LoadUrl {
            session: self.id,
            frame,
            url: url.to_string(),
        });
    }

    fn can_go_back(&self) -> bool {
        self.log.lock().history
    }

    fn go_back(&mut self) {
        self.record(Call::GoBack { session: self.id });
    }

    fn can_go_forward(&self) -> bool {
        self.log.lock().history
    }

    fn go_forward(&mut self) {
        self.record(Call::GoForward { session: self.id });
    }

    fn reload(&mut self) {
        self.record(Call::Reload { session: self.id });
    }

    fn execute_script(&mut self, frame: FrameId, code: &str) {
        self.record(Call::ExecuteScript {
            session: self.id,
            frame,
            code: code.to_string(),
        });
    }

    fn send_process_message(&mut self, frame: FrameId, message: ProcessMessage) {
        self.record(Call::ProcessMessage {
            session: self.id,
            frame,
            message,
        });
    }

    fn was_resized(&mut self, geometry: ViewGeometry) {
        self.record(Call::Resized {
            session: self.id,
            geometry,
        });
    }

    fn send_mouse_click(&mut self, event: MouseEvent, button: MouseButton, mouse_up: bool, click_count: u8) {
        self.record(Call::MouseClick {
            session: self.id,
            event,
            button,
            mouse_up,
            click_count,
        });
    }

    fn send_mouse_move(&mut self, event: MouseEvent, mouse_leave: bool) {
        self.record(Call::MouseMove {
            session: self.id,
            event,
            leave: mouse_leave,
        });
    }

    fn send_mouse_wheel(&mut self, event: MouseEvent, delta_x: i32, delta_y: i32) {
        self.record(Call::MouseWheel {
            session: self.id,
            event,
            delta_x,
            delta_y,
        });
    }

    fn send_key_event(&mut self, event: &KeyEvent) {
        self.record(Call::Key {
            session: self.id,
            event: event.clone(),
        });
    }

    fn drag_target_drag_enter(&mut self, event: MouseEvent) {
        self.record(Call::DragEnter {
            session: self.id,
            event,
        });
    }

    fn drag_target_drag_over(&mut self, event: MouseEvent) {
        self.record(Call::DragOver {
            session: self.id,
            event,
        });
    }

    fn drag_target_drop(&mut self, event: MouseEvent) {
        self.record(Call::Drop {
            session: self.id,
            event,
        });
    }

    fn drag_source_ended(&mut self, at: Point) {
        self.record(Call::DragSourceEnded {
            session: self.id,
            at,
        });
    }

    fn set_focus(&mut self, focused: bool) {
        self.record(Call::Focus {
            session: self.id,
            focused,
        });
    }

    fn ime_set_composition(&mut self, text: &str, selection: Range<u32>) {
        self.record(Call::ImeSetComposition {
            session: self.id,
            text: text.to_string(),
            selection,
        });
    }

    fn ime_commit_text(&mut self, text: &str) {
        self.record(Call::ImeCommit {
            session: self.id,
            text: text.to_string(),
        });
    }

    fn ime_finish_composing(&mut self) {
        self.record(Call::ImeFinish { session: self.id });
    }

    fn show_dev_tools(&mut self) {
        self.record(Call::DevTools { session: self.id });
    }

    fn set_audio_muted(&mut self, muted: bool) {
        self.record(Call::Mute {
            session: self.id,
            muted,
        });
    }

    fn close(&mut self, force: bool) {
        self.record(Call::Close {
            session: self.id,
            force,
        });
        let confirm = self.log.lock().confirm_close;
        if let (true, Some(events)) = (confirm, &self.events) {
            events.post(EngineEvent::SessionClosed { session: self.id });
        }
    }
}
