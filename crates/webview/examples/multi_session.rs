//! Multi-session example - two profiles on one host, driven from tokio
//!
//! The rendering engine is replaced by a console stand-in that confirms
//! everything immediately, so the example runs anywhere.

use std::ops::Range;
use url::Url;
use webview::engine::{
    ContextHandle, ContextSettings, Cookie, CookieManager, CookieVisitor, CreateParams,
    EngineError, EngineSettings, FrameId, KeyEvent, MouseButton, MouseEvent, Point,
    ProcessMessage, ViewGeometry,
};
use webview::{Engine, EngineEvent, EngineEvents, EventBus, Host, HostConfig, SessionHandle, SessionId};

struct ConsoleEngine {
    events: EngineEvents,
    next_session: SessionId,
    next_context: u64,
    cookies: ConsoleCookies,
}

#[derive(Default)]
struct ConsoleCookies {
    jar: Vec<Cookie>,
}

impl CookieManager for ConsoleCookies {
    fn set_cookie(&mut self, _url: &Url, cookie: Cookie) {
        self.jar.push(cookie);
    }

    fn delete_cookies(&mut self, url: &Url, name: &str) {
        let host = url.host_str().unwrap_or_default();
        self.jar.retain(|c| !(c.domain == host && c.name == name));
    }

    fn visit_all(&mut self, visitor: CookieVisitor) {
        visitor(self.jar.clone());
    }

    fn visit_url(&mut self, url: &Url, _include_http_only: bool, visitor: CookieVisitor) {
        let host = url.host_str().unwrap_or_default();
        visitor(self.jar.iter().filter(|c| c.domain == host).cloned().collect());
    }
}

impl Engine for ConsoleEngine {
    fn initialize(&mut self, settings: &EngineSettings) -> Result<(), EngineError> {
        println!("engine: initialize at {}", settings.root_cache_path.display());
        Ok(())
    }

    fn create_context(&mut self, settings: &ContextSettings) -> Result<ContextHandle, EngineError> {
        self.next_context += 1;
        println!("engine: context {} at {}", self.next_context, settings.cache_path.display());
        Ok(ContextHandle(self.next_context))
    }

    fn create_session(&mut self, params: CreateParams) -> Result<(), EngineError> {
        self.next_session += 1;
        let session = ConsoleSession {
            id: self.next_session,
            events: self.events.clone(),
        };
        println!("engine: session {} opens {}", session.id, params.url);
        self.events.post(EngineEvent::SessionCreated {
            ticket: params.ticket,
            session: Box::new(session),
        });
        Ok(())
    }

    fn cookie_manager(&mut self) -> Option<&mut dyn CookieManager> {
        Some(&mut self.cookies)
    }

    fn shutdown(&mut self) {
        println!("engine: shutdown");
    }
}

struct ConsoleSession {
    id: SessionId,
    events: EngineEvents,
}

impl SessionHandle for ConsoleSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn main_frame(&self) -> Option<FrameId> {
        Some(1)
    }

    fn load_url(&mut self, _frame: FrameId, url: &str) {
        let session = self.id;
        self.events.post(EngineEvent::LoadStart {
            session,
            is_main: true,
            url: url.to_string(),
        });
        self.events.post(EngineEvent::AddressChanged {
            session,
            is_main: true,
            url: url.to_string(),
        });
        self.events.post(EngineEvent::LoadEnd {
            session,
            is_main: true,
            url: url.to_string(),
            http_status: 200,
        });
    }

    fn can_go_back(&self) -> bool {
        false
    }

    fn go_back(&mut self) {}

    fn can_go_forward(&self) -> bool {
        false
    }

    fn go_forward(&mut self) {}

    fn reload(&mut self) {}

    fn execute_script(&mut self, _frame: FrameId, code: &str) {
        println!("session {}: script of {} bytes", self.id, code.len());
    }

    fn send_process_message(&mut self, _frame: FrameId, message: ProcessMessage) {
        println!("session {}: message {}", self.id, message.name);
    }

    fn was_resized(&mut self, geometry: ViewGeometry) {
        println!("session {}: {}x{}", self.id, geometry.width, geometry.height);
    }

    fn send_mouse_click(&mut self, event: MouseEvent, button: MouseButton, mouse_up: bool, click_count: u8) {
        println!(
            "session {}: {:?} {} at {},{} (x{})",
            self.id,
            button,
            if mouse_up { "up" } else { "down" },
            event.x,
            event.y,
            click_count
        );
    }

    fn send_mouse_move(&mut self, _event: MouseEvent, _mouse_leave: bool) {}

    fn send_mouse_wheel(&mut self, _event: MouseEvent, _delta_x: i32, _delta_y: i32) {}

    fn send_key_event(&mut self, _event: &KeyEvent) {}

    fn drag_target_drag_enter(&mut self, _event: MouseEvent) {}

    fn drag_target_drag_over(&mut self, _event: MouseEvent) {}

    fn drag_target_drop(&mut self, _event: MouseEvent) {}

    fn drag_source_ended(&mut self, _at: Point) {}

    fn set_focus(&mut self, _focused: bool) {}

    fn ime_set_composition(&mut self, _text: &str, _selection: Range<u32>) {}

    fn ime_commit_text(&mut self, _text: &str) {}

    fn ime_finish_composing(&mut self) {}

    fn show_dev_tools(&mut self) {}

    fn set_audio_muted(&mut self, _muted: bool) {}

    fn close(&mut self, force: bool) {
        println!("session {}: close (force={})", self.id, force);
        self.events.post(EngineEvent::SessionClosed { session: self.id });
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = HostConfig {
        cache_root: Some(std::env::temp_dir().join("webview-multi-session")),
        quit_grace_ms: 100,
        ..HostConfig::default()
    };
    let host = Host::start(config, |events| -> Box<dyn Engine> {
        Box::new(ConsoleEngine {
            events,
            next_session: 0,
            next_context: 0,
            cookies: ConsoleCookies::default(),
        })
    })?;

    // Subscribe to events before anything happens
    let bus = EventBus::new(host.config().event_capacity);
    let mut event_rx = bus.subscribe();
    host.attach_sinks(bus.sinks());
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            println!("event: {}", serde_json::to_string(&event).unwrap_or_default());
        }
    });

    host.init(Some("webview-example/0.1".to_string())).await?;

    let work = host.create("https://www.rust-lang.org", "work").await?;
    let personal = host.create("https://crates.io", "personal").await?;
    println!("sessions: {:?}", host.session_ids().await?);

    host.set_size(work.id, 2.0, 1280, 720);
    host.load_url(personal.id, "https://docs.rs");
    host.cursor_down(work.id, 100, 100, 0);
    host.cursor_up(work.id, 100, 100, 0);
    host.cursor_down(work.id, 100, 100, 0);
    host.cursor_up(work.id, 100, 100, 0);

    host.set_cookie("example.com", "theme", "dark");
    let jar = host.visit_all_cookies().await?;
    println!("cookies: {:?}", jar);

    host.close(personal.id);
    host.flush().await?;
    println!("sessions after close: {:?}", host.session_ids().await?);

    host.quit().await?;
    println!("host stopped");
    Ok(())
}
