//! Engine Protocol Types
//!
//! Plain data exchanged with the rendering engine. Keep them minimal - the
//! engine adapter owns every engine-specific detail.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Session identifier, assigned by the engine when it confirms creation
pub type SessionId = i32;

/// Frame identifier inside one session
pub type FrameId = i64;

/// Error code the engine reports for loads cancelled on purpose (downloads, stop)
pub const ERR_ABORTED: i32 = -3;

/// Keyboard and mouse modifier bits
pub mod modifiers {
    pub const SHIFT_DOWN: u32 = 1 << 1;
    pub const CONTROL_DOWN: u32 = 1 << 2;
    pub const ALT_DOWN: u32 = 1 << 3;
    pub const LEFT_MOUSE_BUTTON: u32 = 1 << 4;
    pub const MIDDLE_MOUSE_BUTTON: u32 = 1 << 5;
    pub const RIGHT_MOUSE_BUTTON: u32 = 1 << 6;
}

/// Correlates a creation request with the engine's confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CreationTicket(pub u64);

/// Opaque engine storage context. `GLOBAL` is the shared default context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextHandle(pub u64);

impl ContextHandle {
    pub const GLOBAL: ContextHandle = ContextHandle(0);

    pub fn is_global(&self) -> bool {
        *self == Self::GLOBAL
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Where an IME candidate window anchors: below the left edge
    pub fn bottom_left(&self) -> Point {
        Point::new(self.x, self.y.saturating_add(self.height))
    }
}

/// Logical view size and device scale of a session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewGeometry {
    pub width: i32,
    pub height: i32,
    pub scale: f32,
}

impl Default for ViewGeometry {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            scale: 1.0,
        }
    }
}

impl ViewGeometry {
    /// Non-positive components fall back to 1
    pub fn clamped(scale: f32, width: i32, height: i32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            scale: if scale > 0.0 { scale } else { 1.0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    /// Host button codes: 1 middle, 2 right, anything else left
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => MouseButton::Middle,
            2 => MouseButton::Right,
            _ => MouseButton::Left,
        }
    }

    pub fn modifier(&self) -> u32 {
        match self {
            MouseButton::Left => modifiers::LEFT_MOUSE_BUTTON,
            MouseButton::Middle => modifiers::MIDDLE_MOUSE_BUTTON,
            MouseButton::Right => modifiers::RIGHT_MOUSE_BUTTON,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MouseEvent {
    pub x: i32,
    pub y: i32,
    pub modifiers: u32,
}

impl MouseEvent {
    pub fn at(point: Point, modifiers: u32) -> Self {
        Self {
            x: point.x,
            y: point.y,
            modifiers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEventKind {
    RawKeyDown,
    KeyDown,
    KeyUp,
    Char,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    pub windows_key_code: i32,
    pub native_key_code: i32,
    pub modifiers: u32,
    pub character: u16,
}

impl KeyEvent {
    pub const VK_F12: i32 = 0x7B;

    /// Ctrl+F12 key-down, the dev tools shortcut
    pub fn is_dev_tools_shortcut(&self) -> bool {
        self.kind == KeyEventKind::RawKeyDown
            && self.windows_key_code == Self::VK_F12
            && self.modifiers & modifiers::CONTROL_DOWN != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
}

/// Message crossing the boundary between host and script execution context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessMessage {
    pub name: String,
    pub args: Vec<Value>,
}

impl ProcessMessage {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Engine-wide settings passed once at initialization
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub user_agent: Option<String>,
    pub root_cache_path: PathBuf,
    pub persist_session_cookies: bool,
    pub windowless_rendering: bool,
}

/// Settings for an isolated, persistent storage context
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSettings {
    pub cache_path: PathBuf,
    pub persist_session_cookies: bool,
}

/// Session creation request
#[derive(Debug, Clone, PartialEq)]
pub struct CreateParams {
    pub ticket: CreationTicket,
    pub url: String,
    pub frame_rate: u32,
    pub context: ContextHandle,
}
