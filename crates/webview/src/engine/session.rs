//! Engine Session Handle
//!
//! One live engine session. The registry owns the handle exclusively from the
//! moment the engine confirms creation until it confirms teardown. Every
//! method is only ever called on the affine thread.

use std::ops::Range;

use super::protocol::{
    FrameId, KeyEvent, MouseButton, MouseEvent, Point, ProcessMessage, SessionId, ViewGeometry,
};

pub trait SessionHandle: Send {
    fn id(&self) -> SessionId;

    /// Current top-level frame, if the session has one
    fn main_frame(&self) -> Option<FrameId>;

    // Navigation
    fn load_url(&mut self, frame: FrameId, url: &str);
    fn can_go_back(&self) -> bool;
    fn go_back(&mut self);
    fn can_go_forward(&self) -> bool;
    fn go_forward(&mut self);
    fn reload(&mut self);

    /// Submit script source to a frame's content scope. No result comes back.
    fn execute_script(&mut self, frame: FrameId, code: &str);

    /// Deliver a message to the script execution context of one frame
    fn send_process_message(&mut self, frame: FrameId, message: ProcessMessage);

    /// The view geometry changed; the engine re-queries layout
    fn was_resized(&mut self, geometry: ViewGeometry);

    // Input
    fn send_mouse_click(&mut self, event: MouseEvent, button: MouseButton, mouse_up: bool, click_count: u8);
    fn send_mouse_move(&mut self, event: MouseEvent, mouse_leave: bool);
    fn send_mouse_wheel(&mut self, event: MouseEvent, delta_x: i32, delta_y: i32);
    fn send_key_event(&mut self, event: &KeyEvent);

    // Drag and drop, with this session as drop target
    fn drag_target_drag_enter(&mut self, event: MouseEvent);
    fn drag_target_drag_over(&mut self, event: MouseEvent);
    fn drag_target_drop(&mut self, event: MouseEvent);
    fn drag_source_ended(&mut self, at: Point);

    fn set_focus(&mut self, focused: bool);

    // IME. `selection` is the caret range inside the composition text.
    fn ime_set_composition(&mut self, text: &str, selection: Range<u32>);
    fn ime_commit_text(&mut self, text: &str);
    fn ime_finish_composing(&mut self);

    fn show_dev_tools(&mut self);
    fn set_audio_muted(&mut self, muted: bool);

    /// Request teardown. The engine confirms later with `EngineEvent::SessionClosed`.
    fn close(&mut self, force: bool);
}
