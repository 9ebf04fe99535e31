//! Gesture & IME state machine
//!
//! Interprets raw pointer and IME input per session and decides which engine
//! command it becomes. Pure state - no engine access, time is passed in.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::{Duration, Instant};

use crate::config::MultiClickConfig;
use crate::engine::{modifiers, MouseButton, MouseEvent, Point, Rect};

/// Thresholds deciding whether a press repeats the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiClickPolicy {
    pub interval: Duration,
    pub tolerance: u32,
}

impl From<&MultiClickConfig> for MultiClickPolicy {
    fn from(config: &MultiClickConfig) -> Self {
        Self {
            interval: config.interval(),
            tolerance: config.tolerance_px.max(0) as u32,
        }
    }
}

impl Default for MultiClickPolicy {
    fn default() -> Self {
        Self::from(&MultiClickConfig::default())
    }
}

/// Counts consecutive presses: 1, 2, 3, then back to 1
#[derive(Debug, Clone, Default)]
pub struct ClickTracker {
    last: Option<(Point, Instant)>,
    count: u8,
}

impl ClickTracker {
    pub const MAX_CLICKS: u8 = 3;

    /// Register a press and return its click count
    pub fn press(&mut self, at: Point, now: Instant, policy: &MultiClickPolicy) -> u8 {
        let repeat = self.last.is_some_and(|(last_at, last_time)| {
            now.saturating_duration_since(last_time) < policy.interval
                && at.x.abs_diff(last_at.x) <= policy.tolerance
                && at.y.abs_diff(last_at.y) <= policy.tolerance
        });

        self.count = if repeat { self.count + 1 } else { 1 };
        if self.count > Self::MAX_CLICKS {
            self.count = 1;
        }
        self.last = Some((at, now));
        self.count()
    }

    /// Count of the current press sequence, never below 1
    pub fn count(&self) -> u8 {
        self.count.max(1)
    }
}

/// Which input a composition-range notification belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompositionPhase {
    Composing,
    Committed,
}

#[derive(Debug, Clone, Default)]
pub struct ImeState {
    composing: bool,
    committed: bool,
    anchor: Option<Point>,
}

impl ImeState {
    /// Start or update a composition. Returns the caret selection (UTF-16 units).
    pub fn set_composition(&mut self, text: &str) -> Range<u32> {
        self.composing = !text.is_empty();
        self.committed = false;
        let caret = text.encode_utf16().count() as u32;
        caret..caret
    }

    pub fn commit(&mut self) {
        self.composing = false;
        self.committed = true;
    }

    /// Consumes the commit flag. `None` when there is nothing to anchor to.
    pub fn composition_range_changed(&mut self, bounds: &[Rect]) -> Option<(Point, CompositionPhase)> {
        let phase = if std::mem::take(&mut self.committed) {
            CompositionPhase::Committed
        } else {
            CompositionPhase::Composing
        };
        let anchor = bounds.first()?.bottom_left();
        self.anchor = Some(anchor);
        Some((anchor, phase))
    }

    pub fn set_anchor(&mut self, anchor: Point) {
        self.anchor = Some(anchor);
    }

    pub fn anchor(&self) -> Option<Point> {
        self.anchor
    }

    pub fn is_composing(&self) -> bool {
        self.composing
    }

    pub fn is_committing(&self) -> bool {
        self.committed
    }
}

/// Engine command a pointer input turns into
#[derive(Debug, Clone, PartialEq)]
pub enum PointerCommand {
    Click {
        event: MouseEvent,
        button: MouseButton,
        mouse_up: bool,
        click_count: u8,
    },
    /// Synthesize a `contextmenu` in content; never the engine's native menu
    ContextMenu { at: Point },
    Move { event: MouseEvent },
    DragOver { event: MouseEvent },
    Drop { event: MouseEvent },
    Nothing,
}

/// Per-session pointer and IME state
#[derive(Debug, Clone, Default)]
pub struct GestureState {
    clicks: ClickTracker,
    dragging: bool,
    ime: ImeState,
}

impl GestureState {
    pub fn pointer_down(
        &mut self,
        at: Point,
        button: MouseButton,
        now: Instant,
        policy: &MultiClickPolicy,
    ) -> PointerCommand {
        if button == MouseButton::Right {
            return PointerCommand::ContextMenu { at };
        }
        let click_count = self.clicks.press(at, now, policy);
        PointerCommand::Click {
            event: MouseEvent::at(at, button.modifier()),
            button,
            mouse_up: false,
            click_count,
        }
    }

    pub fn pointer_up(&mut self, at: Point, button: MouseButton) -> PointerCommand {
        if self.dragging {
            self.dragging = false;
            return PointerCommand::Drop {
                event: MouseEvent::at(at, modifiers::LEFT_MOUSE_BUTTON),
            };
        }
        if button == MouseButton::Right {
            return PointerCommand::Nothing;
        }
        PointerCommand::Click {
            event: MouseEvent::at(at, button.modifier()),
            button,
            mouse_up: true,
            click_count: self.clicks.count(),
        }
    }

    /// `button_held` marks a host-side drag gesture (left button down)
    pub fn pointer_move(&mut self, at: Point, button_held: bool) -> PointerCommand {
        if self.dragging {
            return PointerCommand::DragOver {
                event: MouseEvent::at(at, modifiers::LEFT_MOUSE_BUTTON),
            };
        }
        let modifiers = if button_held {
            modifiers::LEFT_MOUSE_BUTTON
        } else {
            0
        };
        PointerCommand::Move {
            event: MouseEvent::at(at, modifiers),
        }
    }

    /// The engine started dragging content. False if a drag was already running.
    pub fn begin_drag(&mut self) -> bool {
        !std::mem::replace(&mut self.dragging, true)
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn click_count(&self) -> u8 {
        self.clicks.count()
    }

    pub fn ime(&self) -> &ImeState {
        &self.ime
    }

    pub fn ime_mut(&mut self) -> &mut ImeState {
        &mut self.ime
    }
}
