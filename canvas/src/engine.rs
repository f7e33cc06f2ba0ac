//! Per-sticker drag/resize engine.
//!
//! SYSTEM CONTEXT
//! ==============
//! The host owns the DOM. For every mounted sticker it calls [`InteractionEngine::register`]
//! with the commit callbacks the sticker supports, forwards pointer events on
//! the drag and resize handles, and forwards animation-frame callbacks. Each
//! call returns [`Action`]s the host executes in order. Committed geometry is
//! delivered through the sticker's callbacks, exactly once per gesture.
//!
//! DESIGN
//! ======
//! Live geometry flows through a per-sticker [`FrameScheduler`], so at most
//! one `Moved`/`Resized` action is produced per rendered frame. The final
//! geometry on pointer-up is computed from the release point directly and
//! applied synchronously, so what the user sees at rest is what was
//! committed. Capabilities are expressed by which callbacks exist: a sticker
//! without a drag callback cannot be dragged, one without a text callback
//! cannot enter edit mode.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use crate::capture::{CaptureHost, PointerCapture, PointerId};
use crate::consts::CURSOR_DEFAULT;
use crate::geometry::{Point, Size};
use crate::input::{Geometry, GestureKind, InputState};
use crate::scheduler::{FrameScheduler, FrameToken};

pub type DragCommit = Box<dyn FnMut(Point)>;
pub type ResizeCommit = Box<dyn FnMut(Size)>;
pub type TextCommit = Box<dyn FnMut(String)>;
pub type ColorCommit = Box<dyn FnMut(String)>;

/// Commit callbacks for one sticker. An absent callback disables that interaction.
#[derive(Default)]
pub struct StickerHandlers {
    pub on_drag_commit: Option<DragCommit>,
    pub on_resize_commit: Option<ResizeCommit>,
    pub on_text_commit: Option<TextCommit>,
    /// Receives the chosen color as wire hex.
    pub on_color_commit: Option<ColorCommit>,
}

impl StickerHandlers {
    #[must_use]
    pub fn on_drag(mut self, commit: impl FnMut(Point) + 'static) -> Self {
        self.on_drag_commit = Some(Box::new(commit));
        self
    }

    #[must_use]
    pub fn on_resize(mut self, commit: impl FnMut(Size) + 'static) -> Self {
        self.on_resize_commit = Some(Box::new(commit));
        self
    }

    #[must_use]
    pub fn on_text(mut self, commit: impl FnMut(String) + 'static) -> Self {
        self.on_text_commit = Some(Box::new(commit));
        self
    }

    #[must_use]
    pub fn on_color(mut self, commit: impl FnMut(String) + 'static) -> Self {
        self.on_color_commit = Some(Box::new(commit));
        self
    }

    fn supports(&self, kind: GestureKind) -> bool {
        match kind {
            GestureKind::Drag => self.on_drag_commit.is_some(),
            GestureKind::Resize => self.on_resize_commit.is_some(),
        }
    }
}

impl fmt::Debug for StickerHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StickerHandlers")
            .field("drag", &self.on_drag_commit.is_some())
            .field("resize", &self.on_resize_commit.is_some())
            .field("text", &self.on_text_commit.is_some())
            .field("color", &self.on_color_commit.is_some())
            .finish()
    }
}

/// Actions returned from engine calls for the host to process.
#[derive(Debug, Clone, PartialEq)]
pub enum Action<Id> {
    /// Schedule one animation frame and pass `token` back to [`InteractionEngine::on_frame`].
    RequestFrame { id: Id, token: FrameToken },
    /// Cancel a previously requested frame.
    CancelFrame { id: Id, token: FrameToken },
    /// Render the sticker at a new position.
    Moved { id: Id, position: Point },
    /// Render the sticker at a new size.
    Resized { id: Id, size: Size },
    SetCursor(&'static str),
}

#[derive(Debug, Default)]
struct StickerSlot {
    handlers: StickerHandlers,
    input: InputState,
    frames: FrameScheduler<Point>,
    editing: bool,
    color_picker_open: bool,
}

impl StickerSlot {
    fn can_start(&self, kind: GestureKind) -> bool {
        self.handlers.supports(kind) && self.input.is_idle() && !self.editing && !self.color_picker_open
    }
}

/// Gesture engine for every sticker mounted on a board.
pub struct InteractionEngine<Id> {
    host: Rc<dyn CaptureHost>,
    stickers: HashMap<Id, StickerSlot>,
}

impl<Id> fmt::Debug for InteractionEngine<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionEngine").field("stickers", &self.stickers.len()).finish_non_exhaustive()
    }
}

impl<Id: Copy + Eq + Hash> InteractionEngine<Id> {
    #[must_use]
    pub fn new(host: Rc<dyn CaptureHost>) -> Self {
        Self { host, stickers: HashMap::new() }
    }

    // --- Lifecycle ---

    /// Mount a sticker. Re-registering an id tears the previous instance down first.
    pub fn register(&mut self, id: Id, handlers: StickerHandlers) -> Vec<Action<Id>> {
        let actions = self.unregister(id);
        self.stickers.insert(id, StickerSlot { handlers, ..StickerSlot::default() });
        actions
    }

    /// Unmount a sticker. An active gesture is discarded without commit and
    /// its pointer capture released.
    pub fn unregister(&mut self, id: Id) -> Vec<Action<Id>> {
        let Some(mut slot) = self.stickers.remove(&id) else {
            return Vec::new();
        };
        let mut actions = Vec::new();
        if let Some(token) = slot.frames.cancel() {
            actions.push(Action::CancelFrame { id, token });
        }
        if !slot.input.is_idle() {
            actions.push(Action::SetCursor(CURSOR_DEFAULT));
        }
        actions
    }

    // --- Modes ---

    /// Enter or leave text-edit mode. Entering requires a text callback, no
    /// active gesture and a closed color picker. Returns whether the mode was
    /// applied.
    pub fn set_editing(&mut self, id: Id, editing: bool) -> bool {
        let Some(slot) = self.stickers.get_mut(&id) else {
            return false;
        };
        if editing && (slot.handlers.on_text_commit.is_none() || !slot.input.is_idle() || slot.color_picker_open) {
            return false;
        }
        slot.editing = editing;
        true
    }

    /// Open or close the color picker. Opening requires a color callback, no
    /// active gesture and no text edit in progress. Returns whether the mode
    /// was applied.
    pub fn set_color_picker_open(&mut self, id: Id, open: bool) -> bool {
        let Some(slot) = self.stickers.get_mut(&id) else {
            return false;
        };
        if open && (slot.handlers.on_color_commit.is_none() || !slot.input.is_idle() || slot.editing) {
            return false;
        }
        slot.color_picker_open = open;
        true
    }

    /// Commit edited text and leave edit mode. No-op outside edit mode.
    pub fn commit_text(&mut self, id: Id, text: String) -> bool {
        let Some(slot) = self.stickers.get_mut(&id).filter(|slot| slot.editing) else {
            return false;
        };
        let Some(commit) = slot.handlers.on_text_commit.as_mut() else {
            return false;
        };
        commit(text);
        slot.editing = false;
        true
    }

    /// Commit a picked color and close the picker. No-op while the picker is closed.
    pub fn commit_color(&mut self, id: Id, color: String) -> bool {
        let Some(slot) = self.stickers.get_mut(&id).filter(|slot| slot.color_picker_open) else {
            return false;
        };
        let Some(commit) = slot.handlers.on_color_commit.as_mut() else {
            return false;
        };
        commit(color);
        slot.color_picker_open = false;
        true
    }

    // --- Gestures ---

    /// Pointer-down on the drag handle. No-op while editing, picking a color,
    /// in another gesture, or without a drag callback.
    pub fn begin_drag(&mut self, id: Id, pointer: PointerId, start_pointer: Point, start_position: Point) -> Vec<Action<Id>> {
        let host = Rc::clone(&self.host);
        let Some(slot) = self.stickers.get_mut(&id) else {
            return Vec::new();
        };
        if !slot.can_start(GestureKind::Drag) {
            return Vec::new();
        }
        slot.input = InputState::Dragging {
            start_pointer,
            start_position,
            last_pointer: start_pointer,
            capture: PointerCapture::acquire(host, pointer),
        };
        vec![Action::SetCursor(slot.input.cursor())]
    }

    /// Pointer-down on the resize handle. Same preconditions as [`Self::begin_drag`].
    pub fn begin_resize(&mut self, id: Id, pointer: PointerId, start_pointer: Point, start_size: Size) -> Vec<Action<Id>> {
        let host = Rc::clone(&self.host);
        let Some(slot) = self.stickers.get_mut(&id) else {
            return Vec::new();
        };
        if !slot.can_start(GestureKind::Resize) {
            return Vec::new();
        }
        slot.input = InputState::Resizing {
            start_pointer,
            start_size,
            last_pointer: start_pointer,
            capture: PointerCapture::acquire(host, pointer),
        };
        vec![Action::SetCursor(slot.input.cursor())]
    }

    /// Pointer-move during a gesture. Requests a frame only if none is outstanding.
    pub fn pointer_move(&mut self, id: Id, pointer: Point) -> Vec<Action<Id>> {
        let Some(slot) = self.stickers.get_mut(&id) else {
            return Vec::new();
        };
        if slot.input.is_idle() {
            return Vec::new();
        }
        slot.input.track(pointer);
        slot.frames
            .propose(pointer)
            .map(|token| Action::RequestFrame { id, token })
            .into_iter()
            .collect()
    }

    /// Animation frame fired. Stale or cancelled tokens produce nothing.
    pub fn on_frame(&mut self, id: Id, token: FrameToken) -> Vec<Action<Id>> {
        let Some(slot) = self.stickers.get_mut(&id) else {
            return Vec::new();
        };
        let Some(pointer) = slot.frames.on_frame(token) else {
            return Vec::new();
        };
        slot.input.geometry_at(pointer).map(|geometry| geometry_action(id, geometry)).into_iter().collect()
    }

    /// Pointer-up ending a drag.
    pub fn end_drag(&mut self, id: Id, final_pointer: Point) -> Vec<Action<Id>> {
        self.finish(id, Some(GestureKind::Drag), Some(final_pointer))
    }

    /// Pointer-up ending a resize.
    pub fn end_resize(&mut self, id: Id, final_pointer: Point) -> Vec<Action<Id>> {
        self.finish(id, Some(GestureKind::Resize), Some(final_pointer))
    }

    /// Capture was taken away by the platform. Commits using the last known sample.
    pub fn capture_lost(&mut self, id: Id) -> Vec<Action<Id>> {
        self.finish(id, None, None)
    }

    /// Force-end whichever gesture is active, committing the last known sample.
    pub fn cancel_gesture(&mut self, id: Id) -> Vec<Action<Id>> {
        self.finish(id, None, None)
    }

    // --- Queries ---

    #[must_use]
    pub fn is_registered(&self, id: Id) -> bool {
        self.stickers.contains_key(&id)
    }

    /// Active gesture on `id`, if any.
    #[must_use]
    pub fn gesture(&self, id: Id) -> Option<GestureKind> {
        self.stickers.get(&id).and_then(|slot| slot.input.gesture())
    }

    #[must_use]
    pub fn is_editing(&self, id: Id) -> bool {
        self.stickers.get(&id).is_some_and(|slot| slot.editing)
    }

    #[must_use]
    pub fn is_color_picker_open(&self, id: Id) -> bool {
        self.stickers.get(&id).is_some_and(|slot| slot.color_picker_open)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stickers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stickers.is_empty()
    }

    // --- Internal ---

    fn finish(&mut self, id: Id, expected: Option<GestureKind>, final_pointer: Option<Point>) -> Vec<Action<Id>> {
        let Some(slot) = self.stickers.get_mut(&id) else {
            return Vec::new();
        };
        let Some(kind) = slot.input.gesture() else {
            return Vec::new();
        };
        if expected.is_some_and(|expected| expected != kind) {
            return Vec::new();
        }
        let Some(pointer) = final_pointer.or_else(|| slot.input.last_pointer()) else {
            return Vec::new();
        };

        let gesture = std::mem::take(&mut slot.input);
        let mut actions = Vec::new();
        if let Some(token) = slot.frames.cancel() {
            actions.push(Action::CancelFrame { id, token });
        }
        match gesture.geometry_at(pointer) {
            Some(Geometry::Position(position)) => {
                actions.push(Action::Moved { id, position });
                if let Some(commit) = slot.handlers.on_drag_commit.as_mut() {
                    commit(position);
                }
            }
            Some(Geometry::Size(size)) => {
                actions.push(Action::Resized { id, size });
                if let Some(commit) = slot.handlers.on_resize_commit.as_mut() {
                    commit(size);
                }
            }
            None => {}
        }
        // Release capture only after the commit has been delivered.
        drop(gesture);
        actions.push(Action::SetCursor(CURSOR_DEFAULT));
        actions
    }
}

fn geometry_action<Id>(id: Id, geometry: Geometry) -> Action<Id> {
    match geometry {
        Geometry::Position(position) => Action::Moved { id, position },
        Geometry::Size(size) => Action::Resized { id, size },
    }
}
