//! Gesture state machine for one sticker.
//!
//! `InputState` is the active gesture tracked between pointer-down and
//! pointer-up. Each active variant carries the pointer and geometry captured
//! at gesture start, the last pointer sample seen, and the pointer-capture
//! guard, which is enough to compute live geometry for any later sample and
//! to force a terminal commit if the gesture is cut short.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use crate::capture::PointerCapture;
use crate::consts::{CURSOR_DEFAULT, CURSOR_DRAG, CURSOR_RESIZE};
use crate::geometry::{Point, Size, resize_from};

/// Which gesture a handle starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Drag,
    Resize,
}

/// Geometry produced by a gesture for a given pointer sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Geometry {
    Position(Point),
    Size(Size),
}

/// Internal state for the per-sticker input state machine.
#[derive(Debug, Default)]
pub enum InputState {
    /// No gesture in progress.
    #[default]
    Idle,
    /// The sticker body is being moved.
    Dragging {
        /// Pointer position at pointer-down.
        start_pointer: Point,
        /// Sticker position at pointer-down.
        start_position: Point,
        /// Most recent pointer sample; used for forced commits.
        last_pointer: Point,
        capture: PointerCapture,
    },
    /// The bottom-right handle is being dragged.
    Resizing {
        /// Pointer position at pointer-down.
        start_pointer: Point,
        /// Sticker size at pointer-down.
        start_size: Size,
        /// Most recent pointer sample; used for forced commits.
        last_pointer: Point,
        capture: PointerCapture,
    },
}

impl InputState {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Kind of the active gesture, if any.
    #[must_use]
    pub fn gesture(&self) -> Option<GestureKind> {
        match self {
            Self::Idle => None,
            Self::Dragging { .. } => Some(GestureKind::Drag),
            Self::Resizing { .. } => Some(GestureKind::Resize),
        }
    }

    /// Cursor the host should show for this state.
    #[must_use]
    pub fn cursor(&self) -> &'static str {
        match self {
            Self::Idle => CURSOR_DEFAULT,
            Self::Dragging { .. } => CURSOR_DRAG,
            Self::Resizing { .. } => CURSOR_RESIZE,
        }
    }

    /// Remember `pointer` as the latest sample of the active gesture.
    pub fn track(&mut self, pointer: Point) {
        match self {
            Self::Idle => {}
            Self::Dragging { last_pointer, .. } | Self::Resizing { last_pointer, .. } => *last_pointer = pointer,
        }
    }

    #[must_use]
    pub fn last_pointer(&self) -> Option<Point> {
        match self {
            Self::Idle => None,
            Self::Dragging { last_pointer, .. } | Self::Resizing { last_pointer, .. } => Some(*last_pointer),
        }
    }

    /// Geometry for `pointer` relative to the gesture's starting state.
    ///
    /// Drags offset the start position by the pointer delta; resizes grow the
    /// start size by the same delta and clamp to the minimum.
    #[must_use]
    pub fn geometry_at(&self, pointer: Point) -> Option<Geometry> {
        match self {
            Self::Idle => None,
            Self::Dragging { start_pointer, start_position, .. } => {
                Some(Geometry::Position(*start_position + (pointer - *start_pointer)))
            }
            Self::Resizing { start_pointer, start_size, .. } => {
                Some(Geometry::Size(resize_from(*start_size, pointer - *start_pointer)))
            }
        }
    }
}
