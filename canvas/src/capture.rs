//! Scoped pointer capture.
//!
//! While a gesture is active the sticker keeps receiving pointer events even
//! when the pointer leaves its bounds. [`PointerCapture`] acquires capture on
//! construction and releases it when dropped, so every exit path of a
//! gesture (normal end, forced end, teardown) releases exactly once.

#[cfg(test)]
#[path = "capture_test.rs"]
mod capture_test;

use std::fmt;
use std::rc::Rc;

/// Host-assigned pointer identifier (the DOM `pointerId`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointerId(pub i32);

/// The host surface that can route a pointer's events to a sticker.
pub trait CaptureHost {
    fn capture(&self, pointer: PointerId);
    fn release(&self, pointer: PointerId);
}

/// Host without pointer capture, e.g. a headless driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCapture;

impl CaptureHost for NoCapture {
    fn capture(&self, _pointer: PointerId) {}

    fn release(&self, _pointer: PointerId) {}
}

/// Active capture of one pointer. Released on drop.
pub struct PointerCapture {
    host: Rc<dyn CaptureHost>,
    pointer: PointerId,
}

impl PointerCapture {
    /// Capture `pointer` on `host`.
    #[must_use]
    pub fn acquire(host: Rc<dyn CaptureHost>, pointer: PointerId) -> Self {
        host.capture(pointer);
        Self { host, pointer }
    }

    #[must_use]
    pub fn pointer(&self) -> PointerId {
        self.pointer
    }
}

impl Drop for PointerCapture {
    fn drop(&mut self) {
        self.host.release(self.pointer);
    }
}

impl fmt::Debug for PointerCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointerCapture").field("pointer", &self.pointer).finish_non_exhaustive()
    }
}
