//! Board-space points and sizes, plus the minimum-size clamp.
//!
//! Every path that writes a sticker size (live resize frames, resize
//! commits, inbound server updates, snapshot loads) goes through
//! [`clamp_size`], so a size below [`MIN_WIDTH`] x [`MIN_HEIGHT`] never
//! reaches rest.

#[cfg(test)]
#[path = "geometry_test.rs"]
mod geometry_test;

use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_HEIGHT, DEFAULT_WIDTH, MIN_HEIGHT, MIN_WIDTH};

/// A point (or offset) in board-local pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point { x: self.x + rhs.x, y: self.y + rhs.y }
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point { x: self.x - rhs.x, y: self.y - rhs.y }
    }
}

/// Width and height of a sticker in board-local pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl Default for Size {
    fn default() -> Self {
        Self { width: DEFAULT_WIDTH, height: DEFAULT_HEIGHT }
    }
}

/// Raise each dimension to its minimum. Non-finite dimensions become the minimum.
#[must_use]
pub fn clamp_size(size: Size) -> Size {
    Size {
        width: clamp_dimension(size.width, MIN_WIDTH),
        height: clamp_dimension(size.height, MIN_HEIGHT),
    }
}

/// Size reached by dragging the resize handle `delta` pixels from `start`.
#[must_use]
pub fn resize_from(start: Size, delta: Point) -> Size {
    clamp_size(Size { width: start.width + delta.x, height: start.height + delta.y })
}

fn clamp_dimension(value: f64, min: f64) -> f64 {
    if value.is_finite() { value.max(min) } else { min }
}
