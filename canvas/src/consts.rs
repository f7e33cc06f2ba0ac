//! Shared numeric constants for the canvas crate.

// ── Sizing ──────────────────────────────────────────────────────

/// Narrowest a sticker may be at rest, in board pixels.
pub const MIN_WIDTH: f64 = 150.0;

/// Shortest a sticker may be at rest, in board pixels.
pub const MIN_HEIGHT: f64 = 100.0;

/// Width of a freshly added sticker.
pub const DEFAULT_WIDTH: f64 = 150.0;

/// Height of a freshly added sticker.
pub const DEFAULT_HEIGHT: f64 = 100.0;

// ── Cursors ─────────────────────────────────────────────────────

/// CSS cursor shown while a sticker is being dragged.
pub const CURSOR_DRAG: &str = "grabbing";

/// CSS cursor shown while a sticker is being resized.
pub const CURSOR_RESIZE: &str = "nwse-resize";

/// Empty cursor value; the host falls back to its stylesheet default.
pub const CURSOR_DEFAULT: &str = "";
