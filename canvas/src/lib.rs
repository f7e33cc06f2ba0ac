//! Direct-manipulation engine for sticker boards.
//!
//! This crate turns raw pointer input on a sticker's drag or resize handle
//! into live geometry updates at display-frame granularity, followed by
//! exactly one committed geometry per gesture. It holds no browser types:
//! the host wires DOM pointer events in, executes the returned
//! [`engine::Action`]s (request a frame, move a node, set the cursor), and
//! receives commits through per-sticker callbacks.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Per-sticker gesture engine, [`engine::InteractionEngine`] |
//! | [`input`] | Gesture state machine carried between pointer-down and pointer-up |
//! | [`scheduler`] | Coalesces pointer samples into at most one update per frame |
//! | [`capture`] | Scoped pointer capture released on drop |
//! | [`geometry`] | Points, sizes and the minimum-size clamp |
//! | [`consts`] | Sticker minimum/default sizes and cursor names |

pub mod capture;
pub mod consts;
pub mod engine;
pub mod geometry;
pub mod input;
pub mod scheduler;
