//! Shared helpers.

pub mod color;
