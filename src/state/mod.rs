//! Local board projection.
//!
//! DESIGN
//! ======
//! `board` holds the data; `merge` is the only code that writes sticker
//! data into it, for both local edits and inbound events.

pub mod board;
pub mod merge;
