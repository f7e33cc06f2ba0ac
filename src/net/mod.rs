//! Networking: live channel lifecycle, inbound routing, REST and the tokio driver.
//!
//! DESIGN
//! ======
//! `connection` and `router` are pure state machines with no I/O so they can
//! be tested exhaustively; `api` and `live` are the thin async shells that
//! execute what those machines decide.

pub mod api;
pub mod connection;
pub mod live;
pub mod router;
pub mod types;
