//! Live sync core for a collaborative sticker board.
//!
//! SYSTEM CONTEXT
//! ==============
//! A board lives on an authoritative server. This crate keeps a local
//! projection of one board in step with it: REST for snapshots and
//! mutations, a WebSocket channel for change notifications from other
//! participants. The drag/resize gesture engine lives in the `canvas`
//! crate; the envelope codec lives in `wire`.
//!
//! DESIGN
//! ======
//! Protocol logic is sans-IO. [`net::connection::ConnectionManager`] and
//! [`sync::BoardSyncClient`] consume events and return commands; the tokio
//! driver in [`net::live`] is the only place that touches sockets and
//! timers. Local edits and inbound events funnel through one merge function,
//! [`state::merge::apply`].
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | Environment-driven client configuration and reconnect policy |
//! | [`net`] | Connection manager, event router, REST client, live driver |
//! | [`state`] | Board projection and the merge function |
//! | [`sync`] | Composition root wiring transport, router and state |
//! | [`util`] | Sticker color palette |

pub mod config;
pub mod net;
pub mod state;
pub mod sync;
pub mod util;
