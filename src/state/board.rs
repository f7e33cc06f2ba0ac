#[cfg(test)]
#[path = "board_test.rs"]
mod board_test;

use std::collections::HashMap;

use wire::BoardPayload;

use crate::net::connection::{CloseReason, ConnectionState};
use crate::net::types::{Sticker, StickerId};

/// Local projection of one board: metadata, stickers, presence and sync flags.
#[derive(Clone, Debug, Default)]
pub struct BoardState {
    pub board_id: Option<i64>,
    /// Title, owner and styling, once a snapshot or `board_updated` arrived.
    pub board: Option<BoardPayload>,
    /// Caller's access level from the last snapshot.
    pub permission: Option<String>,
    pub connection_status: ConnectionStatus,
    pub participant_count: u32,
    pub stickers: HashMap<StickerId, Sticker>,
    /// Set when the server rejected a mutation; cleared by loading a snapshot.
    pub needs_resync: bool,
    pub board_deleted: bool,
    /// Bumped on every applied change.
    pub scene_rev: u64,
}

/// Live-channel status as shown to the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnect attempts exhausted.
    Failed,
}

impl From<ConnectionState> for ConnectionStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Idle => Self::Disconnected,
            ConnectionState::Connecting => Self::Connecting,
            ConnectionState::Open => Self::Connected,
            ConnectionState::Reconnecting => Self::Reconnecting,
            ConnectionState::Closed { reason } => match reason {
                CloseReason::RetriesExhausted { .. } => Self::Failed,
                _ => Self::Disconnected,
            },
        }
    }
}

impl BoardState {
    #[must_use]
    pub fn new(board_id: Option<i64>) -> Self {
        Self { board_id, ..Self::default() }
    }

    pub fn bump_scene_rev(&mut self) {
        self.scene_rev = self.scene_rev.wrapping_add(1);
    }

    #[must_use]
    pub fn sticker(&self, id: StickerId) -> Option<&Sticker> {
        self.stickers.get(&id)
    }

    /// Stickers in paint order: lowest layer first, ties broken by id.
    #[must_use]
    pub fn stickers_in_layer_order(&self) -> Vec<&Sticker> {
        let mut stickers = self.stickers.values().collect::<Vec<_>>();
        stickers.sort_by(|a, b| a.layer_level.cmp(&b.layer_level).then(a.id.cmp(&b.id)));
        stickers
    }

    /// Next layer level above every sticker on the board.
    #[must_use]
    pub fn top_layer(&self) -> i64 {
        self.stickers.values().map(|s| s.layer_level).max().map_or(0, |top| top.saturating_add(1))
    }
}
