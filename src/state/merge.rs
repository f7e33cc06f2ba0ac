//! The single write path into [`BoardState`].
//!
//! DESIGN
//! ======
//! Local optimistic edits and inbound server events are both expressed as a
//! [`Mutation`] and applied by [`apply`]. Sticker patches are field-scoped
//! last-writer-wins with no timestamp comparison: whatever arrives last
//! sets the fields it carries and leaves the rest alone. A removal always
//! wins; a later patch for a removed sticker is a no-op. Every size written
//! goes through the minimum-size clamp.

#[cfg(test)]
#[path = "merge_test.rs"]
mod merge_test;

use canvas::geometry::{Size, clamp_size};
use wire::{BoardPayload, BoardSnapshot, Event, StickerFields, StickerPayload};

use crate::net::types::{Sticker, StickerId};
use crate::state::board::{BoardState, ConnectionStatus};
use crate::util::color::StickerColor;

/// One change to board state.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    /// Insert or replace a whole sticker.
    Upsert(Sticker),
    /// Set the fields present in `fields`.
    Patch { id: StickerId, fields: StickerFields, updated_at: Option<String> },
    Remove(StickerId),
    /// A create was acknowledged: move the provisional sticker to its server
    /// id, keeping local content and taking the server's audit fields.
    Acknowledged { provisional: StickerId, server: StickerPayload },
    /// Metadata from `board_updated`; only fields present are applied.
    Board(BoardPayload),
    BoardDeleted(i64),
    Participants(u32),
    Status(ConnectionStatus),
    /// Replace board metadata and server stickers from a REST snapshot.
    /// Provisional stickers still awaiting acknowledgment are kept.
    Snapshot(BoardSnapshot),
}

impl Mutation {
    /// The state change an inbound event implies, if any.
    #[must_use]
    pub fn from_event(event: &Event) -> Option<Self> {
        let mutation = match event {
            Event::Connected(p) => Self::Participants(p.connection_count),
            Event::UserJoined(p) | Event::UserLeft(p) => Self::Participants(p.connection_count),
            Event::StickerCreated(p) => Self::Upsert(Sticker::from_payload(p.clone())),
            Event::StickerUpdated(p) => Self::Patch {
                id: StickerId::Server(p.sticker_id),
                fields: p.fields.clone(),
                updated_at: p.updated_at.clone(),
            },
            Event::StickerDeleted(p) => Self::Remove(StickerId::Server(p.sticker_id)),
            Event::BoardUpdated(p) => Self::Board(p.clone()),
            Event::BoardDeleted(p) => Self::BoardDeleted(p.board_id),
            Event::Pong => return None,
        };
        Some(mutation)
    }
}

/// Apply `mutation` to `state`. Returns whether anything changed; when it
/// did, `scene_rev` is bumped.
pub fn apply(state: &mut BoardState, mutation: Mutation) -> bool {
    let changed = match mutation {
        Mutation::Upsert(mut sticker) => {
            sticker.size = clamp_size(sticker.size);
            state.stickers.insert(sticker.id, sticker);
            true
        }
        Mutation::Patch { id, fields, updated_at } => match state.stickers.get_mut(&id) {
            Some(sticker) => {
                apply_fields(sticker, &fields);
                if updated_at.is_some() {
                    sticker.updated_at = updated_at;
                }
                true
            }
            None => false,
        },
        Mutation::Remove(id) => state.stickers.remove(&id).is_some(),
        Mutation::Acknowledged { provisional, server } => acknowledge(state, provisional, server),
        Mutation::Board(board) => merge_board(state, board),
        Mutation::BoardDeleted(board_id) => {
            if state.board_id.is_some_and(|current| current != board_id) {
                false
            } else {
                state.stickers.clear();
                state.board_deleted = true;
                true
            }
        }
        Mutation::Participants(count) => replace(&mut state.participant_count, count),
        Mutation::Status(status) => replace(&mut state.connection_status, status),
        Mutation::Snapshot(snapshot) => {
            load_snapshot(state, snapshot);
            true
        }
    };
    if changed {
        state.bump_scene_rev();
    }
    changed
}

/// Overlay the present fields onto `sticker`.
pub fn apply_fields(sticker: &mut Sticker, fields: &StickerFields) {
    if let Some(x) = fields.x {
        sticker.position.x = x;
    }
    if let Some(y) = fields.y {
        sticker.position.y = y;
    }
    if fields.width.is_some() || fields.height.is_some() {
        sticker.size = clamp_size(Size::new(
            fields.width.unwrap_or(sticker.size.width),
            fields.height.unwrap_or(sticker.size.height),
        ));
    }
    if let Some(color) = &fields.color {
        sticker.color = StickerColor::from_hex(color);
    }
    if let Some(text) = &fields.text {
        sticker.text.clone_from(text);
    }
    if let Some(layer_level) = fields.layer_level {
        sticker.layer_level = layer_level;
    }
}

fn acknowledge(state: &mut BoardState, provisional: StickerId, server: StickerPayload) -> bool {
    let Some(mut sticker) = state.stickers.remove(&provisional) else {
        return false;
    };
    sticker.id = StickerId::Server(server.sticker_id);
    sticker.board_id = Some(server.board_id);
    sticker.created_by = server.created_by;
    sticker.created_at = server.created_at;
    sticker.updated_at = server.updated_at;
    state.stickers.insert(sticker.id, sticker);
    true
}

fn merge_board(state: &mut BoardState, update: BoardPayload) -> bool {
    if state.board_id.is_some_and(|current| current != update.board_id) {
        return false;
    }
    state.board_id = Some(update.board_id);
    if state.board.is_none() {
        state.board = Some(update);
        return true;
    }
    let Some(board) = state.board.as_mut() else {
        return false;
    };
    overlay(&mut board.title, update.title);
    overlay(&mut board.description, update.description);
    overlay(&mut board.owner_id, update.owner_id);
    overlay(&mut board.owner_name, update.owner_name);
    overlay(&mut board.background_color, update.background_color);
    overlay(&mut board.created_at, update.created_at);
    overlay(&mut board.updated_at, update.updated_at);
    true
}

fn load_snapshot(state: &mut BoardState, snapshot: BoardSnapshot) {
    state.board_id = Some(snapshot.board.board_id);
    state.board = Some(snapshot.board);
    state.permission = snapshot.permission;
    state.stickers.retain(|id, _| id.is_provisional());
    for payload in snapshot.stickers {
        let sticker = Sticker::from_payload(payload);
        state.stickers.insert(sticker.id, sticker);
    }
    state.needs_resync = false;
    state.board_deleted = false;
}

fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}
