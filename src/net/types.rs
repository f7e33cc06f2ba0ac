//! Client-side sticker model.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use std::fmt;

use canvas::geometry::{Point, Size, clamp_size};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wire::{StickerDraft, StickerPayload};

use crate::util::color::StickerColor;

/// Sticker identity. Server ids are assigned on create; provisional ids
/// stand in until the create is acknowledged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StickerId {
    Server(i64),
    Provisional(Uuid),
}

impl StickerId {
    /// Fresh provisional id for an optimistic create.
    #[must_use]
    pub fn provisional() -> Self {
        Self::Provisional(Uuid::new_v4())
    }

    #[must_use]
    pub fn server_id(self) -> Option<i64> {
        match self {
            Self::Server(id) => Some(id),
            Self::Provisional(_) => None,
        }
    }

    #[must_use]
    pub fn is_provisional(self) -> bool {
        matches!(self, Self::Provisional(_))
    }
}

impl fmt::Display for StickerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{id}"),
            Self::Provisional(uuid) => write!(f, "tmp-{uuid}"),
        }
    }
}

/// A sticker as held in local board state.
#[derive(Clone, Debug, PartialEq)]
pub struct Sticker {
    pub id: StickerId,
    pub board_id: Option<i64>,
    /// Top-left corner in board-local pixels.
    pub position: Point,
    /// Always at or above the minimum size.
    pub size: Size,
    pub color: StickerColor,
    pub text: String,
    pub layer_level: i64,
    pub created_by: Option<i64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Sticker {
    /// Locally created sticker awaiting server acknowledgment.
    #[must_use]
    pub fn provisional(position: Point, size: Size, color: StickerColor) -> Self {
        Self {
            id: StickerId::provisional(),
            board_id: None,
            position,
            size: clamp_size(size),
            color,
            text: String::new(),
            layer_level: 0,
            created_by: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Server sticker, with its size clamped to the minimum.
    #[must_use]
    pub fn from_payload(payload: StickerPayload) -> Self {
        Self {
            id: StickerId::Server(payload.sticker_id),
            board_id: Some(payload.board_id),
            position: Point::new(payload.x, payload.y),
            size: clamp_size(Size::new(payload.width, payload.height)),
            color: StickerColor::from_hex(&payload.color),
            text: payload.text,
            layer_level: payload.layer_level,
            created_by: payload.created_by,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
        }
    }

    /// Body of the create request for this sticker.
    #[must_use]
    pub fn draft(&self) -> StickerDraft {
        StickerDraft {
            x: self.position.x,
            y: self.position.y,
            width: self.size.width,
            height: self.size.height,
            color: self.color.to_hex().to_owned(),
            text: self.text.clone(),
            layer_level: self.layer_level,
        }
    }
}
