//! Payload DTOs carried inside envelopes and across the REST boundary.
//!
//! DESIGN
//! ======
//! Field names mirror the server's camelCase JSON so serde round-trips stay
//! lossless. Ids are integers on the wire, but some producers emit them as
//! integral floats, so id fields accept either.

#[cfg(test)]
#[path = "payload_test.rs"]
mod payload_test;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// A persisted sticker as the server reports it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerPayload {
    /// Server-assigned sticker identifier.
    #[serde(deserialize_with = "deserialize_i64_from_number")]
    pub sticker_id: i64,
    /// Board the sticker belongs to.
    #[serde(deserialize_with = "deserialize_i64_from_number")]
    pub board_id: i64,
    /// Left edge in board-local pixels.
    pub x: f64,
    /// Top edge in board-local pixels.
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Wire color as `#RRGGBB`.
    pub color: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    pub text: String,
    /// Stacking order; higher values draw above lower ones.
    #[serde(default, deserialize_with = "deserialize_i64_or_null")]
    pub layer_level: i64,
    #[serde(default, deserialize_with = "deserialize_opt_i64_from_number")]
    pub created_by: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Field-scoped sticker changes. Only present fields are applied.
///
/// Used both as the body of a `PATCH` request and as the mutable portion of
/// an inbound `sticker_updated` event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_opt_i64_from_number"
    )]
    pub layer_level: Option<i64>,
}

impl StickerFields {
    /// True when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_none()
            && self.y.is_none()
            && self.width.is_none()
            && self.height.is_none()
            && self.color.is_none()
            && self.text.is_none()
            && self.layer_level.is_none()
    }

    /// Overlay `later` on top of `self`; fields set in `later` win.
    pub fn merge(&mut self, later: StickerFields) {
        if later.x.is_some() {
            self.x = later.x;
        }
        if later.y.is_some() {
            self.y = later.y;
        }
        if later.width.is_some() {
            self.width = later.width;
        }
        if later.height.is_some() {
            self.height = later.height;
        }
        if later.color.is_some() {
            self.color = later.color;
        }
        if later.text.is_some() {
            self.text = later.text;
        }
        if later.layer_level.is_some() {
            self.layer_level = later.layer_level;
        }
    }
}

/// Payload of `sticker_updated`: an id plus whichever fields changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerUpdatedPayload {
    #[serde(deserialize_with = "deserialize_i64_from_number")]
    pub sticker_id: i64,
    #[serde(default, deserialize_with = "deserialize_opt_i64_from_number")]
    pub board_id: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub fields: StickerFields,
}

/// Payload of `sticker_deleted`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerDeletedPayload {
    #[serde(deserialize_with = "deserialize_i64_from_number")]
    pub sticker_id: i64,
    #[serde(default, deserialize_with = "deserialize_opt_i64_from_number")]
    pub board_id: Option<i64>,
}

/// Body of a sticker create request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerDraft {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: String,
    pub text: String,
    pub layer_level: i64,
}

/// Board metadata as carried by `board_updated` and the board snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardPayload {
    #[serde(deserialize_with = "deserialize_i64_from_number")]
    pub board_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_i64_from_number")]
    pub owner_id: Option<i64>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Payload of `board_deleted`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardDeletedPayload {
    #[serde(deserialize_with = "deserialize_i64_from_number")]
    pub board_id: i64,
}

/// Full board as returned by `GET /api/v1/boards/{id}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    #[serde(flatten)]
    pub board: BoardPayload,
    #[serde(default)]
    pub stickers: Vec<StickerPayload>,
    /// Caller's access level on this board (e.g. `"owner"`, `"edit"`).
    #[serde(default)]
    pub permission: Option<String>,
}

/// Payload of `connected`, sent once to the joining client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    #[serde(default, deserialize_with = "deserialize_opt_i64_from_number")]
    pub board_id: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_opt_i64_from_number")]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub permission: Option<String>,
    /// Number of live connections on the board, this one included.
    #[serde(deserialize_with = "deserialize_u32_from_number")]
    pub connection_count: u32,
}

/// Payload of `user_joined` and `user_left`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantPayload {
    #[serde(default, deserialize_with = "deserialize_opt_i64_from_number")]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub user_login: Option<String>,
    #[serde(deserialize_with = "deserialize_u32_from_number")]
    pub connection_count: u32,
}

fn deserialize_i64_from_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    number_as_i64(&value).ok_or_else(|| D::Error::custom("expected integer-compatible number"))
}

fn deserialize_opt_i64_from_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    number_as_i64(&value)
        .map(Some)
        .ok_or_else(|| D::Error::custom("expected integer-compatible number"))
}

fn deserialize_i64_or_null<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_opt_i64_from_number(deserializer).map(Option::unwrap_or_default)
}

fn deserialize_u32_from_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = deserialize_i64_from_number(deserializer)?;
    u32::try_from(value).map_err(|_| D::Error::custom(format!("value {value} out of range for u32")))
}

fn deserialize_string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn number_as_i64(value: &serde_json::Value) -> Option<i64> {
    let serde_json::Value::Number(number) = value else {
        return None;
    };
    if let Some(int) = number.as_i64() {
        return Some(int);
    }
    number
        .as_f64()
        .filter(|v| v.is_finite() && v.fract() == 0.0 && *v >= i64::MIN as f64 && *v <= i64::MAX as f64)
        .map(|v| v as i64)
}
