//! Shared envelope model and JSON codec for the live board channel.
//!
//! Every message on the channel is a `{ "type": ..., "data": ... }` envelope.
//! Inbound kinds form a closed set ([`EventKind`]); decoding yields a typed
//! [`Event`] so dispatch code can match exhaustively. Payload DTOs live in
//! [`payload`] and are shared with the REST boundary.

pub mod payload;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use payload::{
    BoardDeletedPayload, BoardPayload, BoardSnapshot, ConnectedPayload, ParticipantPayload, StickerDeletedPayload,
    StickerDraft, StickerFields, StickerPayload, StickerUpdatedPayload,
};

/// Close code for an intentional, orderly shutdown of the channel.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Error returned by [`decode_event`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw text is not valid JSON.
    #[error("failed to parse envelope: {0}")]
    Json(#[from] serde_json::Error),
    /// The envelope has no string `type` field.
    #[error("envelope has no string `type` field")]
    MissingType,
    /// The `type` field names a kind this client does not know.
    #[error("unknown event kind: {0}")]
    UnknownKind(String),
    /// The kind is known but its `data` payload is missing required fields.
    #[error("invalid `{kind}` payload: {source}")]
    Payload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

impl CodecError {
    /// Whether this error comes from a kind newer than this client (forward-compatible skip).
    #[must_use]
    pub fn is_unknown_kind(&self) -> bool {
        matches!(self, Self::UnknownKind(_))
    }
}

/// Closed set of inbound event kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Connected,
    StickerCreated,
    StickerUpdated,
    StickerDeleted,
    BoardUpdated,
    BoardDeleted,
    UserJoined,
    UserLeft,
    Pong,
}

impl EventKind {
    /// Every kind, in wire-table order.
    pub const ALL: [Self; 9] = [
        Self::Connected,
        Self::StickerCreated,
        Self::StickerUpdated,
        Self::StickerDeleted,
        Self::BoardUpdated,
        Self::BoardDeleted,
        Self::UserJoined,
        Self::UserLeft,
        Self::Pong,
    ];

    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::StickerCreated => "sticker_created",
            Self::StickerUpdated => "sticker_updated",
            Self::StickerDeleted => "sticker_deleted",
            Self::BoardUpdated => "board_updated",
            Self::BoardDeleted => "board_deleted",
            Self::UserJoined => "user_joined",
            Self::UserLeft => "user_left",
            Self::Pong => "pong",
        }
    }

    /// Parse a wire name; `None` for kinds outside the closed set.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded inbound message.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Connected(ConnectedPayload),
    StickerCreated(StickerPayload),
    StickerUpdated(StickerUpdatedPayload),
    StickerDeleted(StickerDeletedPayload),
    BoardUpdated(BoardPayload),
    BoardDeleted(BoardDeletedPayload),
    UserJoined(ParticipantPayload),
    UserLeft(ParticipantPayload),
    Pong,
}

impl Event {
    /// The kind tag this event was decoded from.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected(_) => EventKind::Connected,
            Self::StickerCreated(_) => EventKind::StickerCreated,
            Self::StickerUpdated(_) => EventKind::StickerUpdated,
            Self::StickerDeleted(_) => EventKind::StickerDeleted,
            Self::BoardUpdated(_) => EventKind::BoardUpdated,
            Self::BoardDeleted(_) => EventKind::BoardDeleted,
            Self::UserJoined(_) => EventKind::UserJoined,
            Self::UserLeft(_) => EventKind::UserLeft,
            Self::Pong => EventKind::Pong,
        }
    }

    /// Participant count carried by presence-bearing events.
    #[must_use]
    pub fn participant_count(&self) -> Option<u32> {
        match self {
            Self::Connected(p) => Some(p.connection_count),
            Self::UserJoined(p) | Self::UserLeft(p) => Some(p.connection_count),
            _ => None,
        }
    }
}

/// Outbound messages the client sends over the live channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Heartbeat liveness check; the server answers with `pong`.
    Ping,
}

/// Encode an outbound message as envelope text.
#[must_use]
pub fn encode_message(message: ClientMessage) -> String {
    // A unit-variant tagged enum always serializes; the fallback is unreachable.
    serde_json::to_string(&message).unwrap_or_default()
}

/// Decode one inbound text message into a typed event.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for unparseable text, [`CodecError::MissingType`]
/// when the envelope lacks a `type`, [`CodecError::UnknownKind`] for kinds
/// outside the closed set, and [`CodecError::Payload`] when `data` is missing
/// required fields.
pub fn decode_event(text: &str) -> Result<Event, CodecError> {
    let mut envelope = serde_json::from_str::<Value>(text)?;
    let raw_kind = envelope
        .get("type")
        .and_then(Value::as_str)
        .ok_or(CodecError::MissingType)?;
    let kind = EventKind::parse(raw_kind).ok_or_else(|| CodecError::UnknownKind(raw_kind.to_owned()))?;
    let data = envelope.get_mut("data").map(Value::take).unwrap_or(Value::Null);

    let event = match kind {
        EventKind::Connected => Event::Connected(payload_of(kind, data)?),
        EventKind::StickerCreated => Event::StickerCreated(payload_of(kind, data)?),
        EventKind::StickerUpdated => Event::StickerUpdated(payload_of(kind, data)?),
        EventKind::StickerDeleted => Event::StickerDeleted(payload_of(kind, data)?),
        EventKind::BoardUpdated => Event::BoardUpdated(payload_of(kind, data)?),
        EventKind::BoardDeleted => Event::BoardDeleted(payload_of(kind, data)?),
        EventKind::UserJoined => Event::UserJoined(payload_of(kind, data)?),
        EventKind::UserLeft => Event::UserLeft(payload_of(kind, data)?),
        EventKind::Pong => Event::Pong,
    };
    Ok(event)
}

fn payload_of<T>(kind: EventKind, data: Value) -> Result<T, CodecError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(data).map_err(|source| CodecError::Payload { kind, source })
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
