//! Inbound envelope routing.
//!
//! DESIGN
//! ======
//! Handlers are a closed sum type with one variant per forwardable kind, so
//! registering a handler for the wrong payload shape does not compile and
//! dispatch is an exhaustive match. Each kind holds at most one handler;
//! registering again replaces it.
//!
//! Routing is split into [`EventRouter::decode`] and [`EventRouter::dispatch`]
//! so the sync client can merge an event into board state before handlers
//! observe it. [`EventRouter::route`] runs both for standalone use.
//!
//! ERROR HANDLING
//! ==============
//! Malformed envelopes are logged at warn and dropped. Unknown kinds are
//! logged at debug and ignored, which keeps older clients working against
//! newer servers. Neither affects later messages.

#[cfg(test)]
#[path = "router_test.rs"]
mod router_test;

use std::fmt;

use wire::{
    BoardDeletedPayload, BoardPayload, CodecError, ConnectedPayload, Event, EventKind, ParticipantPayload,
    StickerDeletedPayload, StickerPayload, StickerUpdatedPayload, decode_event,
};

/// A callback for one event kind.
pub enum Handler {
    Connected(Box<dyn FnMut(&ConnectedPayload)>),
    StickerCreated(Box<dyn FnMut(&StickerPayload)>),
    StickerUpdated(Box<dyn FnMut(&StickerUpdatedPayload)>),
    StickerDeleted(Box<dyn FnMut(&StickerDeletedPayload)>),
    BoardUpdated(Box<dyn FnMut(&BoardPayload)>),
    BoardDeleted(Box<dyn FnMut(&BoardDeletedPayload)>),
    UserJoined(Box<dyn FnMut(&ParticipantPayload)>),
    UserLeft(Box<dyn FnMut(&ParticipantPayload)>),
}

impl Handler {
    pub fn connected(f: impl FnMut(&ConnectedPayload) + 'static) -> Self {
        Self::Connected(Box::new(f))
    }

    pub fn sticker_created(f: impl FnMut(&StickerPayload) + 'static) -> Self {
        Self::StickerCreated(Box::new(f))
    }

    pub fn sticker_updated(f: impl FnMut(&StickerUpdatedPayload) + 'static) -> Self {
        Self::StickerUpdated(Box::new(f))
    }

    pub fn sticker_deleted(f: impl FnMut(&StickerDeletedPayload) + 'static) -> Self {
        Self::StickerDeleted(Box::new(f))
    }

    pub fn board_updated(f: impl FnMut(&BoardPayload) + 'static) -> Self {
        Self::BoardUpdated(Box::new(f))
    }

    pub fn board_deleted(f: impl FnMut(&BoardDeletedPayload) + 'static) -> Self {
        Self::BoardDeleted(Box::new(f))
    }

    pub fn user_joined(f: impl FnMut(&ParticipantPayload) + 'static) -> Self {
        Self::UserJoined(Box::new(f))
    }

    pub fn user_left(f: impl FnMut(&ParticipantPayload) + 'static) -> Self {
        Self::UserLeft(Box::new(f))
    }

    /// The event kind this handler receives.
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
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.kind()).finish()
    }
}

/// What happened to one inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Decoded and processed; a handler ran if one was registered.
    Dispatched(EventKind),
    /// Well-formed envelope of a kind this client does not know.
    Ignored(String),
    /// Unparseable or missing required fields.
    Dropped,
}

#[derive(Default)]
struct HandlerTable {
    connected: Option<Box<dyn FnMut(&ConnectedPayload)>>,
    sticker_created: Option<Box<dyn FnMut(&StickerPayload)>>,
    sticker_updated: Option<Box<dyn FnMut(&StickerUpdatedPayload)>>,
    sticker_deleted: Option<Box<dyn FnMut(&StickerDeletedPayload)>>,
    board_updated: Option<Box<dyn FnMut(&BoardPayload)>>,
    board_deleted: Option<Box<dyn FnMut(&BoardDeletedPayload)>>,
    user_joined: Option<Box<dyn FnMut(&ParticipantPayload)>>,
    user_left: Option<Box<dyn FnMut(&ParticipantPayload)>>,
}

/// Decodes inbound text and dispatches typed events to registered handlers.
#[derive(Default)]
pub struct EventRouter {
    handlers: HandlerTable,
    participant_count: Option<u32>,
    pongs_received: u64,
    dropped: u64,
    ignored: u64,
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouter")
            .field("participant_count", &self.participant_count)
            .field("pongs_received", &self.pongs_received)
            .field("dropped", &self.dropped)
            .field("ignored", &self.ignored)
            .finish_non_exhaustive()
    }
}

impl EventRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for its kind, replacing any previous one.
    pub fn register(&mut self, handler: Handler) {
        let table = &mut self.handlers;
        match handler {
            Handler::Connected(f) => table.connected = Some(f),
            Handler::StickerCreated(f) => table.sticker_created = Some(f),
            Handler::StickerUpdated(f) => table.sticker_updated = Some(f),
            Handler::StickerDeleted(f) => table.sticker_deleted = Some(f),
            Handler::BoardUpdated(f) => table.board_updated = Some(f),
            Handler::BoardDeleted(f) => table.board_deleted = Some(f),
            Handler::UserJoined(f) => table.user_joined = Some(f),
            Handler::UserLeft(f) => table.user_left = Some(f),
        }
    }

    /// Remove the handler for `kind`. Returns whether one was installed.
    pub fn unregister(&mut self, kind: EventKind) -> bool {
        let table = &mut self.handlers;
        match kind {
            EventKind::Connected => table.connected.take().is_some(),
            EventKind::StickerCreated => table.sticker_created.take().is_some(),
            EventKind::StickerUpdated => table.sticker_updated.take().is_some(),
            EventKind::StickerDeleted => table.sticker_deleted.take().is_some(),
            EventKind::BoardUpdated => table.board_updated.take().is_some(),
            EventKind::BoardDeleted => table.board_deleted.take().is_some(),
            EventKind::UserJoined => table.user_joined.take().is_some(),
            EventKind::UserLeft => table.user_left.take().is_some(),
            EventKind::Pong => false,
        }
    }

    /// Decode one inbound message, counting and logging anything unusable.
    ///
    /// # Errors
    ///
    /// Returns [`RouteOutcome::Ignored`] for unknown kinds and
    /// [`RouteOutcome::Dropped`] for malformed envelopes.
    pub fn decode(&mut self, text: &str) -> Result<Event, RouteOutcome> {
        match decode_event(text) {
            Ok(event) => Ok(event),
            Err(CodecError::UnknownKind(kind)) => {
                tracing::debug!(%kind, "ignoring unknown event kind");
                self.ignored += 1;
                Err(RouteOutcome::Ignored(kind))
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed event");
                self.dropped += 1;
                Err(RouteOutcome::Dropped)
            }
        }
    }

    /// Process a decoded event: presence bookkeeping, then the kind's handler.
    pub fn dispatch(&mut self, event: &Event) -> RouteOutcome {
        if let Some(count) = event.participant_count() {
            self.participant_count = Some(count);
        }
        let table = &mut self.handlers;
        match event {
            Event::Connected(p) => call(table.connected.as_mut(), p),
            Event::StickerCreated(p) => call(table.sticker_created.as_mut(), p),
            Event::StickerUpdated(p) => call(table.sticker_updated.as_mut(), p),
            Event::StickerDeleted(p) => call(table.sticker_deleted.as_mut(), p),
            Event::BoardUpdated(p) => call(table.board_updated.as_mut(), p),
            Event::BoardDeleted(p) => call(table.board_deleted.as_mut(), p),
            Event::UserJoined(p) => call(table.user_joined.as_mut(), p),
            Event::UserLeft(p) => call(table.user_left.as_mut(), p),
            Event::Pong => self.pongs_received += 1,
        }
        RouteOutcome::Dispatched(event.kind())
    }

    /// Decode then dispatch.
    pub fn route(&mut self, text: &str) -> RouteOutcome {
        match self.decode(text) {
            Ok(event) => self.dispatch(&event),
            Err(outcome) => outcome,
        }
    }

    // --- Counters ---

    #[must_use]
    pub fn participant_count(&self) -> Option<u32> {
        self.participant_count
    }

    #[must_use]
    pub fn pongs_received(&self) -> u64 {
        self.pongs_received
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    #[must_use]
    pub fn ignored(&self) -> u64 {
        self.ignored
    }
}

fn call<P: ?Sized>(handler: Option<&mut Box<dyn FnMut(&P)>>, payload: &P) {
    if let Some(handler) = handler {
        handler(payload);
    }
}
