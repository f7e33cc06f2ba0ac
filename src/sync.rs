//! Composition root: one board's live channel, local state and outbound queue.
//!
//! SYSTEM CONTEXT
//! ==============
//! [`BoardSyncClient`] owns the [`ConnectionManager`], the [`EventRouter`] and
//! the [`BoardState`] they feed. Local edits are applied immediately and
//! queued as [`OutboundMutation`]s for the REST boundary; the driver drains
//! the queue, performs the requests and reports back through
//! [`BoardSyncClient::acknowledge`] or [`BoardSyncClient::reject`].
//!
//! DESIGN
//! ======
//! Local and inbound changes both go through [`merge::apply`], so there is
//! exactly one write path into board state. Inbound events are merged before
//! subscribers see them, which means a handler always observes the state the
//! event produced.
//!
//! A sticker created locally carries a provisional id until its create is
//! acknowledged. Patches to it are applied locally at once and folded into
//! one deferred patch; a delete is deferred too. Both are issued against the
//! server id when the acknowledgment arrives. The provisional id stays
//! usable afterwards: commit callbacks bound to it resolve to the server id.
//!
//! ERROR HANDLING
//! ==============
//! Invalid local operations (unknown sticker, empty patch) are no-ops that
//! return `false`. A rejected create removes the provisional sticker along
//! with its deferred edits. A rejected patch or delete cannot be undone
//! field-by-field, so it sets `needs_resync`; a rejected delete also puts the
//! sticker back unless the server deleted it in the meantime.

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use canvas::engine::{DragCommit, ResizeCommit, StickerHandlers};
use canvas::geometry::{Point, Size};
use wire::{BoardSnapshot, EventKind, StickerDraft, StickerFields, StickerPayload};

use crate::config::ClientConfig;
use crate::net::connection::{Command, ConnectionManager, ConnectionState, TransportEvent};
use crate::net::router::{EventRouter, Handler};
use crate::net::types::{Sticker, StickerId};
use crate::state::board::BoardState;
use crate::state::merge::{self, Mutation};
use crate::util::color::StickerColor;

/// Correlates an outbound mutation with its eventual acknowledgment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// A local change waiting to be sent to the server.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMutation {
    Create { request: RequestId, provisional: StickerId, draft: StickerDraft },
    Patch { request: RequestId, sticker_id: i64, fields: StickerFields },
    Delete { request: RequestId, sticker_id: i64 },
}

impl OutboundMutation {
    #[must_use]
    pub fn request(&self) -> RequestId {
        match self {
            Self::Create { request, .. } | Self::Patch { request, .. } | Self::Delete { request, .. } => *request,
        }
    }
}

#[derive(Clone, Debug)]
enum InFlight {
    Create { provisional: StickerId },
    Patch { sticker_id: i64 },
    /// `removed` is the local copy to restore if the server refuses; cleared
    /// when an inbound delete for the same sticker arrives first.
    Delete { sticker_id: i64, removed: Option<Sticker> },
}

/// Edits made to a provisional sticker before its create was acknowledged.
#[derive(Clone, Debug, Default)]
struct Deferred {
    fields: StickerFields,
    delete: bool,
}

/// One board's sync session.
pub struct BoardSyncClient {
    state: BoardState,
    connection: ConnectionManager,
    router: EventRouter,
    outbound: VecDeque<OutboundMutation>,
    in_flight: HashMap<RequestId, InFlight>,
    deferred: HashMap<StickerId, Deferred>,
    /// Provisional id -> server id, for callbacks bound before the ack.
    /// Entries go when the server sticker is gone.
    resolved: HashMap<StickerId, i64>,
    next_request: u64,
}

impl fmt::Debug for BoardSyncClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoardSyncClient")
            .field("board_id", &self.state.board_id)
            .field("stickers", &self.state.stickers.len())
            .field("connection", &self.connection.state())
            .field("outbound", &self.outbound.len())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl BoardSyncClient {
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            state: BoardState::new(config.board_id),
            connection: ConnectionManager::new(config),
            router: EventRouter::new(),
            outbound: VecDeque::new(),
            in_flight: HashMap::new(),
            deferred: HashMap::new(),
            resolved: HashMap::new(),
            next_request: 0,
        }
    }

    // --- Queries ---

    #[must_use]
    pub fn state(&self) -> &BoardState {
        &self.state
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    #[must_use]
    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Requests handed to the transport and not yet acknowledged or rejected.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Queued mutations not yet drained.
    #[must_use]
    pub fn pending_outbound(&self) -> usize {
        self.outbound.len()
    }

    /// The current id for `id`: a provisional id whose create has been
    /// acknowledged maps to its server id.
    #[must_use]
    pub fn resolve(&self, id: StickerId) -> StickerId {
        self.resolved.get(&id).map_or(id, |server| StickerId::Server(*server))
    }

    // --- Subscriptions ---

    pub fn subscribe(&mut self, handler: Handler) {
        self.router.register(handler);
    }

    pub fn unsubscribe(&mut self, kind: EventKind) -> bool {
        self.router.unregister(kind)
    }

    // --- Local edits ---

    /// Optimistically add a sticker on top of the stack. Returns its provisional id.
    pub fn add_sticker(&mut self, position: Point, size: Size, color: StickerColor) -> StickerId {
        let mut sticker = Sticker::provisional(position, size, color);
        sticker.board_id = self.state.board_id;
        sticker.layer_level = self.state.top_layer();
        let provisional = sticker.id;
        let request = self.next_request_id();

        self.outbound
            .push_back(OutboundMutation::Create { request, provisional, draft: sticker.draft() });
        self.in_flight.insert(request, InFlight::Create { provisional });
        merge::apply(&mut self.state, Mutation::Upsert(sticker));
        tracing::debug!(%provisional, %request, "sticker added locally");
        provisional
    }

    /// Apply `fields` to a sticker and queue the change. Colors are sent as
    /// canonical palette hex and sizes as clamped. Returns `false` for an
    /// unknown sticker or an empty patch.
    pub fn patch_sticker(&mut self, id: StickerId, mut fields: StickerFields) -> bool {
        let id = self.resolve(id);
        if fields.is_empty() || self.state.sticker(id).is_none() {
            return false;
        }
        if let Some(color) = fields.color.as_mut() {
            *color = StickerColor::from_hex(color).to_hex().to_owned();
        }
        merge::apply(&mut self.state, Mutation::Patch { id, fields: fields.clone(), updated_at: None });
        if let Some(sticker) = self.state.sticker(id) {
            if fields.width.is_some() {
                fields.width = Some(sticker.size.width);
            }
            if fields.height.is_some() {
                fields.height = Some(sticker.size.height);
            }
        }

        match id {
            StickerId::Server(sticker_id) => {
                let request = self.next_request_id();
                self.outbound.push_back(OutboundMutation::Patch { request, sticker_id, fields });
                self.in_flight.insert(request, InFlight::Patch { sticker_id });
            }
            StickerId::Provisional(_) => {
                tracing::debug!(%id, "deferring patch until create is acknowledged");
                self.deferred.entry(id).or_default().fields.merge(fields);
            }
        }
        true
    }

    /// Remove a sticker locally and queue the delete. Returns `false` for an
    /// unknown sticker.
    pub fn delete_sticker(&mut self, id: StickerId) -> bool {
        let id = self.resolve(id);
        let Some(removed) = self.state.sticker(id).cloned() else {
            return false;
        };
        merge::apply(&mut self.state, Mutation::Remove(id));

        match id {
            StickerId::Server(sticker_id) => {
                let request = self.next_request_id();
                self.outbound.push_back(OutboundMutation::Delete { request, sticker_id });
                self.in_flight
                    .insert(request, InFlight::Delete { sticker_id, removed: Some(removed) });
            }
            StickerId::Provisional(_) => {
                if let Some(request) = self.take_queued_create(id) {
                    tracing::debug!(%id, %request, "dropped queued create for deleted sticker");
                    self.in_flight.remove(&request);
                    self.deferred.remove(&id);
                } else {
                    tracing::debug!(%id, "deferring delete until create is acknowledged");
                    self.deferred.entry(id).or_default().delete = true;
                }
            }
        }
        true
    }

    /// Hand every queued mutation to the transport, oldest first.
    pub fn drain_outbound(&mut self) -> Vec<OutboundMutation> {
        self.outbound.drain(..).collect()
    }

    /// Hand the oldest queued mutation to the transport.
    pub fn next_outbound(&mut self) -> Option<OutboundMutation> {
        self.outbound.pop_front()
    }

    // --- Acknowledgments ---

    /// The server accepted `request`. For a create, `response` is the
    /// persisted sticker and the returned id is its server id.
    pub fn acknowledge(&mut self, request: RequestId, response: Option<StickerPayload>) -> Option<StickerId> {
        let Some(entry) = self.in_flight.remove(&request) else {
            tracing::debug!(%request, "acknowledgment for unknown request");
            return None;
        };
        match entry {
            InFlight::Create { provisional } => self.acknowledge_create(request, provisional, response),
            InFlight::Patch { sticker_id } => Some(StickerId::Server(sticker_id)),
            InFlight::Delete { sticker_id, .. } => {
                self.forget_resolved(sticker_id);
                Some(StickerId::Server(sticker_id))
            }
        }
    }

    /// The server refused `request`. Returns whether the request was known.
    pub fn reject(&mut self, request: RequestId) -> bool {
        let Some(entry) = self.in_flight.remove(&request) else {
            return false;
        };
        match entry {
            InFlight::Create { provisional } => {
                tracing::warn!(%request, %provisional, "create rejected; removing provisional sticker");
                self.deferred.remove(&provisional);
                merge::apply(&mut self.state, Mutation::Remove(provisional));
            }
            InFlight::Patch { sticker_id } => {
                tracing::warn!(%request, sticker_id, "patch rejected; board needs resync");
                self.flag_resync();
            }
            InFlight::Delete { sticker_id, removed } => {
                tracing::warn!(%request, sticker_id, "delete rejected; board needs resync");
                if let Some(sticker) = removed {
                    if self.state.sticker(sticker.id).is_none() {
                        merge::apply(&mut self.state, Mutation::Upsert(sticker));
                    }
                }
                self.flag_resync();
            }
        }
        true
    }

    /// The outcome of `request` is unknown, e.g. the transport was torn down
    /// mid-request. Settled as a rejection, and the board is flagged for resync.
    pub fn abandon(&mut self, request: RequestId) -> bool {
        if !self.reject(request) {
            return false;
        }
        tracing::warn!(%request, "request abandoned; board needs resync");
        self.flag_resync();
        true
    }

    /// Replace board metadata and server stickers from a REST snapshot.
    ///
    /// Provisional stickers are kept, and stickers with a delete in flight
    /// stay removed.
    pub fn load_snapshot(&mut self, snapshot: BoardSnapshot) {
        tracing::info!(board_id = snapshot.board.board_id, stickers = snapshot.stickers.len(), "loading board snapshot");
        merge::apply(&mut self.state, Mutation::Snapshot(snapshot));
        let pending_deletes = self
            .in_flight
            .values()
            .filter_map(|entry| match entry {
                InFlight::Delete { sticker_id, .. } => Some(*sticker_id),
                _ => None,
            })
            .collect::<Vec<_>>();
        for sticker_id in pending_deletes {
            merge::apply(&mut self.state, Mutation::Remove(StickerId::Server(sticker_id)));
        }
        let state = &self.state;
        self.resolved.retain(|_, sticker_id| state.sticker(StickerId::Server(*sticker_id)).is_some());
    }

    // --- Transport ---

    pub fn connect(&mut self) -> Vec<Command> {
        let commands = self.connection.connect();
        self.sync_status();
        commands
    }

    pub fn disconnect(&mut self) -> Vec<Command> {
        let commands = self.connection.disconnect();
        self.sync_status();
        commands
    }

    /// Return a closed session to idle so it can be connected again.
    pub fn reset_connection(&mut self) {
        self.connection.reset();
        self.sync_status();
    }

    /// Feed one transport or timer event. Messages are merged into state and
    /// dispatched to subscribers; everything else drives the connection.
    pub fn handle(&mut self, event: TransportEvent) -> Vec<Command> {
        if let TransportEvent::Message(text) = &event {
            self.on_message(text);
            return Vec::new();
        }
        let reopening = matches!(event, TransportEvent::Opened) && self.connection.attempts() > 0;
        let commands = self.connection.handle(event);
        if reopening && self.connection.state() == ConnectionState::Open {
            tracing::info!("live channel reopened; events may have been missed");
            self.flag_resync();
        }
        self.sync_status();
        commands
    }

    // --- Internals ---

    fn on_message(&mut self, text: &str) {
        let Ok(event) = self.router.decode(text) else {
            return;
        };
        if let Some(count) = event.participant_count() {
            self.connection.record_participants(count);
        }
        if let Some(mutation) = Mutation::from_event(&event) {
            if let Mutation::Remove(StickerId::Server(sticker_id)) = &mutation {
                self.forget_restore(*sticker_id);
                self.forget_resolved(*sticker_id);
            }
            merge::apply(&mut self.state, mutation);
        }
        self.router.dispatch(&event);
    }

    fn acknowledge_create(
        &mut self,
        request: RequestId,
        provisional: StickerId,
        response: Option<StickerPayload>,
    ) -> Option<StickerId> {
        let Some(server) = response else {
            tracing::warn!(%request, %provisional, "create acknowledged without a sticker; board needs resync");
            self.deferred.remove(&provisional);
            merge::apply(&mut self.state, Mutation::Remove(provisional));
            self.flag_resync();
            return None;
        };
        let sticker_id = server.sticker_id;
        let server_id = StickerId::Server(sticker_id);
        let deferred = self.deferred.remove(&provisional).unwrap_or_default();
        tracing::debug!(%provisional, sticker_id, "create acknowledged");

        if deferred.delete {
            merge::apply(&mut self.state, Mutation::Remove(server_id));
            let request = self.next_request_id();
            self.outbound.push_back(OutboundMutation::Delete { request, sticker_id });
            self.in_flight.insert(request, InFlight::Delete { sticker_id, removed: None });
            return Some(server_id);
        }

        self.resolved.insert(provisional, sticker_id);
        merge::apply(&mut self.state, Mutation::Acknowledged { provisional, server });
        if !deferred.fields.is_empty() {
            let request = self.next_request_id();
            self.outbound
                .push_back(OutboundMutation::Patch { request, sticker_id, fields: deferred.fields });
            self.in_flight.insert(request, InFlight::Patch { sticker_id });
        }
        Some(server_id)
    }

    fn take_queued_create(&mut self, provisional: StickerId) -> Option<RequestId> {
        let index = self.outbound.iter().position(|m| {
            matches!(m, OutboundMutation::Create { provisional: queued, .. } if *queued == provisional)
        })?;
        self.outbound.remove(index).map(|m| m.request())
    }

    fn forget_restore(&mut self, deleted: i64) {
        for entry in self.in_flight.values_mut() {
            if let InFlight::Delete { sticker_id, removed } = entry {
                if *sticker_id == deleted {
                    *removed = None;
                }
            }
        }
    }

    fn forget_resolved(&mut self, deleted: i64) {
        self.resolved.retain(|_, sticker_id| *sticker_id != deleted);
    }

    fn flag_resync(&mut self) {
        if !self.state.needs_resync {
            self.state.needs_resync = true;
            self.state.bump_scene_rev();
        }
    }

    fn sync_status(&mut self) {
        let status = self.connection.state().into();
        merge::apply(&mut self.state, Mutation::Status(status));
        if let Some(count) = self.connection.participant_count() {
            merge::apply(&mut self.state, Mutation::Participants(count));
        }
    }

    fn next_request_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }
}

// --- Interaction wiring ---

/// Drag commit callback that patches the sticker's position.
#[must_use]
pub fn drag_commit_handler(client: &Rc<RefCell<BoardSyncClient>>, id: StickerId) -> DragCommit {
    let client = Rc::downgrade(client);
    Box::new(move |position: Point| {
        let fields = StickerFields { x: Some(position.x), y: Some(position.y), ..StickerFields::default() };
        patch_from_callback(&client, id, fields);
    })
}

/// Resize commit callback that patches the sticker's size.
#[must_use]
pub fn resize_commit_handler(client: &Rc<RefCell<BoardSyncClient>>, id: StickerId) -> ResizeCommit {
    let client = Rc::downgrade(client);
    Box::new(move |size: Size| {
        let fields = StickerFields { width: Some(size.width), height: Some(size.height), ..StickerFields::default() };
        patch_from_callback(&client, id, fields);
    })
}

/// Every commit callback for `id`, ready for `InteractionEngine::register`.
#[must_use]
pub fn sticker_handlers(client: &Rc<RefCell<BoardSyncClient>>, id: StickerId) -> StickerHandlers {
    let text_client = Rc::downgrade(client);
    let color_client = Rc::downgrade(client);
    StickerHandlers {
        on_drag_commit: Some(drag_commit_handler(client, id)),
        on_resize_commit: Some(resize_commit_handler(client, id)),
        ..StickerHandlers::default()
    }
    .on_text(move |text| {
        patch_from_callback(&text_client, id, StickerFields { text: Some(text), ..StickerFields::default() });
    })
    .on_color(move |color| {
        patch_from_callback(&color_client, id, StickerFields { color: Some(color), ..StickerFields::default() });
    })
}

fn patch_from_callback(client: &Weak<RefCell<BoardSyncClient>>, id: StickerId, fields: StickerFields) {
    let Some(client) = client.upgrade() else {
        return;
    };
    let Ok(mut client) = client.try_borrow_mut() else {
        tracing::warn!(%id, "sync client busy; commit dropped");
        return;
    };
    client.patch_sticker(id, fields);
}
