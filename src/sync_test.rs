#![allow(clippy::float_cmp)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use canvas::consts::{MIN_HEIGHT, MIN_WIDTH};
use wire::BoardPayload;

use super::*;
use crate::state::board::ConnectionStatus;

// =============================================================
// Helpers
// =============================================================

fn client() -> BoardSyncClient {
    BoardSyncClient::new(&ClientConfig::default().with_token("tok").with_board(1))
}

fn payload(id: i64) -> StickerPayload {
    StickerPayload {
        sticker_id: id,
        board_id: 1,
        x: 0.0,
        y: 0.0,
        width: 150.0,
        height: 100.0,
        color: "#FFEB3B".to_owned(),
        text: "server".to_owned(),
        layer_level: 0,
        created_by: Some(3),
        created_at: Some("2024-01-15T10:30:00Z".to_owned()),
        updated_at: None,
    }
}

fn snapshot(stickers: Vec<StickerPayload>) -> BoardSnapshot {
    BoardSnapshot {
        board: BoardPayload {
            board_id: 1,
            title: Some("Retro".to_owned()),
            description: None,
            owner_id: Some(3),
            owner_name: None,
            background_color: None,
            created_at: None,
            updated_at: None,
        },
        stickers,
        permission: Some("edit".to_owned()),
    }
}

fn client_with(ids: &[i64]) -> BoardSyncClient {
    let mut client = client();
    client.load_snapshot(snapshot(ids.iter().map(|id| payload(*id)).collect()));
    client
}

fn message(client: &mut BoardSyncClient, text: &str) {
    let commands = client.handle(TransportEvent::Message(text.to_owned()));
    assert!(commands.is_empty());
}

fn single(drained: Vec<OutboundMutation>) -> OutboundMutation {
    assert_eq!(drained.len(), 1, "{drained:?}");
    drained.into_iter().next().unwrap()
}

fn ack_create(client: &mut BoardSyncClient, server_id: i64) -> StickerId {
    let OutboundMutation::Create { request, .. } = single(client.drain_outbound()) else {
        panic!("expected create");
    };
    client.acknowledge(request, Some(payload(server_id))).unwrap()
}

// =============================================================
// Add
// =============================================================

#[test]
fn add_inserts_provisional_sticker_and_queues_create() {
    let mut client = client_with(&[1]);
    let id = client.add_sticker(Point::new(40.0, 50.0), Size::new(10.0, 10.0), StickerColor::Green);

    assert!(id.is_provisional());
    let sticker = client.state().sticker(id).unwrap();
    assert_eq!(sticker.size, Size::new(MIN_WIDTH, MIN_HEIGHT));
    assert_eq!(sticker.layer_level, 1);

    let OutboundMutation::Create { provisional, draft, .. } = single(client.drain_outbound()) else {
        panic!("expected create");
    };
    assert_eq!(provisional, id);
    assert_eq!(draft.color, "#4CAF50");
    assert_eq!(draft.x, 40.0);
    assert_eq!(client.in_flight(), 1);
}

#[test]
fn create_ack_swaps_provisional_for_server_id() {
    let mut client = client();
    let id = client.add_sticker(Point::new(1.0, 2.0), Size::default(), StickerColor::Blue);
    let server = ack_create(&mut client, 77);

    assert_eq!(server, StickerId::Server(77));
    assert!(client.state().sticker(id).is_none());
    let sticker = client.state().sticker(server).unwrap();
    assert_eq!(sticker.color, StickerColor::Blue);
    assert_eq!(sticker.created_by, Some(3));
    assert_eq!(client.in_flight(), 0);
}

#[test]
fn echo_before_ack_keeps_one_sticker_with_local_content() {
    let mut client = client();
    let id = client.add_sticker(Point::new(1.0, 2.0), Size::default(), StickerColor::Pink);
    client.patch_sticker(id, StickerFields { text: Some("mine".to_owned()), ..StickerFields::default() });
    message(
        &mut client,
        r##"{"type":"sticker_created","data":{"stickerId":9,"boardId":1,"x":1,"y":2,"width":150,"height":100,"color":"#E91E63","text":""}}"##,
    );
    assert_eq!(client.state().stickers.len(), 2);

    ack_create(&mut client, 9);
    assert_eq!(client.state().stickers.len(), 1);
    assert_eq!(client.state().sticker(StickerId::Server(9)).unwrap().text, "mine");
}

#[test]
fn rejected_create_removes_provisional_sticker() {
    let mut client = client();
    let id = client.add_sticker(Point::default(), Size::default(), StickerColor::Red);
    let request = client.drain_outbound()[0].request();

    assert!(client.reject(request));
    assert!(client.state().sticker(id).is_none());
    assert!(!client.state().needs_resync);
    assert!(!client.reject(request));
}

// =============================================================
// Patch
// =============================================================

#[test]
fn patch_applies_locally_and_queues_canonical_color() {
    let mut client = client_with(&[5]);
    let fields = StickerFields { color: Some("#4caf50".to_owned()), ..StickerFields::default() };
    assert!(client.patch_sticker(StickerId::Server(5), fields));

    assert_eq!(client.state().sticker(StickerId::Server(5)).unwrap().color, StickerColor::Green);
    let OutboundMutation::Patch { sticker_id, fields, .. } = single(client.drain_outbound()) else {
        panic!("expected patch");
    };
    assert_eq!(sticker_id, 5);
    assert_eq!(fields.color.as_deref(), Some("#4CAF50"));
}

#[test]
fn patch_sends_clamped_size() {
    let mut client = client_with(&[5]);
    let fields = StickerFields { width: Some(-400.0), ..StickerFields::default() };
    client.patch_sticker(StickerId::Server(5), fields);

    let OutboundMutation::Patch { fields, .. } = single(client.drain_outbound()) else {
        panic!("expected patch");
    };
    assert_eq!(fields.width, Some(MIN_WIDTH));
    assert_eq!(fields.height, None);
}

#[test]
fn invalid_patches_are_noops() {
    let mut client = client_with(&[5]);
    let rev = client.state().scene_rev;
    assert!(!client.patch_sticker(StickerId::Server(5), StickerFields::default()));
    assert!(!client.patch_sticker(
        StickerId::Server(99),
        StickerFields { text: Some("x".to_owned()), ..StickerFields::default() }
    ));
    assert_eq!(client.state().scene_rev, rev);
    assert!(client.drain_outbound().is_empty());
}

#[test]
fn rejected_patch_flags_resync() {
    let mut client = client_with(&[5]);
    client.patch_sticker(StickerId::Server(5), StickerFields { x: Some(3.0), ..StickerFields::default() });
    let request = client.drain_outbound()[0].request();

    assert_eq!(client.acknowledge(request, None), Some(StickerId::Server(5)));
    client.patch_sticker(StickerId::Server(5), StickerFields { x: Some(4.0), ..StickerFields::default() });
    let request = client.drain_outbound()[0].request();
    assert!(client.reject(request));
    assert!(client.state().needs_resync);

    client.load_snapshot(snapshot(vec![payload(5)]));
    assert!(!client.state().needs_resync);
}

#[test]
fn patches_to_provisional_sticker_are_deferred_and_merged() {
    let mut client = client();
    let id = client.add_sticker(Point::default(), Size::default(), StickerColor::Yellow);
    client.patch_sticker(id, StickerFields { x: Some(10.0), ..StickerFields::default() });
    client.patch_sticker(id, StickerFields { text: Some("later".to_owned()), ..StickerFields::default() });

    let server = ack_create(&mut client, 12);
    let OutboundMutation::Patch { sticker_id, fields, .. } = single(client.drain_outbound()) else {
        panic!("expected deferred patch");
    };
    assert_eq!(sticker_id, 12);
    assert_eq!(fields.x, Some(10.0));
    assert_eq!(fields.text.as_deref(), Some("later"));
    assert_eq!(client.state().sticker(server).unwrap().text, "later");
}

#[test]
fn provisional_id_resolves_after_ack() {
    let mut client = client();
    let id = client.add_sticker(Point::default(), Size::default(), StickerColor::Yellow);
    ack_create(&mut client, 12);

    assert!(client.patch_sticker(id, StickerFields { y: Some(8.0), ..StickerFields::default() }));
    let OutboundMutation::Patch { sticker_id, .. } = single(client.drain_outbound()) else {
        panic!("expected patch");
    };
    assert_eq!(sticker_id, 12);
}

#[test]
fn resolution_is_dropped_once_the_delete_is_acknowledged() {
    let mut client = client();
    let id = client.add_sticker(Point::default(), Size::default(), StickerColor::Yellow);
    ack_create(&mut client, 12);
    assert_eq!(client.resolve(id), StickerId::Server(12));

    client.delete_sticker(id);
    let request = single(client.drain_outbound()).request();
    assert_eq!(client.resolve(id), StickerId::Server(12));
    client.acknowledge(request, None);

    assert_eq!(client.resolve(id), id);
    assert!(client.resolved.is_empty());
}

#[test]
fn resolution_is_dropped_on_remote_delete() {
    let mut client = client();
    let id = client.add_sticker(Point::default(), Size::default(), StickerColor::Yellow);
    ack_create(&mut client, 12);

    message(&mut client, r#"{"type":"sticker_deleted","data":{"stickerId":12,"boardId":1}}"#);
    assert_eq!(client.resolve(id), id);
    assert!(!client.patch_sticker(id, StickerFields { x: Some(1.0), ..StickerFields::default() }));
}

#[test]
fn resolution_is_dropped_when_snapshot_lacks_the_sticker() {
    let mut client = client();
    let kept = client.add_sticker(Point::default(), Size::default(), StickerColor::Yellow);
    ack_create(&mut client, 12);
    let gone = client.add_sticker(Point::default(), Size::default(), StickerColor::Green);
    ack_create(&mut client, 13);

    client.load_snapshot(snapshot(vec![payload(12)]));
    assert_eq!(client.resolve(kept), StickerId::Server(12));
    assert_eq!(client.resolve(gone), gone);
    assert_eq!(client.resolved.len(), 1);
}

#[test]
fn deferred_delete_leaves_no_resolution() {
    let mut client = client();
    let id = client.add_sticker(Point::default(), Size::default(), StickerColor::Cyan);
    let request = single(client.drain_outbound()).request();
    client.delete_sticker(id);

    client.acknowledge(request, Some(payload(4)));
    assert!(client.resolved.is_empty());
}

// =============================================================
// Delete
// =============================================================

#[test]
fn delete_removes_locally_and_queues_delete() {
    let mut client = client_with(&[5]);
    assert!(client.delete_sticker(StickerId::Server(5)));
    assert!(client.state().stickers.is_empty());
    assert!(matches!(single(client.drain_outbound()), OutboundMutation::Delete { sticker_id: 5, .. }));
    assert!(!client.delete_sticker(StickerId::Server(5)));
}

#[test]
fn rejected_delete_restores_sticker() {
    let mut client = client_with(&[5]);
    client.delete_sticker(StickerId::Server(5));
    let request = client.drain_outbound()[0].request();

    client.reject(request);
    assert_eq!(client.state().sticker(StickerId::Server(5)).unwrap().text, "server");
    assert!(client.state().needs_resync);
}

#[test]
fn rejected_delete_after_remote_delete_stays_deleted() {
    let mut client = client_with(&[5]);
    client.delete_sticker(StickerId::Server(5));
    let request = client.drain_outbound()[0].request();
    message(&mut client, r#"{"type":"sticker_deleted","data":{"stickerId":5,"boardId":1}}"#);

    client.reject(request);
    assert!(client.state().sticker(StickerId::Server(5)).is_none());
}

#[test]
fn deleting_undrained_provisional_sticker_cancels_create() {
    let mut client = client();
    let id = client.add_sticker(Point::default(), Size::default(), StickerColor::Cyan);
    assert!(client.delete_sticker(id));
    assert!(client.drain_outbound().is_empty());
    assert_eq!(client.in_flight(), 0);
}

#[test]
fn deleting_in_flight_provisional_sticker_defers_delete() {
    let mut client = client();
    let id = client.add_sticker(Point::default(), Size::default(), StickerColor::Cyan);
    let OutboundMutation::Create { request, .. } = single(client.drain_outbound()) else {
        panic!("expected create");
    };
    client.delete_sticker(id);
    message(
        &mut client,
        r##"{"type":"sticker_created","data":{"stickerId":4,"boardId":1,"x":0,"y":0,"width":150,"height":100,"color":"#00BCD4"}}"##,
    );

    client.acknowledge(request, Some(payload(4)));
    assert!(client.state().stickers.is_empty());
    assert!(matches!(single(client.drain_outbound()), OutboundMutation::Delete { sticker_id: 4, .. }));
}

#[test]
fn inbound_delete_wins_over_same_tick_patch() {
    let mut client = client_with(&[7]);
    client.patch_sticker(StickerId::Server(7), StickerFields { x: Some(1.0), ..StickerFields::default() });
    message(&mut client, r#"{"type":"sticker_deleted","data":{"stickerId":7,"boardId":1}}"#);
    assert!(client.state().sticker(StickerId::Server(7)).is_none());
}

#[test]
fn snapshot_does_not_resurrect_pending_delete() {
    let mut client = client_with(&[5, 6]);
    client.delete_sticker(StickerId::Server(5));
    client.load_snapshot(snapshot(vec![payload(5), payload(6)]));
    assert!(client.state().sticker(StickerId::Server(5)).is_none());
    assert!(client.state().sticker(StickerId::Server(6)).is_some());
}

#[test]
fn next_outbound_hands_over_one_mutation_at_a_time() {
    let mut client = client_with(&[5, 6]);
    client.delete_sticker(StickerId::Server(5));
    client.delete_sticker(StickerId::Server(6));

    assert!(matches!(client.next_outbound(), Some(OutboundMutation::Delete { sticker_id: 5, .. })));
    assert_eq!(client.pending_outbound(), 1);
    assert_eq!(client.in_flight(), 2);
}

#[test]
fn abandoned_request_settles_as_rejection_and_flags_resync() {
    let mut client = client();
    let id = client.add_sticker(Point::default(), Size::default(), StickerColor::Blue);
    let request = single(client.drain_outbound()).request();

    assert!(client.abandon(request));
    assert!(client.state().sticker(id).is_none());
    assert_eq!(client.in_flight(), 0);
    assert!(client.state().needs_resync);
    assert!(!client.abandon(request));
}

// =============================================================
// Inbound
// =============================================================

#[test]
fn inbound_events_merge_then_reach_subscribers() {
    let mut client = client_with(&[7]);
    let seen = Rc::new(Cell::new(0));
    let counter = Rc::clone(&seen);
    client.subscribe(Handler::sticker_updated(move |p| {
        assert_eq!(p.sticker_id, 7);
        counter.set(counter.get() + 1);
    }));

    message(&mut client, r#"{"type":"sticker_updated","data":{"stickerId":7,"x":50,"y":60}}"#);
    message(&mut client, r##"{"type":"sticker_updated","data":{"stickerId":7,"color":"#2196F3"}}"##);

    let sticker = client.state().sticker(StickerId::Server(7)).unwrap();
    assert_eq!(sticker.position, Point::new(50.0, 60.0));
    assert_eq!(sticker.color, StickerColor::Blue);
    assert_eq!(sticker.text, "server");
    assert_eq!(seen.get(), 2);

    assert!(client.unsubscribe(EventKind::StickerUpdated));
    message(&mut client, r#"{"type":"sticker_updated","data":{"stickerId":7,"x":1}}"#);
    assert_eq!(seen.get(), 2);
}

#[test]
fn unknown_and_malformed_messages_leave_state_unchanged() {
    let mut client = client_with(&[7]);
    let rev = client.state().scene_rev;
    message(&mut client, r#"{"type":"cursor_moved","data":{"x":1}}"#);
    message(&mut client, "not json");
    message(&mut client, r#"{"type":"sticker_created","data":{"stickerId":8}}"#);

    assert_eq!(client.state().scene_rev, rev);
    assert_eq!(client.router().ignored(), 1);
    assert_eq!(client.router().dropped(), 2);
}

#[test]
fn presence_updates_participant_count() {
    let mut client = client();
    message(&mut client, r#"{"type":"connected","data":{"boardId":1,"userId":3,"connectionCount":2}}"#);
    message(&mut client, r#"{"type":"user_left","data":{"userId":4,"connectionCount":1}}"#);
    assert_eq!(client.state().participant_count, 1);
    assert_eq!(client.connection().participant_count(), Some(1));
}

// =============================================================
// Connection status
// =============================================================

#[test]
fn status_follows_connection_lifecycle() {
    let mut client = client();
    assert!(matches!(client.connect().as_slice(), [Command::Open { .. }]));
    assert_eq!(client.state().connection_status, ConnectionStatus::Connecting);

    client.handle(TransportEvent::Opened);
    assert_eq!(client.state().connection_status, ConnectionStatus::Connected);

    client.handle(TransportEvent::Closed(Some(1006)));
    assert_eq!(client.state().connection_status, ConnectionStatus::Reconnecting);

    client.disconnect();
    assert_eq!(client.state().connection_status, ConnectionStatus::Disconnected);

    client.reset_connection();
    assert_eq!(client.connection().state(), ConnectionState::Idle);
}

#[test]
fn reopening_after_drop_flags_resync() {
    let mut client = client();
    client.connect();
    client.handle(TransportEvent::Opened);
    assert!(!client.state().needs_resync);

    let commands = client.handle(TransportEvent::Error("reset".to_owned()));
    let timer = commands
        .iter()
        .find_map(|c| match c {
            Command::ScheduleReconnect { timer, .. } => Some(*timer),
            _ => None,
        })
        .unwrap();
    client.handle(TransportEvent::ReconnectTimerFired(timer));
    client.handle(TransportEvent::Opened);

    assert_eq!(client.state().connection_status, ConnectionStatus::Connected);
    assert!(client.state().needs_resync);
}

// =============================================================
// Interaction wiring
// =============================================================

#[test]
fn drag_and_resize_commits_patch_the_sticker() {
    let client = Rc::new(RefCell::new(client_with(&[5])));
    let mut on_drag = drag_commit_handler(&client, StickerId::Server(5));
    let mut on_resize = resize_commit_handler(&client, StickerId::Server(5));

    on_drag(Point::new(30.0, 40.0));
    on_resize(Size::new(20.0, 300.0));

    let client = client.borrow();
    let sticker = client.state().sticker(StickerId::Server(5)).unwrap();
    assert_eq!(sticker.position, Point::new(30.0, 40.0));
    assert_eq!(sticker.size, Size::new(MIN_WIDTH, 300.0));
    assert_eq!(client.pending_outbound(), 2);
}

#[test]
fn text_and_color_commits_patch_the_sticker() {
    let client = Rc::new(RefCell::new(client_with(&[5])));
    let handlers = sticker_handlers(&client, StickerId::Server(5));
    let (Some(mut on_text), Some(mut on_color)) = (handlers.on_text_commit, handlers.on_color_commit) else {
        panic!("expected text and color callbacks");
    };

    on_text("note".to_owned());
    on_color("#9c27b0".to_owned());

    let client = client.borrow();
    let sticker = client.state().sticker(StickerId::Server(5)).unwrap();
    assert_eq!(sticker.text, "note");
    assert_eq!(sticker.color, StickerColor::Purple);
}

#[test]
fn commit_after_client_dropped_is_ignored() {
    let client = Rc::new(RefCell::new(client_with(&[5])));
    let mut on_drag = drag_commit_handler(&client, StickerId::Server(5));
    drop(client);
    on_drag(Point::new(1.0, 1.0));
}
