use std::time::Duration;

use super::*;

// =============================================================
// Helpers
// =============================================================

fn config() -> ClientConfig {
    ClientConfig::default().with_token("tok").with_board(42)
}

fn manager() -> ConnectionManager {
    ConnectionManager::new(&config())
}

fn open(manager: &mut ConnectionManager) -> TimerId {
    manager.connect();
    let commands = manager.handle(TransportEvent::Opened);
    heartbeat_timer(&commands).unwrap()
}

fn heartbeat_timer(commands: &[Command]) -> Option<TimerId> {
    commands.iter().find_map(|c| match c {
        Command::StartHeartbeat { timer, .. } => Some(*timer),
        _ => None,
    })
}

fn scheduled(commands: &[Command]) -> Option<(TimerId, Duration)> {
    commands.iter().find_map(|c| match c {
        Command::ScheduleReconnect { timer, delay } => Some((*timer, *delay)),
        _ => None,
    })
}

// =============================================================
// channel_url
// =============================================================

#[test]
fn channel_url_maps_http_to_ws() {
    let url = channel_url("http://127.0.0.1:8000", 7, "abc").unwrap();
    assert_eq!(url, "ws://127.0.0.1:8000/api/v1/ws/boards/7?token=abc");
}

#[test]
fn channel_url_maps_https_to_wss_and_keeps_prefix() {
    let url = channel_url("https://example.com/board-app/", 1, "t").unwrap();
    assert_eq!(url, "wss://example.com/board-app/api/v1/ws/boards/1?token=t");
}

#[test]
fn channel_url_encodes_token() {
    let url = channel_url("http://localhost", 1, "a b&c=d").unwrap();
    assert!(url.ends_with("?token=a+b%26c%3Dd"), "{url}");
}

#[test]
fn channel_url_rejects_other_schemes() {
    assert!(matches!(channel_url("ftp://example.com", 1, "t"), Err(EndpointError::UnsupportedScheme(s)) if s == "ftp"));
    assert!(matches!(channel_url("not a url", 1, "t"), Err(EndpointError::InvalidBaseUrl { .. })));
}

// =============================================================
// connect
// =============================================================

#[test]
fn connect_opens_channel() {
    let mut m = manager();
    let commands = m.connect();
    assert_eq!(
        commands,
        vec![Command::Open { url: "ws://127.0.0.1:8000/api/v1/ws/boards/42?token=tok".to_owned() }]
    );
    assert_eq!(m.state(), ConnectionState::Connecting);
}

#[test]
fn connect_without_token_is_noop() {
    let mut m = ConnectionManager::new(&ClientConfig::default().with_board(1));
    assert!(m.connect().is_empty());
    assert_eq!(m.state(), ConnectionState::Idle);

    let mut m = ConnectionManager::new(&ClientConfig::default().with_board(1).with_token(""));
    assert!(m.connect().is_empty());
}

#[test]
fn connect_without_board_is_noop() {
    let mut m = ConnectionManager::new(&ClientConfig::default().with_token("tok"));
    assert!(m.connect().is_empty());
    assert_eq!(m.state(), ConnectionState::Idle);
}

#[test]
fn connect_twice_is_noop() {
    let mut m = manager();
    m.connect();
    assert!(m.connect().is_empty());
}

#[test]
fn opened_starts_heartbeat() {
    let mut m = manager();
    m.connect();
    let commands = m.handle(TransportEvent::Opened);
    assert!(matches!(
        commands.as_slice(),
        [Command::StartHeartbeat { every, .. }] if *every == Duration::from_secs(30)
    ));
    assert_eq!(m.state(), ConnectionState::Open);
}

#[test]
fn heartbeat_tick_sends_ping() {
    let mut m = manager();
    let timer = open(&mut m);
    assert_eq!(m.handle(TransportEvent::HeartbeatTick(timer)), vec![Command::Send(r#"{"type":"ping"}"#.to_owned())]);
}

#[test]
fn messages_produce_no_commands() {
    let mut m = manager();
    open(&mut m);
    assert!(m.handle(TransportEvent::Message("{}".to_owned())).is_empty());
}

// =============================================================
// Reconnect
// =============================================================

#[test]
fn abnormal_close_stops_heartbeat_and_schedules_reconnect() {
    let mut m = manager();
    let heartbeat = open(&mut m);
    let commands = m.handle(TransportEvent::Closed(Some(1006)));
    assert_eq!(commands[0], Command::StopHeartbeat { timer: heartbeat });
    let (_, delay) = scheduled(&commands).unwrap();
    assert_eq!(delay, Duration::from_secs(1));
    assert_eq!(m.state(), ConnectionState::Reconnecting);
    assert_eq!(m.attempts(), 1);
    assert!(m.handle(TransportEvent::HeartbeatTick(heartbeat)).is_empty());
}

#[test]
fn auth_close_codes_are_retried() {
    let mut m = manager();
    open(&mut m);
    assert!(scheduled(&m.handle(TransportEvent::Closed(Some(4001)))).is_some());
}

#[test]
fn transport_error_schedules_reconnect() {
    let mut m = manager();
    m.connect();
    let commands = m.handle(TransportEvent::Error("refused".to_owned()));
    assert!(scheduled(&commands).is_some());
    assert_eq!(m.state(), ConnectionState::Reconnecting);
}

#[test]
fn consecutive_failures_back_off_exponentially_then_recover() {
    let mut m = manager();
    m.connect();
    let mut delays = Vec::new();
    for _ in 0..4 {
        let commands = m.handle(TransportEvent::Closed(None));
        let (timer, delay) = scheduled(&commands).unwrap();
        delays.push(delay);
        assert!(matches!(m.handle(TransportEvent::ReconnectTimerFired(timer)).as_slice(), [Command::Open { .. }]));
        assert_eq!(m.state(), ConnectionState::Connecting);
    }
    assert_eq!(
        delays,
        vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(8)]
    );

    m.handle(TransportEvent::Opened);
    assert_eq!(m.state(), ConnectionState::Open);
    assert_eq!(m.attempts(), 0);
}

#[test]
fn delay_is_capped_at_max() {
    let mut config = config();
    config.reconnect.max_attempts = 10;
    let mut m = ConnectionManager::new(&config);
    m.connect();
    let mut last = Duration::ZERO;
    for _ in 0..7 {
        let (timer, delay) = scheduled(&m.handle(TransportEvent::Closed(None))).unwrap();
        last = delay;
        m.handle(TransportEvent::ReconnectTimerFired(timer));
    }
    assert_eq!(last, Duration::from_secs(30));
}

#[test]
fn failure_past_ceiling_closes_session() {
    let mut m = manager();
    m.connect();
    for _ in 0..5 {
        let (timer, _) = scheduled(&m.handle(TransportEvent::Closed(None))).unwrap();
        m.handle(TransportEvent::ReconnectTimerFired(timer));
    }
    let commands = m.handle(TransportEvent::Error("refused".to_owned()));
    assert_eq!(
        commands,
        vec![Command::Failed(ConnectionFailure { attempts: 5, last_error: Some("refused".to_owned()) })]
    );
    assert_eq!(m.state(), ConnectionState::Closed { reason: CloseReason::RetriesExhausted { attempts: 5 } });
}

#[test]
fn stale_reconnect_timer_is_ignored() {
    let mut m = manager();
    m.connect();
    let (first, _) = scheduled(&m.handle(TransportEvent::Closed(None))).unwrap();
    m.handle(TransportEvent::ReconnectTimerFired(first));
    m.handle(TransportEvent::Closed(None));
    assert!(m.handle(TransportEvent::ReconnectTimerFired(first)).is_empty());
    assert_eq!(m.state(), ConnectionState::Reconnecting);
}

#[test]
fn normal_server_close_is_terminal() {
    let mut m = manager();
    let heartbeat = open(&mut m);
    let commands = m.handle(TransportEvent::Closed(Some(1000)));
    assert_eq!(commands, vec![Command::StopHeartbeat { timer: heartbeat }]);
    assert_eq!(m.state(), ConnectionState::Closed { reason: CloseReason::ServerClosed });
}

// =============================================================
// disconnect
// =============================================================

#[test]
fn disconnect_while_open_closes_normally() {
    let mut m = manager();
    let heartbeat = open(&mut m);
    let commands = m.disconnect();
    assert_eq!(commands, vec![Command::StopHeartbeat { timer: heartbeat }, Command::Close { code: 1000 }]);
    assert_eq!(m.state(), ConnectionState::Closed { reason: CloseReason::Requested });
}

#[test]
fn disconnect_while_connecting_closes_and_ignores_late_handshake() {
    let mut m = manager();
    m.connect();
    assert_eq!(m.disconnect(), vec![Command::Close { code: 1000 }]);
    assert_eq!(m.state(), ConnectionState::Closed { reason: CloseReason::Requested });
    assert!(m.handle(TransportEvent::Opened).is_empty());
    assert!(m.handle(TransportEvent::Error("handshake timed out".to_owned())).is_empty());
}

#[test]
fn handshake_deadline_and_policy_come_from_config() {
    let mut config = config();
    config.request_timeout = Duration::from_millis(750);
    config.reconnect.max_attempts = 9;
    let m = ConnectionManager::new(&config);
    assert_eq!(m.connect_timeout(), Duration::from_millis(750));
    assert_eq!(m.policy().max_attempts, 9);
}

#[test]
fn disconnect_cancels_pending_reconnect() {
    let mut m = manager();
    open(&mut m);
    let (timer, _) = scheduled(&m.handle(TransportEvent::Closed(Some(1006)))).unwrap();
    let commands = m.disconnect();
    assert_eq!(commands, vec![Command::CancelReconnect { timer }]);
    assert!(m.handle(TransportEvent::ReconnectTimerFired(timer)).is_empty());
    assert!(m.state().is_closed());
}

#[test]
fn disconnect_is_idempotent() {
    let mut m = manager();
    open(&mut m);
    m.disconnect();
    assert!(m.disconnect().is_empty());
    assert!(m.handle(TransportEvent::Closed(Some(1006))).is_empty());
    assert!(m.handle(TransportEvent::Error("late".to_owned())).is_empty());
}

#[test]
fn disconnect_before_connect_is_noop() {
    let mut m = manager();
    assert!(m.disconnect().is_empty());
    assert_eq!(m.state(), ConnectionState::Idle);
}

#[test]
fn reset_allows_reconnect_after_close() {
    let mut m = manager();
    open(&mut m);
    m.disconnect();
    assert!(m.connect().is_empty());
    m.reset();
    assert_eq!(m.state(), ConnectionState::Idle);
    assert_eq!(m.connect().len(), 1);
}

#[test]
fn participant_count_is_recorded() {
    let mut m = manager();
    assert_eq!(m.participant_count(), None);
    m.record_participants(3);
    assert_eq!(m.participant_count(), Some(3));
}
