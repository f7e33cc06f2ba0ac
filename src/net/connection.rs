//! Live-channel session lifecycle for one board.
//!
//! SYSTEM CONTEXT
//! ==============
//! The board server pushes change notifications over a WebSocket at
//! `/api/v1/ws/boards/{board_id}?token=...`. The server answers `ping` with
//! `pong` and closes with code 1000 on orderly shutdown.
//!
//! DESIGN
//! ======
//! [`ConnectionManager`] is sans-IO: it owns the session (state, attempt
//! counter, participant count, armed timer ids) and turns each input into a
//! list of [`Command`]s for a driver to execute. Every armed timer gets a
//! fresh [`TimerId`], so a timer that fires after being cancelled or
//! superseded is recognised and ignored.
//!
//! ```text
//! Idle -> Connecting -> Open -> Reconnecting -> Connecting -> ...
//!              \          \          \
//!               +----------+----------+--> Closed
//! ```
//!
//! ERROR HANDLING
//! ==============
//! Transport failures never surface as `Err`. Abnormal closes and errors are
//! retried with exponential backoff up to the policy ceiling, after which the
//! session closes with [`CloseReason::RetriesExhausted`] and a
//! [`Command::Failed`] is emitted.

#[cfg(test)]
#[path = "connection_test.rs"]
mod connection_test;

use std::time::Duration;

use url::Url;
use wire::{ClientMessage, NORMAL_CLOSURE, encode_message};

use crate::config::{ClientConfig, ReconnectPolicy};

/// Failure to derive the live-channel URL from the configured base URL.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid base URL `{url}`: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported base URL scheme `{0}`; expected http or https")]
    UnsupportedScheme(String),
}

/// Build the live-channel URL for `board_id`.
///
/// `https` maps to `wss` and `http` to `ws`; a path prefix on the base URL is
/// kept. The token is URL-encoded into the query string.
///
/// # Errors
///
/// Returns [`EndpointError`] for unparseable URLs or non-HTTP schemes.
pub fn channel_url(base_url: &str, board_id: i64, token: &str) -> Result<String, EndpointError> {
    let mut url = Url::parse(base_url)
        .map_err(|source| EndpointError::InvalidBaseUrl { url: base_url.to_owned(), source })?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(EndpointError::UnsupportedScheme(other.to_owned())),
    };
    url.set_scheme(scheme)
        .map_err(|()| EndpointError::UnsupportedScheme(url.scheme().to_owned()))?;
    let path = format!("{}/api/v1/ws/boards/{board_id}", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut().clear().append_pair("token", token);
    Ok(url.into())
}

/// Identity of one armed timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Why a session reached [`ConnectionState::Closed`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The local side called [`ConnectionManager::disconnect`].
    Requested,
    /// The server closed the channel normally (code 1000).
    ServerClosed,
    /// Reconnect attempts hit the policy ceiling.
    RetriesExhausted { attempts: u32 },
}

/// Session lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Reconnecting,
    Closed { reason: CloseReason },
}

impl ConnectionState {
    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

/// Inputs to the manager: transport outcomes and timer expirations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The handshake completed.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// The channel closed, with the close code if one was sent.
    Closed(Option<u16>),
    /// The transport failed (handshake or I/O).
    Error(String),
    ReconnectTimerFired(TimerId),
    HeartbeatTick(TimerId),
}

/// Terminal failure details surfaced to the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionFailure {
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Side effects for the driver to execute, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Open a new channel to `url`.
    Open { url: String },
    /// Send a text frame on the open channel.
    Send(String),
    /// Close the channel with `code`.
    Close { code: u16 },
    /// Tick [`TransportEvent::HeartbeatTick`] every `every` until stopped.
    StartHeartbeat { timer: TimerId, every: Duration },
    StopHeartbeat { timer: TimerId },
    /// Fire [`TransportEvent::ReconnectTimerFired`] once after `delay`.
    ScheduleReconnect { timer: TimerId, delay: Duration },
    CancelReconnect { timer: TimerId },
    /// The session gave up; no further commands follow.
    Failed(ConnectionFailure),
}

/// Owner of one board's live-channel session.
#[derive(Debug)]
pub struct ConnectionManager {
    base_url: String,
    token: Option<String>,
    board_id: Option<i64>,
    policy: ReconnectPolicy,
    heartbeat_every: Duration,
    connect_timeout: Duration,

    state: ConnectionState,
    url: Option<String>,
    attempts: u32,
    participant_count: Option<u32>,
    heartbeat: Option<TimerId>,
    reconnect: Option<TimerId>,
    next_timer: u64,
    last_error: Option<String>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            board_id: config.board_id,
            policy: config.reconnect,
            heartbeat_every: config.heartbeat_every,
            connect_timeout: config.request_timeout,
            state: ConnectionState::Idle,
            url: None,
            attempts: 0,
            participant_count: None,
            heartbeat: None,
            reconnect: None,
            next_timer: 0,
            last_error: None,
        }
    }

    // --- Queries ---

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnect attempts made since the channel was last open.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Last participant count reported by the server.
    #[must_use]
    pub fn participant_count(&self) -> Option<u32> {
        self.participant_count
    }

    #[must_use]
    pub fn board_id(&self) -> Option<i64> {
        self.board_id
    }

    #[must_use]
    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// How long a driver may wait for the handshake of a [`Command::Open`]
    /// before reporting [`TransportEvent::Error`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    // --- Inputs ---

    /// Start the session. No-op unless idle, or without a token and board id.
    pub fn connect(&mut self) -> Vec<Command> {
        if self.state != ConnectionState::Idle {
            tracing::debug!(state = ?self.state, "connect ignored; session already started");
            return Vec::new();
        }
        let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) else {
            tracing::warn!("live channel not started: no auth token");
            return Vec::new();
        };
        let Some(board_id) = self.board_id else {
            tracing::warn!("live channel not started: no board id");
            return Vec::new();
        };
        let url = match channel_url(&self.base_url, board_id, token) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, "live channel not started");
                return Vec::new();
            }
        };

        tracing::info!(board_id, "connecting live channel");
        self.url = Some(url.clone());
        self.attempts = 0;
        self.last_error = None;
        self.state = ConnectionState::Connecting;
        vec![Command::Open { url }]
    }

    /// Tear the session down. Terminal; pending timers are cancelled.
    pub fn disconnect(&mut self) -> Vec<Command> {
        let had_socket = match self.state {
            ConnectionState::Idle | ConnectionState::Closed { .. } => return Vec::new(),
            ConnectionState::Connecting | ConnectionState::Open => true,
            ConnectionState::Reconnecting => false,
        };
        let mut commands = self.cancel_timers();
        if had_socket {
            commands.push(Command::Close { code: NORMAL_CLOSURE });
        }
        tracing::info!(board_id = ?self.board_id, "live channel disconnected");
        self.state = ConnectionState::Closed { reason: CloseReason::Requested };
        commands
    }

    /// Return a closed session to idle so [`Self::connect`] can start it again.
    pub fn reset(&mut self) {
        if self.state.is_closed() {
            self.state = ConnectionState::Idle;
            self.attempts = 0;
            self.last_error = None;
        }
    }

    /// Record the participant count carried by a presence event.
    pub fn record_participants(&mut self, count: u32) {
        self.participant_count = Some(count);
    }

    /// Feed one transport or timer event.
    pub fn handle(&mut self, event: TransportEvent) -> Vec<Command> {
        match event {
            TransportEvent::Opened => self.on_opened(),
            TransportEvent::Message(_) => Vec::new(),
            TransportEvent::Closed(code) => self.on_closed(code),
            TransportEvent::Error(message) => self.on_error(message),
            TransportEvent::ReconnectTimerFired(timer) => self.on_reconnect_timer(timer),
            TransportEvent::HeartbeatTick(timer) => self.on_heartbeat(timer),
        }
    }

    // --- Transitions ---

    fn on_opened(&mut self) -> Vec<Command> {
        if self.state != ConnectionState::Connecting {
            return Vec::new();
        }
        tracing::info!(board_id = ?self.board_id, attempts = self.attempts, "live channel open");
        self.state = ConnectionState::Open;
        self.attempts = 0;
        self.last_error = None;
        let timer = self.arm_timer();
        self.heartbeat = Some(timer);
        vec![Command::StartHeartbeat { timer, every: self.heartbeat_every }]
    }

    fn on_closed(&mut self, code: Option<u16>) -> Vec<Command> {
        if !matches!(self.state, ConnectionState::Connecting | ConnectionState::Open) {
            return Vec::new();
        }
        if code == Some(NORMAL_CLOSURE) {
            tracing::info!(board_id = ?self.board_id, "server closed live channel");
            let commands = self.cancel_timers();
            self.state = ConnectionState::Closed { reason: CloseReason::ServerClosed };
            return commands;
        }
        let reason = match code {
            Some(code) => format!("closed with code {code}"),
            None => "closed without status".to_owned(),
        };
        self.fail(reason)
    }

    fn on_error(&mut self, message: String) -> Vec<Command> {
        if !matches!(self.state, ConnectionState::Connecting | ConnectionState::Open) {
            return Vec::new();
        }
        self.fail(message)
    }

    fn on_reconnect_timer(&mut self, timer: TimerId) -> Vec<Command> {
        if self.state != ConnectionState::Reconnecting || self.reconnect != Some(timer) {
            tracing::debug!(?timer, "stale reconnect timer ignored");
            return Vec::new();
        }
        self.reconnect = None;
        let Some(url) = self.url.clone() else {
            return Vec::new();
        };
        tracing::info!(attempt = self.attempts, "reconnecting live channel");
        self.state = ConnectionState::Connecting;
        vec![Command::Open { url }]
    }

    fn on_heartbeat(&mut self, timer: TimerId) -> Vec<Command> {
        if self.state != ConnectionState::Open || self.heartbeat != Some(timer) {
            return Vec::new();
        }
        vec![Command::Send(encode_message(ClientMessage::Ping))]
    }

    fn fail(&mut self, reason: String) -> Vec<Command> {
        let mut commands = self.cancel_timers();
        self.last_error = Some(reason.clone());

        if self.attempts >= self.policy.max_attempts {
            tracing::warn!(
                attempts = self.attempts,
                error = %reason,
                "live channel reconnect attempts exhausted"
            );
            self.state = ConnectionState::Closed {
                reason: CloseReason::RetriesExhausted { attempts: self.attempts },
            };
            commands.push(Command::Failed(ConnectionFailure {
                attempts: self.attempts,
                last_error: self.last_error.clone(),
            }));
            return commands;
        }

        self.attempts += 1;
        let delay = self.policy.delay_for_attempt(self.attempts);
        tracing::warn!(
            attempt = self.attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %reason,
            "live channel lost; scheduling reconnect"
        );
        let timer = self.arm_timer();
        self.reconnect = Some(timer);
        self.state = ConnectionState::Reconnecting;
        commands.push(Command::ScheduleReconnect { timer, delay });
        commands
    }

    fn arm_timer(&mut self) -> TimerId {
        self.next_timer += 1;
        TimerId(self.next_timer)
    }

    fn cancel_timers(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        if let Some(timer) = self.heartbeat.take() {
            commands.push(Command::StopHeartbeat { timer });
        }
        if let Some(timer) = self.reconnect.take() {
            commands.push(Command::CancelReconnect { timer });
        }
        commands
    }
}
