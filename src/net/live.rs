//! Tokio driver for one board's live channel.
//!
//! SYSTEM CONTEXT
//! ==============
//! [`BoardSyncClient`] decides; this module does. It opens the WebSocket,
//! arms the reconnect sleep and the heartbeat interval the connection
//! manager asks for, feeds socket traffic and timer firings back in, and
//! pushes queued sticker mutations through the REST client.
//!
//! DESIGN
//! ======
//! The whole session runs on one task: a single `tokio::select!` over the
//! socket, the pending handshake, the reconnect sleep, the heartbeat
//! interval, the pending REST call, the resync backoff and the control
//! channel. Nothing that waits on the network is awaited outside that
//! `select!`, so `disconnect()` is honoured in every state. At most one REST
//! call runs at a time, taken one mutation at a time from the client's queue.
//!
//! The sync client is shared with the interaction layer through
//! `Rc<RefCell<_>>`, so [`LiveSession::run`] is not `Send`; await it directly
//! or inside a `LocalSet`. No `RefCell` borrow is held across an await.
//!
//! ERROR HANDLING
//! ==============
//! Socket failures and handshakes that miss their deadline become
//! [`TransportEvent`]s and are retried by the connection manager. A failed
//! REST submission rejects that mutation. A failed resync fetch is retried
//! on the reconnect policy's backoff. A submission still running when the
//! session closes is abandoned. The only error [`LiveSession::run`] returns
//! is [`LiveError::NotStarted`], when the session could not begin at all.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::{self, Future};
use std::pin::Pin;
use std::rc::Rc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, Sleep};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use wire::{BoardSnapshot, StickerPayload};

use crate::net::api::{ApiClient, ApiError};
use crate::net::connection::{CloseReason, Command, ConnectionState, TimerId, TransportEvent};
use crate::sync::{BoardSyncClient, RequestId};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketItem = Result<Message, tokio_tungstenite::tungstenite::Error>;
type Handshake = Pin<Box<dyn Future<Output = Result<Box<Socket>, String>>>>;

#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    /// `connect()` produced nothing: no token, no board id, or a bad base URL.
    #[error("live channel did not start; check token, board id and base URL")]
    NotStarted,
}

#[derive(Debug)]
enum Control {
    Disconnect,
}

/// Remote control for a running [`LiveSession`].
///
/// Dropping every handle disconnects the session.
#[derive(Clone, Debug)]
pub struct LiveHandle {
    control: mpsc::UnboundedSender<Control>,
}

impl LiveHandle {
    /// Ask the session to close the channel and stop. Returns `false` if it
    /// has already finished.
    pub fn disconnect(&self) -> bool {
        self.control.send(Control::Disconnect).is_ok()
    }
}

enum RestOutcome {
    Snapshot(Result<BoardSnapshot, ApiError>),
    Submitted { request: RequestId, result: Result<Option<StickerPayload>, ApiError> },
}

struct RestCall {
    /// The mutation being submitted; `None` for a snapshot fetch.
    request: Option<RequestId>,
    future: Pin<Box<dyn Future<Output = RestOutcome>>>,
}

enum Wake {
    Socket(Option<SocketItem>),
    Handshake(Result<Box<Socket>, String>),
    Reconnect(TimerId),
    Heartbeat(TimerId),
    Rest(RestOutcome),
    ResyncBackoff,
    Control(Option<Control>),
}

/// The driver loop for one board.
pub struct LiveSession {
    client: Rc<RefCell<BoardSyncClient>>,
    api: Option<ApiClient>,
    control: mpsc::UnboundedReceiver<Control>,
    socket: Option<Socket>,
    handshake: Option<Handshake>,
    reconnect: Option<(TimerId, Pin<Box<Sleep>>)>,
    heartbeat: Option<(TimerId, Interval)>,
    rest: Option<RestCall>,
    resync_failures: u32,
    resync_backoff: Option<Pin<Box<Sleep>>>,
}

impl LiveSession {
    #[must_use]
    pub fn new(client: Rc<RefCell<BoardSyncClient>>) -> (Self, LiveHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            client,
            api: None,
            control: rx,
            socket: None,
            handshake: None,
            reconnect: None,
            heartbeat: None,
            rest: None,
            resync_failures: 0,
            resync_backoff: None,
        };
        (session, LiveHandle { control: tx })
    }

    /// Submit queued mutations through `api` and refresh the board snapshot
    /// when the client asks for a resync.
    #[must_use]
    pub fn with_api(mut self, api: ApiClient) -> Self {
        self.api = Some(api);
        self
    }

    /// Run until the session closes. Returns why it closed.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::NotStarted`] when the client refuses to connect.
    pub async fn run(mut self) -> Result<CloseReason, LiveError> {
        let commands = self.client.borrow_mut().connect();
        if commands.is_empty() {
            return Err(LiveError::NotStarted);
        }

        let mut queue = VecDeque::from(commands);
        loop {
            while let Some(command) = queue.pop_front() {
                if let Some(event) = self.execute(command).await {
                    queue.extend(self.client.borrow_mut().handle(event));
                }
            }

            let state = self.client.borrow().connection().state();
            if let ConnectionState::Closed { reason } = state {
                self.abandon_rest();
                tracing::info!(?reason, "live session finished");
                return Ok(reason);
            }
            self.start_rest();

            let wake = tokio::select! {
                item = next_frame(&mut self.socket) => Wake::Socket(item),
                result = next_handshake(&mut self.handshake) => Wake::Handshake(result),
                timer = sleep_until_fired(&mut self.reconnect) => Wake::Reconnect(timer),
                timer = next_tick(&mut self.heartbeat) => Wake::Heartbeat(timer),
                outcome = next_rest(&mut self.rest) => Wake::Rest(outcome),
                () = backoff_elapsed(&mut self.resync_backoff) => Wake::ResyncBackoff,
                control = self.control.recv() => Wake::Control(control),
            };

            let commands = match wake {
                Wake::Socket(item) => match self.on_socket(item) {
                    Some(event) => self.client.borrow_mut().handle(event),
                    None => Vec::new(),
                },
                Wake::Handshake(result) => {
                    self.handshake = None;
                    let event = match result {
                        Ok(socket) => {
                            self.socket = Some(*socket);
                            TransportEvent::Opened
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "live channel connect failed");
                            TransportEvent::Error(e)
                        }
                    };
                    self.client.borrow_mut().handle(event)
                }
                Wake::Reconnect(timer) => {
                    self.reconnect = None;
                    self.client.borrow_mut().handle(TransportEvent::ReconnectTimerFired(timer))
                }
                Wake::Heartbeat(timer) => self.client.borrow_mut().handle(TransportEvent::HeartbeatTick(timer)),
                Wake::Rest(outcome) => {
                    self.rest = None;
                    self.on_rest(outcome);
                    Vec::new()
                }
                Wake::ResyncBackoff => {
                    self.resync_backoff = None;
                    Vec::new()
                }
                Wake::Control(Some(Control::Disconnect) | None) => self.client.borrow_mut().disconnect(),
            };
            queue.extend(commands);
        }
    }

    /// Perform one command. Returns the transport event it produced, if any.
    async fn execute(&mut self, command: Command) -> Option<TransportEvent> {
        match command {
            Command::Open { url } => {
                self.socket = None;
                let deadline = self.client.borrow().connection().connect_timeout();
                self.handshake = Some(Box::pin(handshake(url, deadline)));
                None
            }
            Command::Send(text) => {
                let socket = self.socket.as_mut()?;
                if let Err(e) = socket.send(Message::Text(text.into())).await {
                    self.socket = None;
                    return Some(TransportEvent::Error(e.to_string()));
                }
                None
            }
            Command::Close { code } => {
                self.handshake = None;
                let mut socket = self.socket.take()?;
                let frame = CloseFrame { code: CloseCode::from(code), reason: "client disconnect".into() };
                if let Err(e) = socket.close(Some(frame)).await {
                    tracing::debug!(error = %e, "close handshake failed");
                }
                None
            }
            Command::StartHeartbeat { timer, every } => {
                self.heartbeat = Some((timer, tokio::time::interval_at(Instant::now() + every, every)));
                None
            }
            Command::StopHeartbeat { timer } => {
                if self.heartbeat.as_ref().is_some_and(|(armed, _)| *armed == timer) {
                    self.heartbeat = None;
                }
                None
            }
            Command::ScheduleReconnect { timer, delay } => {
                self.reconnect = Some((timer, Box::pin(tokio::time::sleep(delay))));
                None
            }
            Command::CancelReconnect { timer } => {
                if self.reconnect.as_ref().is_some_and(|(armed, _)| *armed == timer) {
                    self.reconnect = None;
                }
                None
            }
            Command::Failed(failure) => {
                tracing::error!(
                    attempts = failure.attempts,
                    error = failure.last_error.as_deref().unwrap_or("unknown"),
                    "live channel gave up"
                );
                None
            }
        }
    }

    fn on_socket(&mut self, item: Option<SocketItem>) -> Option<TransportEvent> {
        match item {
            Some(Ok(Message::Text(text))) => Some(TransportEvent::Message(text.as_str().to_owned())),
            Some(Ok(Message::Close(frame))) => {
                self.socket = None;
                Some(TransportEvent::Closed(frame.map(|f| u16::from(f.code))))
            }
            Some(Ok(_)) => None,
            Some(Err(e)) => {
                self.socket = None;
                Some(TransportEvent::Error(e.to_string()))
            }
            None => {
                self.socket = None;
                Some(TransportEvent::Closed(None))
            }
        }
    }

    /// Start the next REST call if none is running: a snapshot fetch when the
    /// board needs a resync and no backoff is pending, otherwise the oldest
    /// queued mutation. No-op without an API client.
    fn start_rest(&mut self) {
        if self.rest.is_some() {
            return;
        }
        let Some(api) = self.api.clone() else {
            return;
        };
        let mut client = self.client.borrow_mut();
        let Some(board_id) = client.state().board_id else {
            return;
        };

        if client.state().needs_resync && self.resync_backoff.is_none() {
            tracing::debug!(board_id, "fetching board snapshot");
            let future = async move { RestOutcome::Snapshot(api.fetch_board(board_id).await) };
            self.rest = Some(RestCall { request: None, future: Box::pin(future) });
            return;
        }

        let Some(mutation) = client.next_outbound() else {
            return;
        };
        let request = mutation.request();
        let future = async move {
            let result = api.submit(board_id, &mutation).await;
            RestOutcome::Submitted { request, result }
        };
        self.rest = Some(RestCall { request: Some(request), future: Box::pin(future) });
    }

    fn on_rest(&mut self, outcome: RestOutcome) {
        let mut client = self.client.borrow_mut();
        match outcome {
            RestOutcome::Snapshot(Ok(snapshot)) => {
                self.resync_failures = 0;
                client.load_snapshot(snapshot);
            }
            RestOutcome::Snapshot(Err(e)) => {
                self.resync_failures = self.resync_failures.saturating_add(1);
                let delay = client.connection().policy().delay_for_attempt(self.resync_failures);
                tracing::warn!(
                    failures = self.resync_failures,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "board resync failed; backing off"
                );
                self.resync_backoff = Some(Box::pin(tokio::time::sleep(delay)));
            }
            RestOutcome::Submitted { request, result: Ok(response) } => {
                client.acknowledge(request, response);
            }
            RestOutcome::Submitted { request, result: Err(e) } => {
                tracing::warn!(%request, error = %e, "sticker mutation rejected");
                client.reject(request);
            }
        }
    }

    /// Drop a REST call still running at shutdown. A submission's outcome
    /// is unknown, so the client settles it and flags a resync.
    fn abandon_rest(&mut self) {
        let Some(call) = self.rest.take() else {
            return;
        };
        if let Some(request) = call.request {
            self.client.borrow_mut().abandon(request);
        }
    }
}

async fn handshake(url: String, deadline: Duration) -> Result<Box<Socket>, String> {
    match tokio::time::timeout(deadline, connect_async(url)).await {
        Ok(Ok((socket, _))) => Ok(Box::new(socket)),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("handshake timed out after {}ms", deadline.as_millis())),
    }
}

async fn next_frame(socket: &mut Option<Socket>) -> Option<SocketItem> {
    match socket {
        Some(socket) => socket.next().await,
        None => future::pending().await,
    }
}

async fn next_handshake(handshake: &mut Option<Handshake>) -> Result<Box<Socket>, String> {
    match handshake {
        Some(handshake) => handshake.as_mut().await,
        None => future::pending().await,
    }
}

async fn next_rest(rest: &mut Option<RestCall>) -> RestOutcome {
    match rest {
        Some(call) => call.future.as_mut().await,
        None => future::pending().await,
    }
}

async fn backoff_elapsed(backoff: &mut Option<Pin<Box<Sleep>>>) {
    match backoff {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}

async fn sleep_until_fired(reconnect: &mut Option<(TimerId, Pin<Box<Sleep>>)>) -> TimerId {
    match reconnect {
        Some((timer, sleep)) => {
            sleep.as_mut().await;
            *timer
        }
        None => future::pending().await,
    }
}

async fn next_tick(heartbeat: &mut Option<(TimerId, Interval)>) -> TimerId {
    match heartbeat {
        Some((timer, interval)) => {
            interval.tick().await;
            *timer
        }
        None => future::pending().await,
    }
}
