//! Broadcast transport: the single WebSocket connection for a session.
//!
//! A background task owns the stream and feeds decoded change messages to
//! the [`Dispatcher`]. Connection loss triggers a bounded reconnect: a
//! fixed delay before each attempt, a counted budget, and a terminal
//! failure notification once the budget is spent. Explicit teardown
//! cancels any scheduled reconnect immediately.

use std::future::Future;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use tokio_tungstenite::tungstenite::{error::Error as WsError, protocol::Message};
use url::Url;

use crate::dispatcher::Dispatcher;
use crate::error::{ResolinkError, Result};
use crate::event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
use crate::models::{ChangeMessage, ConnectionOptions};

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;

/// Maximum accepted text frame size (16 MiB); larger frames are skipped.
const MAX_TEXT_MESSAGE_BYTES: usize = 16 << 20;

/// Sleep target far enough away to be effectively "never".
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Lifecycle states of the broadcast connection.
///
/// `Disconnected` is both the initial state and the terminal one reached
/// by explicit teardown or by exhausting the reconnect budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none pending.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The channel is open; frames are being processed.
    Connected,
    /// The connection dropped; a retry is scheduled.
    Reconnecting,
}

/// Counted retry budget with a fixed delay between attempts.
///
/// Kept separate from the connection loop so the policy itself is directly
/// unit-testable.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    delay: Duration,
    attempts_used: u32,
}

impl ReconnectPolicy {
    /// Budget of `max_attempts` retries, each preceded by `delay`.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            attempts_used: 0,
        }
    }

    /// Delay to wait before the next attempt, or `None` once the budget is
    /// exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts_used >= self.max_attempts {
            return None;
        }
        self.attempts_used += 1;
        Some(self.delay)
    }

    /// Restore the full budget after a successful connection.
    pub fn reset(&mut self) {
        self.attempts_used = 0;
    }

    /// Attempts consumed since the last reset.
    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }
}

/// Derive the broadcast WebSocket URL from the HTTP base URL.
///
/// `http(s)` maps to `ws(s)`; the session id becomes the path component
/// and the broadcast-subscription marker the query.
fn resolve_ws_url(base_url: &str, session_id: &str) -> Result<String> {
    let base = Url::parse(base_url.trim()).map_err(|e| {
        ResolinkError::ConfigurationError(format!("Invalid base_url '{}': {}", base_url, e))
    })?;

    if base.host_str().is_none() {
        return Err(ResolinkError::ConfigurationError(
            "base_url must include a host".to_string(),
        ));
    }

    let ws_scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ResolinkError::ConfigurationError(format!(
                "Unsupported base_url scheme '{}'; expected http(s) or ws(s)",
                other
            )));
        },
    };

    let mut ws_url = base;
    ws_url.set_scheme(ws_scheme).map_err(|_| {
        ResolinkError::ConfigurationError("Failed to set WebSocket URL scheme".to_string())
    })?;
    ws_url.set_fragment(None);
    ws_url.set_path(&format!("/ws/v2/{}", session_id));
    ws_url.set_query(Some("subscribe-broadcast"));

    Ok(ws_url.to_string())
}

/// Connection establishment seam for the broadcast client.
///
/// The production implementation dials the server with `tokio-tungstenite`;
/// tests substitute scripted connectors to drive the retry state machine
/// under a fake clock.
pub trait BroadcastConnector: Send + 'static {
    /// Frame stream produced by a successful attempt.
    type Stream: Stream<Item = std::result::Result<Message, WsError>>
        + Sink<Message, Error = WsError>
        + Send
        + Unpin;

    /// Attempt to open the broadcast channel.
    fn connect(&mut self) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// Dials the broadcast endpoint over TCP/TLS.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// Connector for an already-resolved WebSocket URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl BroadcastConnector for WsConnector {
    type Stream = WsStream;

    fn connect(&mut self) -> impl Future<Output = Result<WsStream>> + Send {
        let url = self.url.clone();
        async move {
            let (stream, _response) = tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| ResolinkError::WebSocketError(format!("Connection failed: {}", e)))?;
            Ok(stream)
        }
    }
}

/// Commands from the public handle to the connection task.
enum TransportCmd {
    Shutdown,
}

/// Public handle to the session's broadcast connection.
///
/// Owns a background task that runs the connection state machine; dropping
/// the handle (or calling [`shutdown`](Self::shutdown)) tears the task
/// down, cancelling any scheduled reconnect.
pub struct BroadcastClient {
    cmd_tx: mpsc::Sender<TransportCmd>,
    state_rx: watch::Receiver<ConnectionState>,
    _task: JoinHandle<()>,
}

impl BroadcastClient {
    /// Open the broadcast channel for `session_id` against `base_url`.
    ///
    /// Incoming change messages are routed through `dispatcher`.
    pub fn start(
        base_url: &str,
        session_id: &str,
        dispatcher: Dispatcher,
        options: ConnectionOptions,
        event_handlers: EventHandlers,
    ) -> Result<Self> {
        let url = resolve_ws_url(base_url, session_id)?;
        log::debug!("Starting broadcast channel at {}", url);
        Ok(Self::start_with_connector(
            WsConnector::new(url),
            dispatcher,
            options,
            event_handlers,
        ))
    }

    /// Start the connection task over a custom connector.
    ///
    /// This is the seam the reconnect tests use; production code goes
    /// through [`start`](Self::start).
    pub fn start_with_connector<C: BroadcastConnector>(
        connector: C,
        dispatcher: Dispatcher,
        options: ConnectionOptions,
        event_handlers: EventHandlers,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        // Start in Connecting so a caller observing the state immediately
        // after start cannot mistake the initial value for the terminal
        // Disconnected state.
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let task = tokio::spawn(connection_task(
            connector,
            cmd_rx,
            state_tx,
            dispatcher,
            options,
            event_handlers,
        ));
        Self {
            cmd_tx,
            state_rx,
            _task: task,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Whether the channel is currently open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Tear the connection down.
    ///
    /// Cancels any scheduled reconnect immediately; no further attempts
    /// occur after this returns. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(TransportCmd::Shutdown).await;
    }

    /// Wait until the connection task reaches the terminal `Disconnected`
    /// state (explicit teardown or reconnect budget spent).
    pub async fn wait_disconnected(&mut self) {
        loop {
            if *self.state_rx.borrow_and_update() == ConnectionState::Disconnected {
                return;
            }
            if self.state_rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Drop for BroadcastClient {
    fn drop(&mut self) {
        // Best-effort teardown signal.
        let _ = self.cmd_tx.try_send(TransportCmd::Shutdown);
    }
}

/// Why the connected loop exited.
enum ConnectedExit {
    /// Explicit teardown; the task must stop.
    Shutdown,
    /// The connection dropped; the task should try to reconnect.
    Lost,
}

/// Process frames and commands while the channel is open.
async fn run_connected<S>(
    ws: &mut S,
    cmd_rx: &mut mpsc::Receiver<TransportCmd>,
    dispatcher: &Dispatcher,
    keepalive: Option<Duration>,
    event_handlers: &EventHandlers,
) -> ConnectedExit
where
    S: Stream<Item = std::result::Result<Message, WsError>>
        + Sink<Message, Error = WsError>
        + Unpin,
{
    let keepalive_dur = keepalive.unwrap_or(FAR_FUTURE);
    let has_keepalive = keepalive.is_some();
    let mut idle_deadline = TokioInstant::now() + keepalive_dur;

    loop {
        let idle_sleep = tokio::time::sleep_until(idle_deadline);
        tokio::pin!(idle_sleep);

        tokio::select! {
            biased;

            // Highest priority: explicit teardown (or the handle is gone).
            _ = cmd_rx.recv() => {
                let _ = ws.send(Message::Close(None)).await;
                let _ = ws.close().await;
                event_handlers.emit_disconnect(DisconnectReason::with_code(
                    "Broadcast channel closed by client",
                    1000,
                ));
                return ConnectedExit::Shutdown;
            }

            // Keepalive ping when the channel has been idle.
            _ = &mut idle_sleep, if has_keepalive => {
                if let Err(e) = ws.send(Message::Ping(Vec::new())).await {
                    log::warn!("Keepalive ping failed: {}", e);
                    event_handlers.emit_disconnect(DisconnectReason::new(format!(
                        "Keepalive ping failed: {}",
                        e
                    )));
                    return ConnectedExit::Lost;
                }
                idle_deadline = TokioInstant::now() + keepalive_dur;
            }

            frame = ws.next() => {
                idle_deadline = TokioInstant::now() + keepalive_dur;
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_TEXT_MESSAGE_BYTES {
                            log::warn!("Skipping oversized frame ({} bytes)", text.len());
                            continue;
                        }
                        event_handlers.emit_receive(&text);
                        // Parse failures are per-message: the connection
                        // stays up.
                        match serde_json::from_str::<ChangeMessage>(&text) {
                            Ok(message) => dispatcher.route(&message),
                            Err(e) => {
                                log::warn!("Discarding unparseable broadcast frame: {}", e);
                            },
                        }
                    },
                    Some(Ok(Message::Binary(data))) => {
                        log::warn!(
                            "Skipping unexpected binary frame ({} bytes); broadcast protocol is JSON text",
                            data.len()
                        );
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = ws.send(Message::Pong(payload)).await;
                    },
                    Some(Ok(Message::Pong(_) | Message::Frame(_))) => {},
                    Some(Ok(Message::Close(frame))) => {
                        let reason = match frame {
                            Some(f) => DisconnectReason::with_code(f.reason.to_string(), f.code.into()),
                            None => DisconnectReason::new("Server closed connection"),
                        };
                        event_handlers.emit_disconnect(reason);
                        return ConnectedExit::Lost;
                    },
                    Some(Err(e)) => {
                        let msg = e.to_string();
                        event_handlers.emit_error(ConnectionError::new(&msg, true));
                        event_handlers.emit_disconnect(DisconnectReason::new(format!(
                            "WebSocket error: {}",
                            msg
                        )));
                        return ConnectedExit::Lost;
                    },
                    None => {
                        event_handlers.emit_disconnect(DisconnectReason::new("WebSocket stream ended"));
                        return ConnectedExit::Lost;
                    },
                }
            }
        }
    }
}

/// The connection state machine, run by the background task.
///
/// `Connecting` on start; on any connection loss, `Reconnecting` with the
/// bounded fixed-delay retry; terminal `Disconnected` on teardown or
/// budget exhaustion.
async fn connection_task<C: BroadcastConnector>(
    mut connector: C,
    mut cmd_rx: mpsc::Receiver<TransportCmd>,
    state_tx: watch::Sender<ConnectionState>,
    dispatcher: Dispatcher,
    options: ConnectionOptions,
    event_handlers: EventHandlers,
) {
    let mut policy = ReconnectPolicy::new(
        options.max_reconnect_attempts,
        Duration::from_millis(options.reconnect_delay_ms),
    );
    let keepalive = if options.keepalive_interval_ms == 0 {
        None
    } else {
        Some(Duration::from_millis(options.keepalive_interval_ms))
    };

    let _ = state_tx.send(ConnectionState::Connecting);
    let mut stream = match connector.connect().await {
        Ok(s) => {
            let _ = state_tx.send(ConnectionState::Connected);
            event_handlers.emit_connect();
            log::info!("Broadcast channel established");
            Some(s)
        },
        Err(e) => {
            log::warn!("Broadcast connection failed: {}", e);
            event_handlers.emit_error(ConnectionError::new(format!("Connection failed: {}", e), true));
            None
        },
    };

    loop {
        if let Some(ref mut ws) = stream {
            match run_connected(ws, &mut cmd_rx, &dispatcher, keepalive, &event_handlers).await {
                ConnectedExit::Shutdown => {
                    let _ = state_tx.send(ConnectionState::Disconnected);
                    return;
                },
                ConnectedExit::Lost => {
                    stream = None;
                },
            }
        } else {
            let Some(delay) = policy.next_delay() else {
                log::warn!(
                    "Reconnect budget exhausted after {} attempt(s); giving up on live updates",
                    policy.attempts_used()
                );
                event_handlers.emit_error(ConnectionError::new(
                    format!(
                        "Live updates unavailable: reconnect budget exhausted after {} attempt(s)",
                        policy.attempts_used()
                    ),
                    false,
                ));
                let _ = state_tx.send(ConnectionState::Disconnected);
                return;
            };

            let _ = state_tx.send(ConnectionState::Reconnecting);
            log::info!(
                "Reconnecting in {:?} (attempt {} of {})",
                delay,
                policy.attempts_used(),
                options.max_reconnect_attempts
            );

            tokio::select! {
                biased;

                // Teardown during the wait cancels the scheduled attempt.
                _ = cmd_rx.recv() => {
                    log::debug!("Teardown during reconnect wait");
                    let _ = state_tx.send(ConnectionState::Disconnected);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let _ = state_tx.send(ConnectionState::Connecting);
            match connector.connect().await {
                Ok(s) => {
                    policy.reset();
                    let _ = state_tx.send(ConnectionState::Connected);
                    event_handlers.emit_connect();
                    log::info!("Broadcast channel re-established");
                    stream = Some(s);
                },
                Err(e) => {
                    log::warn!("Reconnect attempt {} failed: {}", policy.attempts_used(), e);
                    event_handlers.emit_error(ConnectionError::new(
                        format!("Connection failed: {}", e),
                        true,
                    ));
                },
            }
        }
    }
}
