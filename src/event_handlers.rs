//! Lifecycle event hooks for the broadcast connection.
//!
//! Callback-based monitoring of the WebSocket channel:
//!
//! - [`on_connect`](EventHandlers::on_connect): channel established
//! - [`on_disconnect`](EventHandlers::on_disconnect): channel closed
//! - [`on_error`](EventHandlers::on_error): connection or protocol errors,
//!   including the terminal notification when the reconnect budget is
//!   exhausted
//! - [`on_receive`](EventHandlers::on_receive): debug hook for every raw
//!   inbound frame
//!
//! All handlers are optional and `Send + Sync`, registered builder-style.

use std::fmt;
use std::sync::Arc;

/// Reason for a disconnect event.
#[derive(Debug, Clone)]
pub struct DisconnectReason {
    /// Human-readable description of why the channel closed.
    pub message: String,
    /// WebSocket close code, if one was received or sent.
    pub code: Option<u16>,
}

impl DisconnectReason {
    /// Build a reason without a close code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Build a reason with a close code.
    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code: {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Error information passed to the `on_error` handler.
#[derive(Debug, Clone)]
pub struct ConnectionError {
    /// Human-readable error message.
    pub message: String,
    /// Whether recovery is still possible. `false` marks the terminal
    /// failure after the reconnect budget is spent: live updates are gone
    /// for this session, though HTTP requests keep working.
    pub recoverable: bool,
}

impl ConnectionError {
    /// Build a connection error.
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;
type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;
type OnErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;
type OnReceiveCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Optional lifecycle callbacks for the broadcast connection.
#[derive(Clone, Default)]
pub struct EventHandlers {
    on_connect: Option<OnConnectCallback>,
    on_disconnect: Option<OnDisconnectCallback>,
    on_error: Option<OnErrorCallback>,
    on_receive: Option<OnReceiveCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create an empty set of handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for when the broadcast channel is established.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Register a callback for when the broadcast channel closes.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Register a callback for connection and protocol errors.
    ///
    /// Check [`ConnectionError::recoverable`]: a non-recoverable error
    /// means the client has given up on live updates for this session.
    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Register a debug hook receiving every raw inbound frame before
    /// parsing. Not needed for normal operation.
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive = Some(Arc::new(f));
        self
    }

    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.on_connect {
            cb();
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(reason);
        }
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    pub(crate) fn emit_receive(&self, raw: &str) {
        if let Some(cb) = &self.on_receive {
            cb(raw);
        }
    }
}
