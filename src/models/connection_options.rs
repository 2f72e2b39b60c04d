use serde::{Deserialize, Serialize};

/// Connection-level options for the broadcast WebSocket channel.
///
/// Controls the bounded reconnect policy and the keepalive ping interval.
/// Separate from per-subscription concerns, which live with the
/// subscription lifecycle.
///
/// # Example
///
/// ```rust
/// use resolink::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_max_reconnect_attempts(5)
///     .with_reconnect_delay_ms(2_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Maximum number of reconnection attempts before the broadcast channel
    /// is abandoned and a terminal failure is reported.
    /// Default: 3
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Fixed delay in milliseconds before each reconnection attempt.
    /// Default: 6000 (6 seconds), no backoff growth.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Keepalive Ping interval in milliseconds for idle connections.
    /// Set to 0 to disable. Default: 25000 (25 seconds).
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_delay_ms() -> u64 {
    6_000
}

fn default_keepalive_interval_ms() -> u64 {
    25_000
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
        }
    }
}

impl ConnectionOptions {
    /// Create new connection options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of reconnection attempts.
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the fixed delay before each reconnection attempt (milliseconds).
    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    /// Set the keepalive Ping interval (milliseconds). 0 disables pings.
    pub fn with_keepalive_interval_ms(mut self, interval_ms: u64) -> Self {
        self.keepalive_interval_ms = interval_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reconnect_budget() {
        let options = ConnectionOptions::default();
        assert_eq!(options.max_reconnect_attempts, 3);
        assert_eq!(options.reconnect_delay_ms, 6_000);
    }

    #[test]
    fn fluent_setters() {
        let options = ConnectionOptions::new()
            .with_max_reconnect_attempts(1)
            .with_reconnect_delay_ms(100)
            .with_keepalive_interval_ms(0);
        assert_eq!(options.max_reconnect_attempts, 1);
        assert_eq!(options.reconnect_delay_ms, 100);
        assert_eq!(options.keepalive_interval_ms, 0);
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let options: ConnectionOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.max_reconnect_attempts, 3);
        assert_eq!(options.keepalive_interval_ms, 25_000);
    }
}
