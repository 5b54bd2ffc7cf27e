//! Reconnection state for the stream connection loop.
//!
//! [`ReconnectPolicy`] implements the bridge's linear backoff: the first
//! failure waits the initial delay, each consecutive failure adds a fixed
//! increment, the delay is capped, and any successful connection resets the
//! state. With the defaults this yields waits of 1, 3, 5, … seconds up to 30.

use std::time::Duration;

use tracing::debug;

use super::config::ReconnectConfig;

/// Connection loop state, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Attempting the WebSocket handshake.
    Connecting,
    /// Connected and reading frames.
    Connected,
    /// Sleeping out a backoff delay before the next attempt.
    Waiting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Waiting => write!(f, "waiting"),
        }
    }
}

/// Linear-backoff reconnection state.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt: u32,
}

impl ReconnectPolicy {
    /// Creates a policy in its reset state.
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            current_delay,
            attempt: 0,
        }
    }

    /// Returns the consecutive-failure count since the last reset.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Resets the backoff state after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_delay = self.config.initial_delay;
        debug!("connection established, reset backoff state");
    }

    /// Returns the delay to wait before the next attempt and advances the
    /// backoff state: the delay grows by the configured increment on each
    /// consecutive failure, capped at the maximum.
    pub fn next_backoff(&mut self) -> Duration {
        self.attempt += 1;
        let delay = self.current_delay;
        self.current_delay = self
            .current_delay
            .saturating_add(self.config.delay_increment)
            .min(self.config.max_delay);
        delay
    }
}
