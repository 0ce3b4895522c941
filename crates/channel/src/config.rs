// crates/channel/src/config.rs
//! Job channel configuration.

use std::time::Duration;

use crate::error::ConfigError;
use crate::session::SessionId;

/// Socket base used when `THALIA_WS_URL` is unset.
pub const DEFAULT_SOCKET_BASE: &str = "ws://localhost:8000/ws";

/// Topic path the story library subscribes to.
pub const DEFAULT_TOPIC: &str = "/jobs/";

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_MESSAGE_LOG_CAPACITY: usize = 50;

/// Bounded, fixed-delay reconnection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Reconnect attempts allowed after consecutive abnormal closes.
    pub max_attempts: u32,
    /// Wait before each reconnect attempt.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Configuration for a [`crate::JobChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// THALIA_WS_URL (e.g. wss://api.example.com/ws).
    pub socket_base: String,
    pub retry: RetryPolicy,
    /// Recognized pushes kept in the message log before the oldest is dropped.
    pub message_log_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            socket_base: DEFAULT_SOCKET_BASE.to_string(),
            retry: RetryPolicy::default(),
            message_log_capacity: DEFAULT_MESSAGE_LOG_CAPACITY,
        }
    }
}

impl ChannelConfig {
    pub fn new(socket_base: impl Into<String>) -> Result<Self, ConfigError> {
        let socket_base = socket_base.into();
        if !(socket_base.starts_with("ws://") || socket_base.starts_with("wss://")) {
            return Err(ConfigError::InvalidSocketBase(socket_base));
        }
        Ok(Self {
            socket_base,
            ..Self::default()
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Read configuration from the process environment.
    ///
    /// - `THALIA_WS_URL`: socket base (default `ws://localhost:8000/ws`)
    /// - `THALIA_RECONNECT_DELAY_MS`: fixed reconnect delay (default 5000)
    /// - `THALIA_MAX_RECONNECT_ATTEMPTS`: retry bound (default 5)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`Self::from_env`] with an arbitrary variable source.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let socket_base = lookup("THALIA_WS_URL").unwrap_or_else(|| DEFAULT_SOCKET_BASE.into());
        let mut config = Self::new(socket_base)?;

        if let Some(raw) = lookup("THALIA_RECONNECT_DELAY_MS") {
            let millis: u64 = raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid_var("THALIA_RECONNECT_DELAY_MS", &raw, e))?;
            config.retry.delay = Duration::from_millis(millis);
        }
        if let Some(raw) = lookup("THALIA_MAX_RECONNECT_ATTEMPTS") {
            config.retry.max_attempts = raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid_var("THALIA_MAX_RECONNECT_ATTEMPTS", &raw, e))?;
        }
        Ok(config)
    }

    /// Socket endpoint for one user on one topic:
    /// `<socket base><topic path><user id>/`.
    pub fn endpoint(&self, topic: &str, session: &SessionId) -> String {
        format!(
            "{}{}{}/",
            self.socket_base,
            topic,
            urlencoding::encode(session.as_str())
        )
    }
}
