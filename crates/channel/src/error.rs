// crates/channel/src/error.rs
use thiserror::Error;

/// Errors building a [`crate::ChannelConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidVar {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Socket base must use ws:// or wss://: {0}")]
    InvalidSocketBase(String),
}

/// Errors surfaced by the job channel API.
///
/// Socket failures never show up here: they are absorbed by the reconnect
/// loop and only observable through the connection state.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to serialize outbound payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn invalid_var(
        var: &'static str,
        value: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::InvalidVar {
            var,
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}
