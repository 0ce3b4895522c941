// crates/channel/src/machine.rs
//! Connection lifecycle state machine.
//!
//! The driver feeds socket events into [`ChannelMachine`] through the four
//! transition functions (`on_open`, `on_message`, `on_close`, `on_error`) and
//! acts on what they return. Keeping the rules here means retry accounting
//! can be tested without a socket.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thalia_types::ServerPush;
use tracing::{debug, warn};

use crate::config::RetryPolicy;

/// Socket connection state as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// A close handshake took place (either side sent a close frame).
    Clean,
    /// The transport dropped or the connection never opened.
    Abnormal,
}

/// What the driver should do after a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterClose {
    /// Wait `delay`, then connect again. `attempt` is 1-based.
    Reconnect { attempt: u32, delay: Duration },
    /// Clean close: stay disconnected.
    Stop,
    /// Abnormal close with no retries left: stay disconnected for good.
    GiveUp,
}

#[derive(Debug)]
pub struct ChannelMachine {
    state: ConnectionState,
    retries: u32,
    policy: RetryPolicy,
}

impl ChannelMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retries: 0,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnect attempts made since the last successful open.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// A connection attempt is starting.
    pub fn on_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    pub fn on_open(&mut self) {
        self.state = ConnectionState::Connected;
        self.retries = 0;
    }

    /// Decode one inbound text frame. Frames that are not a job push are
    /// dropped here and never reach the projections.
    pub fn on_message(&self, text: &str) -> Option<ServerPush> {
        match ServerPush::from_json(text) {
            Ok(push) => Some(push),
            Err(e) => {
                debug!(error = %e, len = text.len(), "ignoring unrecognized frame");
                None
            }
        }
    }

    pub fn on_close(&mut self, kind: CloseKind) -> AfterClose {
        self.state = ConnectionState::Disconnected;
        match kind {
            CloseKind::Clean => AfterClose::Stop,
            CloseKind::Abnormal if self.retries < self.policy.max_attempts => {
                self.retries += 1;
                AfterClose::Reconnect {
                    attempt: self.retries,
                    delay: self.policy.delay,
                }
            }
            CloseKind::Abnormal => AfterClose::GiveUp,
        }
    }

    /// Socket-level error. Reported only; the close that follows drives state.
    pub fn on_error(&self, error: &dyn fmt::Display) {
        warn!(state = ?self.state, retries = self.retries, "job channel socket error: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn machine() -> ChannelMachine {
        ChannelMachine::new(RetryPolicy::default())
    }

    #[test]
    fn test_open_sets_connected() {
        let mut m = machine();
        m.on_connecting();
        assert_eq!(m.state(), ConnectionState::Connecting);
        m.on_open();
        assert_eq!(m.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_retry_bound_without_open() {
        let mut m = machine();
        let mut reconnects = 0;
        for _ in 0..8 {
            m.on_connecting();
            match m.on_close(CloseKind::Abnormal) {
                AfterClose::Reconnect { attempt, delay } => {
                    reconnects += 1;
                    assert_eq!(attempt, reconnects);
                    assert_eq!(delay, Duration::from_secs(5));
                }
                AfterClose::GiveUp => {}
                AfterClose::Stop => panic!("abnormal close must not stop"),
            }
        }
        assert_eq!(reconnects, 5);
        assert_eq!(m.on_close(CloseKind::Abnormal), AfterClose::GiveUp);
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_fewer_failures_than_bound() {
        let mut m = machine();
        for expected in 1..=3 {
            assert!(matches!(
                m.on_close(CloseKind::Abnormal),
                AfterClose::Reconnect { attempt, .. } if attempt == expected
            ));
        }
        assert_eq!(m.retries(), 3);
    }

    #[test]
    fn test_open_resets_retry_counter() {
        let mut m = machine();
        for _ in 0..4 {
            m.on_close(CloseKind::Abnormal);
        }
        assert_eq!(m.retries(), 4);

        m.on_open();
        assert_eq!(m.retries(), 0);

        let mut reconnects = 0;
        while let AfterClose::Reconnect { .. } = m.on_close(CloseKind::Abnormal) {
            reconnects += 1;
        }
        assert_eq!(reconnects, 5);
    }

    #[test]
    fn test_clean_close_stops() {
        let mut m = machine();
        m.on_open();
        assert_eq!(m.on_close(CloseKind::Clean), AfterClose::Stop);
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(m.retries(), 0);
    }

    #[test]
    fn test_error_does_not_transition() {
        let mut m = machine();
        m.on_open();
        m.on_error(&"connection reset");
        assert_eq!(m.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_zero_attempt_policy_gives_up_immediately() {
        let mut m = ChannelMachine::new(RetryPolicy {
            max_attempts: 0,
            delay: Duration::from_millis(1),
        });
        assert_eq!(m.on_close(CloseKind::Abnormal), AfterClose::GiveUp);
    }

    #[test]
    fn test_on_message_routes_known_shapes() {
        let m = machine();
        assert!(matches!(
            m.on_message(r#"{"job":{"job_id":"j1","status":"queued"}}"#),
            Some(ServerPush::Job(_))
        ));
        assert!(matches!(
            m.on_message(r#"{"jobs":[]}"#),
            Some(ServerPush::Jobs(_))
        ));
        assert!(m.on_message(r#"{"type":"heartbeat"}"#).is_none());
        assert!(m.on_message("garbage").is_none());
    }
}
