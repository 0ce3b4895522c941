// crates/channel/src/session.rs
//! Session identity supplied by the authentication layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Authenticated user id. Opaque to the channel beyond its use in the
/// endpoint path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self(user_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Publishing side of a session provider.
///
/// The auth layer owns one of these and calls [`SessionSource::set`] on
/// login and logout; channels follow it through [`SessionSource::subscribe`].
#[derive(Debug)]
pub struct SessionSource {
    tx: watch::Sender<Option<SessionId>>,
}

impl SessionSource {
    pub fn new(initial: Option<SessionId>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Replace the current identity. Subscribers are only woken on change.
    pub fn set(&self, session: Option<SessionId>) {
        self.tx.send_if_modified(|current| {
            if *current == session {
                return false;
            }
            *current = session;
            true
        });
    }

    pub fn current(&self) -> Option<SessionId> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SessionId>> {
        self.tx.subscribe()
    }
}

impl Default for SessionSource {
    fn default() -> Self {
        Self::new(None)
    }
}
