// crates/channel/src/lib.rs
//! Real-time job tracking for Thalia story generation.
//!
//! [`JobChannel`] keeps one WebSocket open per signed-in user and topic,
//! folds the server's `job` / `jobs` pushes into a [`ChannelSnapshot`], and
//! reconnects with a bounded, fixed-delay [`RetryPolicy`].

pub mod channel;
pub mod config;
mod driver;
pub mod error;
pub mod machine;
pub mod session;
pub mod snapshot;

pub use channel::JobChannel;
pub use config::{ChannelConfig, RetryPolicy, DEFAULT_SOCKET_BASE, DEFAULT_TOPIC};
pub use error::{ChannelError, ConfigError};
pub use machine::ConnectionState;
pub use session::{SessionId, SessionSource};
pub use snapshot::ChannelSnapshot;

pub use thalia_types::{ClientRequest, Job, JobId, JobStatus, ServerPush};
