// crates/types/src/lib.rs
//! Shared types for the Thalia job-tracking socket.
//!
//! `job` holds the records the backend pushes; `wire` holds the frames
//! exchanged in both directions.

pub mod job;
pub mod wire;

pub use job::{Job, JobId, JobStatus, RecordId, StoryId, Timestamp};
pub use wire::{ClientRequest, ServerPush};
