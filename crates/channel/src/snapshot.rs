// crates/channel/src/snapshot.rs
//! Observable channel state and the projections derived from server pushes.

use serde::Serialize;
use thalia_types::{Job, ServerPush};
use tokio::sync::watch;

use crate::machine::ConnectionState;

/// Everything a consumer can observe about a job channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnapshot {
    pub connection: ConnectionState,
    /// Latest single-job push. Independent of `stories`.
    pub current_job: Option<Job>,
    /// Latest full job-list push, replaced wholesale.
    pub stories: Vec<Job>,
    /// Recognized pushes in arrival order, oldest first.
    pub messages: Vec<ServerPush>,
    /// Reconnect attempts since the last successful open.
    pub retry_count: u32,
    /// Set when the retry bound was hit; cleared by the next open.
    pub retries_exhausted: bool,
    /// Connection lifecycle that owns this value. Bumped on teardown.
    #[serde(skip)]
    pub(crate) generation: u64,
}

impl ChannelSnapshot {
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    /// Fold one push into the projections.
    pub fn apply(&mut self, push: ServerPush, log_capacity: usize) {
        match &push {
            ServerPush::Job(job) => self.current_job = Some(job.clone()),
            ServerPush::Jobs(jobs) => self.stories = jobs.clone(),
        }
        if log_capacity == 0 {
            return;
        }
        if self.messages.len() >= log_capacity {
            let overflow = self.messages.len() + 1 - log_capacity;
            self.messages.drain(..overflow);
        }
        self.messages.push(push);
    }

    /// Fresh state for the next connection lifecycle.
    pub(crate) fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = Self {
            generation,
            ..Self::default()
        };
    }
}

/// Apply `update` only if `generation` still owns the snapshot.
///
/// The generation check and the write happen under the watch lock, so a
/// lifecycle that was torn down can never overwrite its successor.
pub(crate) fn publish(
    state: &watch::Sender<ChannelSnapshot>,
    generation: u64,
    update: impl FnOnce(&mut ChannelSnapshot),
) -> bool {
    state.send_if_modified(|snapshot| {
        if snapshot.generation != generation {
            return false;
        }
        update(snapshot);
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use thalia_types::JobStatus;

    fn job(id: &str, status: JobStatus) -> Job {
        Job::new(id, status)
    }

    #[test]
    fn test_job_list_is_replaced_not_merged() {
        let mut snap = ChannelSnapshot::default();
        snap.apply(
            ServerPush::Jobs(vec![job("a", JobStatus::Queued), job("b", JobStatus::Queued)]),
            10,
        );
        snap.apply(ServerPush::Jobs(vec![job("c", JobStatus::Completed)]), 10);
        assert_eq!(snap.stories, vec![job("c", JobStatus::Completed)]);
    }

    #[test]
    fn test_single_job_does_not_touch_list() {
        let mut snap = ChannelSnapshot::default();
        snap.apply(ServerPush::Jobs(vec![job("j1", JobStatus::Queued)]), 10);
        snap.apply(ServerPush::Job(job("j1", JobStatus::Completed)), 10);

        assert_eq!(snap.current_job, Some(job("j1", JobStatus::Completed)));
        assert_eq!(snap.stories[0].status, JobStatus::Queued);
    }

    #[test]
    fn test_job_list_does_not_touch_current_job() {
        let mut snap = ChannelSnapshot::default();
        snap.apply(ServerPush::Job(job("x", JobStatus::Processing)), 10);
        snap.apply(ServerPush::Jobs(vec![]), 10);

        assert_eq!(snap.current_job, Some(job("x", JobStatus::Processing)));
        assert!(snap.stories.is_empty());
    }

    #[test]
    fn test_message_log_is_bounded() {
        let mut snap = ChannelSnapshot::default();
        for i in 0..5 {
            snap.apply(ServerPush::Job(job(&i.to_string(), JobStatus::Queued)), 3);
        }
        let ids: Vec<_> = snap
            .messages
            .iter()
            .map(|m| match m {
                ServerPush::Job(j) => j.job_id.to_string(),
                ServerPush::Jobs(_) => unreachable!(),
            })
            .collect();
        assert_eq!(ids, vec!["2", "3", "4"]);
    }

    #[test]
    fn test_zero_capacity_disables_log() {
        let mut snap = ChannelSnapshot::default();
        snap.apply(ServerPush::Jobs(vec![]), 0);
        assert!(snap.messages.is_empty());
    }

    #[test]
    fn test_reset_bumps_generation_and_clears() {
        let mut snap = ChannelSnapshot::default();
        snap.connection = ConnectionState::Connected;
        snap.apply(ServerPush::Jobs(vec![job("a", JobStatus::Queued)]), 10);
        snap.reset();

        assert_eq!(snap.generation, 1);
        assert!(!snap.is_connected());
        assert!(snap.stories.is_empty());
        assert!(snap.messages.is_empty());
    }

    #[test]
    fn test_stale_generation_cannot_publish() {
        let (tx, rx) = watch::channel(ChannelSnapshot::default());
        assert!(publish(&tx, 0, |s| s.connection = ConnectionState::Connected));

        tx.send_modify(ChannelSnapshot::reset);
        assert!(!publish(&tx, 0, |s| s.connection = ConnectionState::Connected));
        assert!(!rx.borrow().is_connected());

        assert!(publish(&tx, 1, |s| s.retry_count = 2));
        assert_eq!(rx.borrow().retry_count, 2);
    }

    #[test]
    fn test_serializes_for_consumers() {
        let snap = ChannelSnapshot::default();
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["connection"], "disconnected");
        assert_eq!(json["currentJob"], serde_json::Value::Null);
        assert!(json.get("generation").is_none());
    }
}
