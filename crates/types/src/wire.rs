// crates/types/src/wire.rs
//! JSON frames exchanged over the job-tracking socket.

use serde::{Deserialize, Serialize};

use crate::job::{Job, JobId};

/// Client → server request.
///
/// Serialized with an `action` tag:
/// `{"action":"fetch_job","job_id":"j1"}`, `{"action":"fetch_stories"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientRequest {
    FetchJob {
        job_id: JobId,
    },
    FetchStories {
        /// Only sent when set, so the plain request stays `{"action":"fetch_stories"}`.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        favorites_only: bool,
    },
}

impl ClientRequest {
    pub fn fetch_job(job_id: impl Into<JobId>) -> Self {
        Self::FetchJob {
            job_id: job_id.into(),
        }
    }

    pub fn fetch_stories(favorites_only: bool) -> Self {
        Self::FetchStories { favorites_only }
    }
}

/// Server → client push.
///
/// Serializes to the wire shape `{"job": {...}}` or `{"jobs": [...]}`.
/// Deserialization is lenient about extra keys; when a frame carries both
/// `job` and `jobs`, the single job wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "RawPush")]
pub enum ServerPush {
    /// Update for one tracked job.
    Job(Job),
    /// Full snapshot of the user's job list.
    Jobs(Vec<Job>),
}

impl ServerPush {
    /// Parse one inbound text frame.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Job(_) => "job",
            Self::Jobs(_) => "jobs",
        }
    }
}

#[derive(Deserialize)]
struct RawPush {
    #[serde(default)]
    job: Option<Job>,
    #[serde(default)]
    jobs: Option<Vec<Job>>,
}

impl TryFrom<RawPush> for ServerPush {
    type Error = &'static str;

    fn try_from(raw: RawPush) -> Result<Self, Self::Error> {
        match (raw.job, raw.jobs) {
            (Some(job), _) => Ok(Self::Job(job)),
            (None, Some(jobs)) => Ok(Self::Jobs(jobs)),
            (None, None) => Err("frame carries neither `job` nor `jobs`"),
        }
    }
}
