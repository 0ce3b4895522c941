// crates/types/src/job.rs
//! Story-generation job records as pushed by the backend.

use std::fmt;

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Backend record identifier.
///
/// The backend emits ids either as strings or as integers depending on the
/// model; both normalize to the string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

pub type JobId = RecordId;
pub type StoryId = RecordId;

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for RecordId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Unsigned(n) => Self(n.to_string()),
            Raw::Signed(n) => Self(n.to_string()),
        })
    }
}

/// Status of a story-generation job.
///
/// The backend reports intermediate stages as `generating-<stage>` (or
/// `generating_<stage>`); those keep their raw string so the stage name
/// survives. Statuses this client does not know are preserved in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Queued,
    Processing,
    Generating(String),
    Completed,
    Failed,
    Other(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Generating(raw) | Self::Other(raw) => raw,
        }
    }

    /// Stage name of a `generating-*` status, if any.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Generating(raw) => Some(
                raw.trim_start_matches("generating")
                    .trim_start_matches(['-', '_']),
            ),
            _ => None,
        }
    }

    /// True once the backend will not update the job again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// True while the job waits in the queue or is being worked on.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Queued | Self::Processing | Self::Generating(_))
    }
}

impl From<String> for JobStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "queued" => Self::Queued,
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            s if s.starts_with("generating") => Self::Generating(raw),
            _ => Self::Other(raw),
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Generating(raw) | JobStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a job was created, as the backend reported it.
///
/// Most models emit RFC 3339 strings; some emit Unix epoch numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Text(String),
    Epoch(serde_json::Number),
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Epoch(n) => write!(f, "{n}"),
        }
    }
}

/// One asynchronous story-creation task.
///
/// Jobs are never patched locally: every push carries the full record and
/// replaces whatever the client held for that id.
///
/// Only `job_id` (or `id`) and `status` are required. A known field whose
/// value has an unexpected shape is kept verbatim in `extra` instead of
/// failing the record, and so is every field this client does not model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub job_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub status: JobStatus,
    /// Place in the generation queue while `status` is `queued`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    /// Story payload once the job completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_id: Option<StoryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorited: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Job {
    /// Minimal job with the given id and status; remaining fields empty.
    pub fn new(job_id: impl Into<JobId>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            title: None,
            status,
            position: None,
            result: None,
            story_id: None,
            description: None,
            favorited: None,
            created_at: None,
            extra: Map::new(),
        }
    }

    /// Display title; empty while the backend has not named the story yet.
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    pub fn is_favorited(&self) -> bool {
        self.favorited.unwrap_or(false)
    }
}

impl<'de> Deserialize<'de> for Job {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;

        let id_key = if fields.contains_key("job_id") { "job_id" } else { "id" };
        let job_id = take(&mut fields, id_key)
            .ok_or_else(|| <D::Error as de::Error>::missing_field("job_id"))?;
        let status = take(&mut fields, "status")
            .ok_or_else(|| <D::Error as de::Error>::missing_field("status"))?;

        Ok(Self {
            job_id,
            status,
            title: take(&mut fields, "title"),
            position: take(&mut fields, "position"),
            result: take(&mut fields, "result"),
            story_id: take(&mut fields, "story_id"),
            description: take(&mut fields, "description"),
            favorited: take(&mut fields, "favorited"),
            created_at: take(&mut fields, "created_at"),
            extra: fields,
        })
    }
}

/// Remove and decode `key`. Null counts as absent; a value that does not
/// decode as `T` is put back so it lands in `Job::extra`.
fn take<T: DeserializeOwned>(fields: &mut Map<String, Value>, key: &str) -> Option<T> {
    let value = fields.remove(key)?;
    if value.is_null() {
        return None;
    }
    match T::deserialize(&value) {
        Ok(decoded) => Some(decoded),
        Err(_) => {
            fields.insert(key.to_owned(), value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_known_values() {
        for (raw, expected) in [
            ("queued", JobStatus::Queued),
            ("processing", JobStatus::Processing),
            ("completed", JobStatus::Completed),
            ("failed", JobStatus::Failed),
        ] {
            let parsed: JobStatus = serde_json::from_value(serde_json::json!(raw)).unwrap();
            assert_eq!(parsed, expected);
            assert_eq!(serde_json::to_value(&parsed).unwrap(), serde_json::json!(raw));
        }
    }

    #[test]
    fn test_status_generating_keeps_stage() {
        let status: JobStatus = serde_json::from_str("\"generating-audio\"").unwrap();
        assert_eq!(status, JobStatus::Generating("generating-audio".into()));
        assert_eq!(status.stage(), Some("audio"));
        assert!(status.is_in_progress());
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"generating-audio\"");

        let underscored = JobStatus::from("generating_text".to_string());
        assert_eq!(underscored.stage(), Some("text"));
    }

    #[test]
    fn test_status_unknown_is_preserved() {
        let status = JobStatus::from("cancelled".to_string());
        assert_eq!(status, JobStatus::Other("cancelled".into()));
        assert!(!status.is_terminal());
        assert!(!status.is_in_progress());
        assert_eq!(status.to_string(), "cancelled");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }

    #[test]
    fn test_job_accepts_numeric_and_aliased_ids() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "id": 17,
            "title": "The Brave Fox",
            "status": "queued",
            "position": 3,
            "story_id": 9,
        }))
        .unwrap();
        assert_eq!(job.job_id.as_str(), "17");
        assert_eq!(job.story_id, Some(RecordId::from("9")));
        assert_eq!(job.position, Some(3));
        assert_eq!(job.title(), "The Brave Fox");
    }

    #[test]
    fn test_job_list_item_fields() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "job_id": "j1",
            "title": "Moon Garden",
            "status": "completed",
            "description": "A quiet night story",
            "created_at": "2025-03-01T20:15:00Z",
            "favorited": true,
            "unknown_field": [1, 2, 3],
        }))
        .unwrap();
        assert!(job.is_favorited());
        assert_eq!(job.description.as_deref(), Some("A quiet night story"));
        assert_eq!(
            job.created_at,
            Some(Timestamp::Text("2025-03-01T20:15:00Z".into()))
        );
        assert_eq!(job.extra.get("unknown_field"), Some(&serde_json::json!([1, 2, 3])));
    }

    #[test]
    fn test_job_null_title_and_numeric_timestamp() {
        let job: Job = serde_json::from_str(
            r#"{"job_id":"j2","title":null,"status":"queued","created_at":1714000000,"position":-1}"#,
        )
        .unwrap();
        assert_eq!(job.title, None);
        assert_eq!(job.title(), "");
        assert_eq!(job.created_at.as_ref().map(ToString::to_string).as_deref(), Some("1714000000"));
        assert_eq!(job.position, Some(-1));
        assert!(job.extra.is_empty());
    }

    #[test]
    fn test_job_keeps_unmodelled_and_misshapen_fields() {
        let raw = serde_json::json!({
            "job_id": "j1",
            "status": "generating-audio",
            "progress": 42,
            "voice": "v1",
            "favorited": "yes",
            "position": 1.5,
        });
        let job: Job = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(job.favorited, None);
        assert_eq!(job.position, None);
        assert_eq!(job.extra.len(), 4);
        assert_eq!(serde_json::to_value(&job).unwrap(), raw);
    }

    #[test]
    fn test_job_requires_id_and_status() {
        assert!(serde_json::from_str::<Job>(r#"{"status":"queued"}"#).is_err());
        assert!(serde_json::from_str::<Job>(r#"{"job_id":"j1"}"#).is_err());
    }

    #[test]
    fn test_job_serialize_skips_empty_optionals() {
        let job = Job::new("j2", JobStatus::Processing);
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"job_id": "j2", "status": "processing"})
        );
    }
}
