// crates/channel/src/channel.rs
//! Consumer-facing handle for the job-tracking socket.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thalia_types::{ClientRequest, Job, JobId, ServerPush};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ChannelConfig;
use crate::driver::Driver;
use crate::error::ChannelError;
use crate::session::SessionId;
use crate::snapshot::ChannelSnapshot;

/// Tracks story-generation jobs for one user over one topic path.
///
/// The channel connects as soon as it has a session identity, reconnects on
/// abnormal closes within the configured [`crate::RetryPolicy`], and exposes
/// what the server pushed as a [`ChannelSnapshot`]. Nothing socket-related is
/// ever returned as an error: consumers watch the snapshot instead.
///
/// Must be created and used inside a tokio runtime. Dropping the channel
/// tears the connection down.
pub struct JobChannel {
    shared: Arc<Shared>,
}

struct Shared {
    config: ChannelConfig,
    state: watch::Sender<ChannelSnapshot>,
    inner: Mutex<Inner>,
}

struct Inner {
    session: Option<SessionId>,
    topic: String,
    active: Option<ActiveConnection>,
    /// Cancelled task still closing its socket while no session is set.
    retiring: Option<JoinHandle<()>>,
    session_follower: Option<JoinHandle<()>>,
}

/// The one live connection lifecycle, if any.
struct ActiveConnection {
    cancel: CancellationToken,
    outbound: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl JobChannel {
    /// A channel on `topic` with no session yet. Call [`Self::reconfigure`]
    /// or [`Self::bind_session`] to connect.
    pub fn new(config: ChannelConfig, topic: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ChannelSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                config,
                state,
                inner: Mutex::new(Inner {
                    session: None,
                    topic: topic.into(),
                    active: None,
                    retiring: None,
                    session_follower: None,
                }),
            }),
        }
    }

    /// Point the channel at a (possibly absent) user and a topic.
    ///
    /// Nothing happens when both match the current parameters. Otherwise the
    /// current connection is torn down, projections are cleared, and a new
    /// connection starts if `session` is present.
    pub fn reconfigure(&self, session: Option<SessionId>, topic: impl Into<String>) {
        self.shared.reconfigure(session, topic.into());
    }

    /// Follow a session provider: connect, rebuild, or disconnect whenever the
    /// identity changes. Replaces any previously bound provider.
    pub fn bind_session(&self, mut sessions: watch::Receiver<Option<SessionId>>) {
        let initial = sessions.borrow_and_update().clone();
        self.shared.reconfigure_session(initial);

        let shared = Arc::clone(&self.shared);
        let follower = tokio::spawn(async move {
            while sessions.changed().await.is_ok() {
                let session = sessions.borrow_and_update().clone();
                shared.reconfigure_session(session);
            }
            debug!("session provider closed, job channel keeps its last identity");
        });

        if let Some(previous) = self.shared.lock().session_follower.replace(follower) {
            previous.abort();
        }
    }

    /// Start a fresh connection lifecycle with the current parameters, e.g.
    /// after the retry bound was exhausted. No-op without a session.
    pub fn reconnect(&self) {
        let mut inner = self.shared.lock();
        let previous = self.shared.teardown(&mut inner);
        self.shared.start(&mut inner, previous);
    }

    /// Tear the connection down, wait for the socket task to finish, and
    /// clear all projections. The channel can be reconfigured afterwards.
    pub async fn shutdown(&self) {
        let (task, follower) = {
            let mut inner = self.shared.lock();
            let task = self.shared.teardown(&mut inner);
            (task, inner.session_follower.take())
        };
        if let Some(follower) = follower {
            follower.abort();
        }
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("job channel task failed: {e}");
                }
            }
        }
    }

    /// Serialize `payload` and send it. Silently dropped unless connected.
    ///
    /// Only fails when `payload` cannot be serialized.
    pub fn send_message<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), ChannelError> {
        let text = serde_json::to_string(payload)?;
        self.shared.send_text(text);
        Ok(())
    }

    /// Ask the server for the latest state of one job.
    pub fn track_job(&self, job_id: impl Into<JobId>) {
        self.send_request(ClientRequest::fetch_job(job_id));
    }

    /// Ask the server for a fresh job-list snapshot.
    pub fn fetch_stories(&self, favorites_only: bool) {
        self.send_request(ClientRequest::fetch_stories(favorites_only));
    }

    pub fn clear_current_job(&self) {
        self.shared.state.send_if_modified(|s| s.current_job.take().is_some());
    }

    pub fn clear_messages(&self) {
        self.shared.state.send_if_modified(|s| {
            let had_messages = !s.messages.is_empty();
            s.messages.clear();
            had_messages
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelSnapshot> {
        self.shared.state.subscribe()
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        self.shared.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.borrow().is_connected()
    }

    pub fn current_job(&self) -> Option<Job> {
        self.shared.state.borrow().current_job.clone()
    }

    pub fn stories(&self) -> Vec<Job> {
        self.shared.state.borrow().stories.clone()
    }

    pub fn messages(&self) -> Vec<ServerPush> {
        self.shared.state.borrow().messages.clone()
    }

    pub fn session(&self) -> Option<SessionId> {
        self.shared.lock().session.clone()
    }

    pub fn topic(&self) -> String {
        self.shared.lock().topic.clone()
    }

    fn send_request(&self, request: ClientRequest) {
        match serde_json::to_string(&request) {
            Ok(text) => self.shared.send_text(text),
            Err(e) => error!(?request, "failed to serialize job channel request: {e}"),
        }
    }
}

impl Drop for JobChannel {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        if let Some(follower) = inner.session_follower.take() {
            follower.abort();
        }
        self.shared.teardown(&mut inner);
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            error!("job channel lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn reconfigure_session(&self, session: Option<SessionId>) {
        let topic = self.lock().topic.clone();
        self.reconfigure(session, topic);
    }

    fn reconfigure(&self, session: Option<SessionId>, topic: String) {
        let mut inner = self.lock();
        if inner.session == session && inner.topic == topic {
            debug!(topic = %topic, "job channel parameters unchanged");
            return;
        }
        let previous = self.teardown(&mut inner);
        inner.session = session;
        inner.topic = topic;
        self.start(&mut inner, previous);
    }

    /// Cancel the live connection (if any) and invalidate everything it
    /// could still publish. Returns its task so callers may await it.
    fn teardown(&self, inner: &mut Inner) -> Option<JoinHandle<()>> {
        let active = inner.active.take();
        if let Some(active) = &active {
            active.cancel.cancel();
        }
        self.state.send_modify(ChannelSnapshot::reset);
        active.map(|a| a.task).or_else(|| inner.retiring.take())
    }

    /// Spawn a driver for the current parameters. It waits for `previous`
    /// to finish before its first connection attempt.
    fn start(&self, inner: &mut Inner, previous: Option<JoinHandle<()>>) {
        let Some(session) = inner.session.as_ref() else {
            debug!(topic = %inner.topic, "no session, job channel stays disconnected");
            inner.retiring = previous;
            return;
        };

        let endpoint = self.config.endpoint(&inner.topic, session);
        let generation = self.state.borrow().generation;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        info!(%endpoint, user = %session, "starting job channel");
        let driver = Driver::new(
            endpoint,
            generation,
            self.config.retry,
            self.config.message_log_capacity,
            self.state.clone(),
            outbound_rx,
            cancel.clone(),
            previous,
        );
        let task = tokio::spawn(driver.run());

        inner.active = Some(ActiveConnection {
            cancel,
            outbound,
            task,
        });
    }

    fn send_text(&self, text: String) {
        let Some(outbound) = self.lock().active.as_ref().map(|a| a.outbound.clone()) else {
            debug!("no active job channel, dropping outbound message");
            return;
        };
        // Held across the send: the driver cannot publish Disconnected (and
        // drain its queue) between the check and the enqueue.
        let state = self.state.borrow();
        if !state.is_connected() {
            debug!("job channel disconnected, dropping outbound message");
            return;
        }
        if outbound.send(text).is_err() {
            debug!("job channel task gone, dropping outbound message");
        }
    }
}
