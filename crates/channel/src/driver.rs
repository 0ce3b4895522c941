// crates/channel/src/driver.rs
//! Background task that owns one connection lifecycle: connect, pump frames,
//! reconnect on abnormal close, stop on cancellation.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::RetryPolicy;
use crate::machine::{AfterClose, ChannelMachine, CloseKind, ConnectionState};
use crate::snapshot::{publish, ChannelSnapshot};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on finishing a close handshake before the socket is dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) struct Driver {
    endpoint: String,
    generation: u64,
    machine: ChannelMachine,
    state: watch::Sender<ChannelSnapshot>,
    outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
    log_capacity: usize,
    /// Lifecycle this one replaces; it must finish before we connect.
    previous: Option<JoinHandle<()>>,
}

impl Driver {
    pub(crate) fn new(
        endpoint: String,
        generation: u64,
        retry: RetryPolicy,
        log_capacity: usize,
        state: watch::Sender<ChannelSnapshot>,
        outbound: mpsc::UnboundedReceiver<String>,
        cancel: CancellationToken,
        previous: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            endpoint,
            generation,
            machine: ChannelMachine::new(retry),
            state,
            outbound,
            cancel,
            log_capacity,
            previous,
        }
    }

    /// Run until cancelled, cleanly closed, or out of retries.
    pub(crate) async fn run(mut self) {
        // Not raced against our own cancellation: a successor awaits this
        // task, so returning early would let it overlap the older socket.
        if let Some(previous) = self.previous.take() {
            if let Err(e) = previous.await {
                debug!(generation = self.generation, "previous job channel task ended: {e}");
            }
        }

        loop {
            self.machine.on_connecting();
            self.publish_connection();

            let connected = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                result = connect_async(self.endpoint.as_str()) => result,
            };

            let close = match connected {
                Ok((socket, _response)) => {
                    self.machine.on_open();
                    info!(endpoint = %self.endpoint, "job channel connected");
                    self.publish(|s| {
                        s.retries_exhausted = false;
                    });
                    match self.pump(socket).await {
                        Some(kind) => kind,
                        None => return,
                    }
                }
                Err(e) => {
                    self.machine.on_error(&e);
                    CloseKind::Abnormal
                }
            };

            // Once Disconnected is visible no sender can enqueue, so the drain
            // discards everything issued against the dead socket.
            self.publish(|s| s.connection = ConnectionState::Disconnected);
            while self.outbound.try_recv().is_ok() {}

            match self.machine.on_close(close) {
                AfterClose::Reconnect { attempt, delay } => {
                    self.publish_connection();
                    info!(
                        attempt,
                        max_attempts = self.machine.policy().max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "job channel disconnected, reconnecting"
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                AfterClose::Stop => {
                    self.publish_connection();
                    info!(endpoint = %self.endpoint, "job channel closed cleanly");
                    return;
                }
                AfterClose::GiveUp => {
                    self.publish(|s| s.retries_exhausted = true);
                    error!(
                        endpoint = %self.endpoint,
                        max_attempts = self.machine.policy().max_attempts,
                        "job channel giving up after maximum reconnection attempts"
                    );
                    return;
                }
            }
        }
    }

    /// Shuttle frames until the socket closes. `None` means cancelled.
    async fn pump(&mut self, socket: Socket) -> Option<CloseKind> {
        let (mut sink, mut stream) = socket.split();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(endpoint = %self.endpoint, "job channel torn down, closing socket");
                    if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
                        debug!(endpoint = %self.endpoint, "job channel close handshake timed out");
                    }
                    return None;
                }
                Some(text) = self.outbound.recv() => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        self.machine.on_error(&e);
                        return Some(CloseKind::Abnormal);
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(push) = self.machine.on_message(text.as_str()) {
                            debug!(kind = push.kind(), "job channel push");
                            let capacity = self.log_capacity;
                            self.publish(|s| s.apply(push, capacity));
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "job channel received close frame");
                        // Flushes the close reply tungstenite queued for the peer.
                        let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
                        return Some(CloseKind::Clean);
                    }
                    // Pings are answered by tungstenite; binary frames carry nothing for us.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.machine.on_error(&e);
                        return Some(CloseKind::Abnormal);
                    }
                    None => return Some(CloseKind::Abnormal),
                }
            }
        }
    }

    /// Mirror the machine's connection state and retry count.
    fn publish_connection(&self) {
        self.publish(|_| {});
    }

    fn publish(&self, update: impl FnOnce(&mut ChannelSnapshot)) {
        let connection = self.machine.state();
        let retry_count = self.machine.retries();
        let published = publish(&self.state, self.generation, |s| {
            s.connection = connection;
            s.retry_count = retry_count;
            update(s);
        });
        if !published {
            debug!(generation = self.generation, "dropping update from stale job channel");
        }
    }
}
