//! Reconnecting realtime event channel
//!
//! One background task owns the connection, the outgoing queue and the
//! reconnect timer. Handles talk to it over an mpsc command channel and
//! observe it through a watch channel (connection state) and a broadcast
//! channel (inbound events).
//!
//! Behaviour:
//! - successful connect resets the attempt counter, flushes queued outgoing
//!   events in FIFO order, then reports connected
//! - every disconnect (including a failed first connect) schedules a retry
//!   after `min(max_delay, base_delay * 2^attempts)`, without an attempt cap
//! - events emitted while disconnected are queued (bounded, oldest dropped)
//! - teardown cancels the pending retry; nothing is scheduled afterwards

mod backoff;
pub mod sse;
pub mod transport;

pub use backoff::reconnect_delay;
pub use sse::SseTransport;
pub use transport::{Connection, FrameSink, FrameStream, InboundFrame, OutgoingFrame, Transport};

use crate::error::{SessionError, SessionResult};
use chrono::{DateTime, Utc};
use litra_common::config::ReconnectConfig;
use litra_common::events::ChannelStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Inbound event as delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
    /// Receive time
    pub timestamp: DateTime<Utc>,
}

/// Connection facts published by the channel task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionState {
    pub enabled: bool,
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub queued: usize,
}

impl ConnectionState {
    pub fn status(&self) -> ChannelStatus {
        ChannelStatus::derive(self.enabled, self.connected, self.reconnect_attempts)
    }
}

/// Channel tuning
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_queued_events: usize,
    pub event_capacity: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ChannelOptions {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            max_queued_events: config.max_queued_events.max(1),
            event_capacity: 256,
        }
    }
}

enum ChannelCommand {
    Emit(OutgoingFrame),
}

/// Handle to the realtime channel
pub struct EventChannel {
    cmd_tx: Option<mpsc::UnboundedSender<ChannelCommand>>,
    events_tx: broadcast::Sender<ChannelEvent>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl EventChannel {
    /// Channel that never connects; reports `disabled`
    pub fn disabled() -> Self {
        let (events_tx, _) = broadcast::channel(1);
        let (_, state_rx) = watch::channel(ConnectionState::default());
        Self {
            cmd_tx: None,
            events_tx,
            state_rx,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Start connecting to `url` in the background
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(
        url: impl Into<String>,
        transport: Arc<dyn Transport>,
        options: ChannelOptions,
    ) -> Self {
        let url = url.into();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(options.event_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState {
            enabled: true,
            ..Default::default()
        });
        let cancel = CancellationToken::new();

        let task = ChannelTask {
            url,
            transport,
            options,
            cmd_rx,
            events_tx: events_tx.clone(),
            state_tx,
            queue: VecDeque::new(),
            attempts: 0,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(task.run());

        Self {
            cmd_tx: Some(cmd_tx),
            events_tx,
            state_rx,
            cancel,
            task: Some(handle),
        }
    }

    /// Send an event, or queue it until the next successful connect
    pub fn emit(&self, event_type: impl Into<String>, payload: Value) -> SessionResult<()> {
        let cmd_tx = self
            .cmd_tx
            .as_ref()
            .ok_or_else(|| SessionError::Channel("realtime channel is disabled".to_string()))?;
        cmd_tx
            .send(ChannelCommand::Emit(OutgoingFrame::new(event_type, payload)))
            .map_err(|_| SessionError::Channel("realtime channel is stopped".to_string()))
    }

    /// Receive every inbound event from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events_tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn status(&self) -> ChannelStatus {
        self.state().status()
    }

    pub fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    /// Stop the channel and wait for its task to finish
    pub async fn disconnect(&mut self) {
        self.cancel.cancel();
        self.cmd_tx = None;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Channel task ended abnormally");
            }
        }
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Why a live connection ended
enum Disconnect {
    Lost,
    Shutdown,
}

struct ChannelTask {
    url: String,
    transport: Arc<dyn Transport>,
    options: ChannelOptions,
    cmd_rx: mpsc::UnboundedReceiver<ChannelCommand>,
    events_tx: broadcast::Sender<ChannelEvent>,
    state_tx: watch::Sender<ConnectionState>,
    queue: VecDeque<OutgoingFrame>,
    attempts: u32,
    cancel: CancellationToken,
}

impl ChannelTask {
    async fn run(mut self) {
        info!(url = %self.url, "Realtime channel starting");
        loop {
            let Some(opened) = self.open().await else {
                break;
            };

            match opened {
                Ok(connection) => {
                    info!(url = %self.url, attempts = self.attempts, "Realtime channel connected");
                    self.attempts = 0;
                    if let Disconnect::Shutdown = self.serve(connection).await {
                        break;
                    }
                    warn!(url = %self.url, "Realtime channel disconnected");
                }
                Err(e) => {
                    warn!(
                        url = %self.url,
                        error = %e,
                        attempt = self.attempts,
                        "Realtime channel connect failed"
                    );
                }
            }

            let delay = reconnect_delay(
                self.attempts,
                self.options.base_delay,
                self.options.max_delay,
            );
            self.attempts = self.attempts.saturating_add(1);
            self.publish(false);
            debug!(
                attempt = self.attempts,
                delay_ms = delay.as_millis() as u64,
                "Reconnect scheduled"
            );

            if !self.wait(delay).await {
                break;
            }
        }
        self.publish(false);
        info!(url = %self.url, "Realtime channel stopped");
    }

    /// Open a connection, queueing emits meanwhile; `None` on shutdown
    async fn open(&mut self) -> Option<litra_common::Result<Connection>> {
        let transport = Arc::clone(&self.transport);
        let url = self.url.clone();
        let open = transport.open(&url);
        tokio::pin!(open);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                result = &mut open => return Some(result),
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(ChannelCommand::Emit(frame)) => self.enqueue(frame),
                    None => return None,
                },
            }
        }
    }

    /// Sleep out a reconnect delay, queueing emits meanwhile; false on shutdown
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = &mut sleep => return true,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(ChannelCommand::Emit(frame)) => self.enqueue(frame),
                    None => return false,
                },
            }
        }
    }

    async fn serve(&mut self, connection: Connection) -> Disconnect {
        let Connection { mut sink, mut stream } = connection;

        if let Err(reason) = self.flush(sink.as_mut()).await {
            return reason;
        }
        self.publish(true);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Disconnect::Shutdown,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(ChannelCommand::Emit(frame)) => {
                        match self.send(sink.as_mut(), &frame).await {
                            None => {
                                self.queue.push_front(frame);
                                return Disconnect::Shutdown;
                            }
                            Some(Err(e)) => {
                                warn!(
                                    event_type = %frame.event_type,
                                    error = %e,
                                    "Emit failed, queued for replay"
                                );
                                self.queue.push_front(frame);
                                return Disconnect::Lost;
                            }
                            Some(Ok(())) => {}
                        }
                    }
                    None => return Disconnect::Shutdown,
                },
                inbound = stream.next() => match inbound {
                    Some(Ok(frame)) => self.deliver(frame),
                    Some(Err(e)) => {
                        warn!(error = %e, "Realtime stream error");
                        return Disconnect::Lost;
                    }
                    None => return Disconnect::Lost,
                },
            }
        }
    }

    /// Replay queued events in order; each is removed only once sent
    async fn flush(&mut self, sink: &mut dyn FrameSink) -> Result<(), Disconnect> {
        if !self.queue.is_empty() {
            debug!(queued = self.queue.len(), "Replaying queued events");
        }
        while let Some(frame) = self.queue.front() {
            match self.send(sink, frame).await {
                None => return Err(Disconnect::Shutdown),
                Some(Err(e)) => {
                    warn!(event_type = %frame.event_type, error = %e, "Replay failed");
                    return Err(Disconnect::Lost);
                }
                Some(Ok(())) => {}
            }
            self.queue.pop_front();
        }
        Ok(())
    }

    /// One send, abandoned on shutdown; `None` when cancelled first
    async fn send(
        &self,
        sink: &mut dyn FrameSink,
        frame: &OutgoingFrame,
    ) -> Option<litra_common::Result<()>> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = sink.send(frame) => Some(result),
        }
    }

    fn deliver(&self, frame: InboundFrame) {
        let event = ChannelEvent {
            event_type: frame.event_type,
            payload: frame.payload,
            timestamp: litra_common::time::now(),
        };
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }

    fn enqueue(&mut self, frame: OutgoingFrame) {
        if self.queue.len() >= self.options.max_queued_events {
            if let Some(dropped) = self.queue.pop_front() {
                warn!(
                    event_type = %dropped.event_type,
                    limit = self.options.max_queued_events,
                    "Outgoing queue full, dropping oldest event"
                );
            }
        }
        self.queue.push_back(frame);
        self.publish(false);
    }

    fn publish(&self, connected: bool) {
        let state = ConnectionState {
            enabled: true,
            connected,
            reconnect_attempts: self.attempts,
            queued: self.queue.len(),
        };
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}
