//! Per-project connection records and socket I/O loops.
//!
//! A [`ConnectionRecord`] owns everything attached to one project's
//! channel: the in-flight open, the reader and writer tasks, the
//! heartbeat and staleness timers, and the pending reconnect timer.
//! All of them are bound to the record's [`CancellationToken`], so
//! cancelling it (on drop, or when the record moves to a new phase) is
//! the single teardown path.

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use torgman_core::types::{ProjectId, Timestamp};

use crate::error::ConnectError;
use crate::transport::{FrameSink, FrameStream};

/// Reply slot of a caller waiting on `connect`.
pub(crate) type Waiter = oneshot::Sender<Result<(), ConnectError>>;

/// Lifecycle phase of a record.
pub(crate) enum Phase {
    /// An open is in flight. `retry` marks opens issued by the
    /// reconnection protocol, whose failure counts as another drop.
    Connecting { waiters: Vec<Waiter>, retry: bool },
    /// The channel is open; frames queued on `outbound` go to the socket.
    Open {
        outbound: mpsc::UnboundedSender<String>,
    },
    /// Waiting for the reconnect timer.
    Reconnecting,
}

/// Bookkeeping for one tracked project.
pub(crate) struct ConnectionRecord {
    pub project_id: ProjectId,
    pub url: String,
    /// Tags socket events and timer ticks; bumped on every phase change
    /// so that late signals from a previous phase are ignored.
    pub generation: u64,
    pub phase: Phase,
    pub reconnect_attempts: u32,
    pub last_message_at: Instant,
    pub connected_since: Option<Timestamp>,
    cancel: CancellationToken,
}

impl ConnectionRecord {
    pub fn new(
        project_id: ProjectId,
        url: String,
        generation: u64,
        phase: Phase,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            project_id,
            url,
            generation,
            phase,
            reconnect_attempts: 0,
            last_message_at: Instant::now(),
            connected_since: None,
            cancel,
        }
    }

    /// Token the current phase's tasks must observe.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the channel is open and its writer is still running.
    pub fn is_open(&self) -> bool {
        matches!(&self.phase, Phase::Open { outbound } if !outbound.is_closed())
    }

    /// Queue a frame if the channel is open; otherwise drop it.
    pub fn send(&self, frame: String) -> bool {
        match &self.phase {
            Phase::Open { outbound } => outbound.send(frame).is_ok(),
            _ => false,
        }
    }

    /// Cancel every task of the current phase and switch to `phase`
    /// under a fresh token and generation.
    pub fn rearm(&mut self, parent: &CancellationToken, generation: u64, phase: Phase) {
        self.cancel.cancel();
        self.cancel = parent.child_token();
        self.generation = generation;
        self.phase = phase;
    }
}

impl Drop for ConnectionRecord {
    fn drop(&mut self) {
        // Waiters still held in `phase` are dropped with the record.
        self.cancel.cancel();
    }
}

/// Signals delivered from socket tasks to the manager task.
#[derive(Debug)]
pub(crate) enum SocketEvent {
    Frame {
        project_id: ProjectId,
        generation: u64,
        text: String,
    },
    Closed {
        project_id: ProjectId,
        generation: u64,
        reason: Option<String>,
    },
}

/// Forward queued frames to the socket until the queue closes, a send
/// fails, or the token is cancelled. The socket is closed on exit.
///
/// A failed send is reported as a [`SocketEvent::Closed`] so the channel
/// enters the reconnection protocol even while the read side still hangs.
pub(crate) async fn write_frames(
    project_id: ProjectId,
    generation: u64,
    mut sink: FrameSink,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<SocketEvent>,
    cancel: CancellationToken,
) {
    let failure = loop {
        tokio::select! {
            _ = cancel.cancelled() => break None,
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(text).await {
                        tracing::warn!(project_id = %project_id, error = %e, "Failed to write frame");
                        break Some(e.to_string());
                    }
                }
                None => break None,
            },
        }
    };

    if let Err(e) = sink.close().await {
        tracing::debug!(project_id = %project_id, error = %e, "Error while closing socket");
    }

    if let Some(reason) = failure {
        let _ = events.send(SocketEvent::Closed {
            project_id,
            generation,
            reason: Some(reason),
        });
    }
}

/// Read frames from the socket and forward them to the manager task.
///
/// Ends with a [`SocketEvent::Closed`] when the stream ends or errors.
/// Cancellation ends the loop silently: the record is already gone.
pub(crate) async fn read_frames(
    project_id: ProjectId,
    generation: u64,
    mut stream: FrameStream,
    events: mpsc::UnboundedSender<SocketEvent>,
    cancel: CancellationToken,
) {
    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            frame = stream.next() => match frame {
                Some(Ok(text)) => {
                    let event = SocketEvent::Frame {
                        project_id: project_id.clone(),
                        generation,
                        text,
                    };
                    if events.send(event).is_err() {
                        return;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(project_id = %project_id, error = %e, "Socket receive error");
                    break Some(e.to_string());
                }
                None => break None,
            },
        }
    };

    let _ = events.send(SocketEvent::Closed {
        project_id,
        generation,
        reason,
    });
}
