//! Liveness loops for open project channels.
//!
//! Each open channel runs two timers, both bound to the channel's
//! [`CancellationToken`]:
//!
//! - the heartbeat, which pushes a [`ClientFrame::Ping`] into the
//!   channel's outbound queue every `heartbeat_interval` and stops on
//!   its own once the queue is closed;
//! - the staleness monitor, which every `stale_check_interval` asks the
//!   manager task to compare the last-message time against the
//!   threshold.
//!
//! What happens to a stale channel is decided by a [`StalePolicy`].

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use torgman_core::types::ProjectId;

use crate::messages::ClientFrame;

/// Response to a channel that has gone quiet for too long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleAction {
    /// Tear the channel down and open a fresh one.
    Reconnect,
    /// Log and leave the channel alone.
    Ignore,
}

/// Decides how to treat a stale channel.
pub trait StalePolicy: Send + Sync + 'static {
    fn on_stale(&self, project_id: &str, is_active: bool) -> StaleAction;
}

/// Force a reconnect for the active project only.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActiveOnly;

impl StalePolicy for ActiveOnly {
    fn on_stale(&self, _project_id: &str, is_active: bool) -> StaleAction {
        if is_active {
            StaleAction::Reconnect
        } else {
            StaleAction::Ignore
        }
    }
}

impl<F> StalePolicy for F
where
    F: Fn(&str, bool) -> StaleAction + Send + Sync + 'static,
{
    fn on_stale(&self, project_id: &str, is_active: bool) -> StaleAction {
        self(project_id, is_active)
    }
}

/// Whether `last_message_at` is further back than `threshold`.
pub fn is_stale(last_message_at: Instant, now: Instant, threshold: Duration) -> bool {
    now.saturating_duration_since(last_message_at) > threshold
}

/// Spawn the heartbeat loop for one open channel.
///
/// `ping` is the encoded keep-alive frame. The first ping goes out one
/// full `period` after the channel opens.
pub(crate) fn spawn_heartbeat(
    project_id: ProjectId,
    ping: String,
    outbound: mpsc::UnboundedSender<String>,
    period: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if outbound.send(ping.clone()).is_err() {
                        tracing::debug!(project_id = %project_id, "Channel closed, heartbeat stopping");
                        break;
                    }
                    tracing::trace!(project_id = %project_id, "Heartbeat ping queued");
                }
            }
        }
    })
}

/// Encode the keep-alive frame for a project.
pub(crate) fn encode_ping(project_id: &str) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ClientFrame::ping(project_id))
}

/// Spawn the staleness monitor for one open channel.
///
/// `on_tick` is invoked on every check; it forwards the check to the
/// manager task, which owns the last-message timestamp. The loop ends
/// when `on_tick` returns `false` or the token is cancelled.
pub(crate) fn spawn_stale_monitor<F>(
    period: Duration,
    cancel: CancellationToken,
    mut on_tick: F,
) -> tokio::task::JoinHandle<()>
where
    F: FnMut() -> bool + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !on_tick() {
                        break;
                    }
                }
            }
        }
    })
}
