//! Multi-project connection manager.
//!
//! [`ConnectionManager`] keeps one WebSocket channel per tracked
//! project, dispatches decoded [`ServerEvent`]s to registered
//! listeners, and recovers dropped channels. It runs in one of two
//! overlapping modes:
//!
//! - ambient: [`ensure_project_connections`](ConnectionManager::ensure_project_connections)
//!   keeps a whole set of projects connected (project lists, status
//!   badges);
//! - focused: [`set_active_project`](ConnectionManager::set_active_project)
//!   marks the project being edited, whose channel alone is forcibly
//!   reconnected when it goes stale.
//!
//! All state lives on a single spawned task. The handle only sends
//! commands to it, so the connection map and listener registry are
//! mutated in one place, one event at a time, without locks. Create
//! the manager once per application context and clone the handle into
//! whatever needs it.

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use torgman_core::types::{ProjectId, Timestamp};
use torgman_core::ws_url::ws_url_for_project;

use crate::config::RealtimeConfig;
use crate::connection::{
    read_frames, write_frames, ConnectionRecord, Phase, SocketEvent, Waiter,
};
use crate::error::{ConnectError, SendError};
use crate::heartbeat::{
    encode_ping, is_stale, spawn_heartbeat, spawn_stale_monitor, ActiveOnly, StaleAction,
    StalePolicy,
};
use crate::listeners::{Listener, ListenerKey, ListenerRegistry};
use crate::messages::{parse_event, EventType, ServerEvent};
use crate::reconnect::ReconnectStep;
use crate::transport::{Channel, Transport, TransportError};

/// Public view of a record's lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Reconnecting,
}

/// Point-in-time diagnostics for one tracked project.
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub project_id: ProjectId,
    pub phase: ConnectionPhase,
    /// Consecutive failed reconnection attempts; zero while open.
    pub reconnect_attempts: u32,
    /// When the current channel opened, if it is open.
    pub connected_since: Option<Timestamp>,
    pub is_active: bool,
}

/// Handle to the connection manager task.
///
/// Cheap to clone. The task stops when [`shutdown`](Self::shutdown) is
/// called or every handle has been dropped.
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
}

enum Command {
    Connect {
        project_id: ProjectId,
        reply: Waiter,
    },
    Disconnect {
        project_id: ProjectId,
    },
    DisconnectAll,
    SetActive {
        project_id: ProjectId,
    },
    ClearActive,
    Reconcile {
        desired: HashSet<ProjectId>,
        reply: oneshot::Sender<Vec<ProjectId>>,
    },
    AddListener {
        key: ListenerKey,
        listener: Listener,
    },
    RemoveListener {
        key: ListenerKey,
        listener: Listener,
    },
    Send {
        target: SendTarget,
        frame: String,
    },
    IsConnected {
        project_id: ProjectId,
        reply: oneshot::Sender<bool>,
    },
    IsActiveConnected {
        reply: oneshot::Sender<bool>,
    },
    ConnectedProjects {
        reply: oneshot::Sender<Vec<ProjectId>>,
    },
    ActiveProject {
        reply: oneshot::Sender<Option<ProjectId>>,
    },
    Snapshot {
        project_id: ProjectId,
        reply: oneshot::Sender<Option<ConnectionSnapshot>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

enum SendTarget {
    Project(ProjectId),
    Active,
}

/// Signals from open attempts and timers back to the manager task.
enum Signal {
    Opened {
        project_id: ProjectId,
        generation: u64,
        result: Result<Channel, TransportError>,
    },
    StaleCheck {
        project_id: ProjectId,
        generation: u64,
    },
    ReconnectDue {
        project_id: ProjectId,
        generation: u64,
    },
}

impl ConnectionManager {
    /// Spawn the manager task with the default stale policy
    /// ([`ActiveOnly`]).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: RealtimeConfig, transport: Arc<dyn Transport>) -> Self {
        Self::start_with_policy(config, transport, Arc::new(ActiveOnly))
    }

    /// Spawn the manager task with a custom stale policy.
    pub fn start_with_policy(
        config: RealtimeConfig,
        transport: Arc<dyn Transport>,
        policy: Arc<dyn StalePolicy>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (socket_tx, socket_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let worker = Worker {
            config,
            transport,
            policy,
            connections: HashMap::new(),
            listeners: ListenerRegistry::new(),
            active_project: None,
            next_generation: 0,
            socket_tx,
            signal_tx,
            cancel: CancellationToken::new(),
        };
        tokio::spawn(worker.run(command_rx, socket_rx, signal_rx));

        Self { commands }
    }

    /// Ensure a channel to `project_id` is open.
    ///
    /// Resolves immediately if it already is. Concurrent calls for a
    /// project whose channel is still opening share that single open
    /// attempt. A failure to open is reported here and is not retried.
    pub async fn connect(&self, project_id: impl Into<ProjectId>) -> Result<(), ConnectError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Connect {
                project_id: project_id.into(),
                reply,
            })
            .map_err(|_| ConnectError::ManagerStopped)?;

        match rx.await {
            Ok(result) => result,
            Err(_) if self.commands.is_closed() => Err(ConnectError::ManagerStopped),
            Err(_) => Err(ConnectError::Superseded),
        }
    }

    /// Close a project's channel without reconnecting. No-op if the
    /// project is not tracked.
    pub fn disconnect(&self, project_id: &str) {
        self.command(Command::Disconnect {
            project_id: project_id.to_string(),
        });
    }

    /// Close every channel, drop all listeners and clear the active
    /// project.
    pub fn disconnect_all(&self) {
        self.command(Command::DisconnectAll);
    }

    /// Return the manager to its initial state. Same as
    /// [`disconnect_all`](Self::disconnect_all).
    pub fn reset(&self) {
        self.disconnect_all();
    }

    /// Focus on one project, dropping the previously active project's
    /// channel, then connect to it.
    pub async fn set_active_project(
        &self,
        project_id: impl Into<ProjectId>,
    ) -> Result<(), ConnectError> {
        let project_id = project_id.into();
        self.commands
            .send(Command::SetActive {
                project_id: project_id.clone(),
            })
            .map_err(|_| ConnectError::ManagerStopped)?;
        self.connect(project_id).await
    }

    /// Leave focused mode: disconnect the active project and drop every
    /// listener. No-op when no project is active.
    pub fn clear_active_project(&self) {
        self.command(Command::ClearActive);
    }

    /// Reconcile tracked channels with `project_ids`.
    ///
    /// Channels for projects outside the set (other than the active
    /// project) are closed; projects in the set without an open channel
    /// are connected concurrently. Individual failures are logged and
    /// left for the next reconciliation.
    pub async fn ensure_project_connections<I, S>(&self, project_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<ProjectId>,
    {
        let desired: HashSet<ProjectId> = project_ids.into_iter().map(Into::into).collect();
        let Some(missing) = self
            .query(|reply| Command::Reconcile { desired, reply })
            .await
        else {
            return;
        };

        let attempts = missing.into_iter().map(|project_id| async move {
            let result = self.connect(project_id.clone()).await;
            (project_id, result)
        });

        for (project_id, result) in futures::future::join_all(attempts).await {
            if let Err(e) = result {
                tracing::warn!(
                    project_id = %project_id,
                    error = %e,
                    "Project connection failed, will retry on next reconciliation",
                );
            }
        }
    }

    /// Register `listener` under `key`.
    pub fn add_event_listener(&self, key: ListenerKey, listener: Listener) {
        self.command(Command::AddListener { key, listener });
    }

    /// Remove one registration of `listener` under `key`, if present.
    pub fn remove_event_listener(&self, key: ListenerKey, listener: &Listener) {
        self.command(Command::RemoveListener {
            key,
            listener: Arc::clone(listener),
        });
    }

    /// Serialise `payload` and send it on the project's channel.
    ///
    /// Dropped silently unless the channel is open.
    pub fn send_message<T: Serialize>(&self, project_id: &str, payload: &T) -> Result<(), SendError> {
        let frame = serde_json::to_string(payload)?;
        self.commands
            .send(Command::Send {
                target: SendTarget::Project(project_id.to_string()),
                frame,
            })
            .map_err(|_| SendError::ManagerStopped)
    }

    /// Send on the active project's channel, if any is active and open.
    pub fn send_to_active_project<T: Serialize>(&self, payload: &T) -> Result<(), SendError> {
        let frame = serde_json::to_string(payload)?;
        self.commands
            .send(Command::Send {
                target: SendTarget::Active,
                frame,
            })
            .map_err(|_| SendError::ManagerStopped)
    }

    pub async fn is_connected(&self, project_id: &str) -> bool {
        let project_id = project_id.to_string();
        self.query(|reply| Command::IsConnected { project_id, reply })
            .await
            .unwrap_or(false)
    }

    pub async fn is_active_project_connected(&self) -> bool {
        self.query(|reply| Command::IsActiveConnected { reply })
            .await
            .unwrap_or(false)
    }

    /// Projects whose channel is currently open, sorted.
    pub async fn connected_projects(&self) -> Vec<ProjectId> {
        self.query(|reply| Command::ConnectedProjects { reply })
            .await
            .unwrap_or_default()
    }

    pub async fn active_project_id(&self) -> Option<ProjectId> {
        self.query(|reply| Command::ActiveProject { reply })
            .await
            .flatten()
    }

    /// Diagnostics for a tracked project; `None` if it is not tracked.
    pub async fn connection_snapshot(&self, project_id: &str) -> Option<ConnectionSnapshot> {
        let project_id = project_id.to_string();
        self.query(|reply| Command::Snapshot { project_id, reply })
            .await
            .flatten()
    }

    /// Close every channel and stop the manager task.
    pub async fn shutdown(&self) {
        let _ = self.query(|reply| Command::Shutdown { reply }).await;
    }

    // ---- private helpers ----

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Connection manager stopped, command ignored");
        }
    }

    async fn query<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(build(reply)).ok()?;
        rx.await.ok()
    }
}

/// State owned by the manager task.
struct Worker {
    config: RealtimeConfig,
    transport: Arc<dyn Transport>,
    policy: Arc<dyn StalePolicy>,
    connections: HashMap<ProjectId, ConnectionRecord>,
    listeners: ListenerRegistry,
    active_project: Option<ProjectId>,
    next_generation: u64,
    socket_tx: mpsc::UnboundedSender<SocketEvent>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    /// Parent of every record token; cancelled when the task exits.
    cancel: CancellationToken,
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut socket_rx: mpsc::UnboundedReceiver<SocketEvent>,
        mut signal_rx: mpsc::UnboundedReceiver<Signal>,
    ) {
        tracing::debug!("Connection manager started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).is_break() {
                            break;
                        }
                    }
                    None => break,
                },
                Some(event) = socket_rx.recv() => self.handle_socket_event(event),
                Some(signal) = signal_rx.recv() => self.handle_signal(signal),
            }
        }

        self.stop();
        tracing::debug!("Connection manager stopped");
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Connect { project_id, reply } => self.connect(project_id, reply),
            Command::Disconnect { project_id } => self.disconnect(&project_id),
            Command::DisconnectAll => {
                self.close_all();
                self.listeners.clear();
                self.active_project = None;
            }
            Command::SetActive { project_id } => self.set_active(project_id),
            Command::ClearActive => {
                if let Some(previous) = self.active_project.take() {
                    tracing::info!(project_id = %previous, "Leaving active project");
                    self.disconnect(&previous);
                    self.listeners.clear();
                }
            }
            Command::Reconcile { desired, reply } => {
                let _ = reply.send(self.reconcile(desired));
            }
            Command::AddListener { key, listener } => self.listeners.add(key, listener),
            Command::RemoveListener { key, listener } => {
                self.listeners.remove(&key, &listener);
            }
            Command::Send { target, frame } => self.send(target, frame),
            Command::IsConnected { project_id, reply } => {
                let _ = reply.send(self.is_open(&project_id));
            }
            Command::IsActiveConnected { reply } => {
                let open = self
                    .active_project
                    .as_deref()
                    .is_some_and(|id| self.is_open(id));
                let _ = reply.send(open);
            }
            Command::ConnectedProjects { reply } => {
                let mut open: Vec<ProjectId> = self
                    .connections
                    .values()
                    .filter(|r| r.is_open())
                    .map(|r| r.project_id.clone())
                    .collect();
                open.sort();
                let _ = reply.send(open);
            }
            Command::ActiveProject { reply } => {
                let _ = reply.send(self.active_project.clone());
            }
            Command::Snapshot { project_id, reply } => {
                let _ = reply.send(self.snapshot(&project_id));
            }
            Command::Shutdown { reply } => {
                self.stop();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Frame {
                project_id,
                generation,
                text,
            } => self.on_frame(&project_id, generation, &text),
            SocketEvent::Closed {
                project_id,
                generation,
                reason,
            } => {
                if !self.is_current(&project_id, generation) {
                    return;
                }
                tracing::warn!(
                    project_id = %project_id,
                    reason = reason.as_deref().unwrap_or("closed by peer"),
                    "Project channel closed unexpectedly",
                );
                self.schedule_reconnect(&project_id);
            }
        }
    }

    fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Opened {
                project_id,
                generation,
                result,
            } => {
                if !self.is_current(&project_id, generation) {
                    tracing::debug!(project_id = %project_id, "Discarding open result for superseded record");
                    return;
                }
                match result {
                    Ok(channel) => self.activate(&project_id, channel),
                    Err(error) => self.on_open_failed(&project_id, error),
                }
            }
            Signal::StaleCheck {
                project_id,
                generation,
            } => {
                if self.is_current(&project_id, generation) {
                    self.check_stale(&project_id);
                }
            }
            Signal::ReconnectDue {
                project_id,
                generation,
            } => {
                if self.is_current(&project_id, generation) {
                    self.reopen(&project_id, false);
                }
            }
        }
    }

    // ---- lifecycle ----

    fn connect(&mut self, project_id: ProjectId, reply: Waiter) {
        let url = match ws_url_for_project(&self.config.api_url, &self.config.ws_path, &project_id)
        {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(project_id = %project_id, error = %e, "Cannot build channel URL");
                let _ = reply.send(Err(e.into()));
                return;
            }
        };

        let replace = match self.connections.get_mut(&project_id) {
            Some(record) if record.is_open() => {
                let _ = reply.send(Ok(()));
                return;
            }
            Some(record) => match &mut record.phase {
                Phase::Connecting { waiters, .. } => {
                    waiters.push(reply);
                    return;
                }
                _ => true,
            },
            None => false,
        };

        if replace {
            tracing::debug!(project_id = %project_id, "Replacing non-open connection record");
            self.connections.remove(&project_id);
        }

        let generation = self.bump_generation();
        let record = ConnectionRecord::new(
            project_id.clone(),
            url,
            generation,
            Phase::Connecting {
                waiters: vec![reply],
                retry: false,
            },
            self.cancel.child_token(),
        );
        spawn_open(&self.transport, &self.signal_tx, &record);
        self.connections.insert(project_id, record);
    }

    fn disconnect(&mut self, project_id: &str) {
        if self.connections.remove(project_id).is_some() {
            tracing::info!(project_id, "Project channel disconnected");
        }
    }

    /// Fail pending `connect` callers with `ManagerStopped`, then close
    /// every channel. Idempotent.
    fn stop(&mut self) {
        for record in self.connections.values_mut() {
            if let Phase::Connecting { waiters, .. } = &mut record.phase {
                for waiter in waiters.drain(..) {
                    let _ = waiter.send(Err(ConnectError::ManagerStopped));
                }
            }
        }
        self.close_all();
        self.cancel.cancel();
    }

    fn close_all(&mut self) {
        let count = self.connections.len() as u64;
        self.connections.clear();
        if count > 0 {
            tracing::info!(count, "Closed all project channels");
        }
    }

    fn set_active(&mut self, project_id: ProjectId) {
        if let Some(previous) = self.active_project.take() {
            if previous != project_id {
                tracing::info!(previous = %previous, next = %project_id, "Switching active project");
                self.disconnect(&previous);
            }
        }
        self.active_project = Some(project_id);
    }

    /// Close channels outside `desired` (sparing the active project) and
    /// return the desired projects that still need a `connect`.
    fn reconcile(&mut self, desired: HashSet<ProjectId>) -> Vec<ProjectId> {
        let unwanted: Vec<ProjectId> = self
            .connections
            .keys()
            .filter(|id| !desired.contains(*id) && self.active_project.as_ref() != Some(*id))
            .cloned()
            .collect();
        for project_id in &unwanted {
            self.disconnect(project_id);
        }

        let mut missing: Vec<ProjectId> = desired
            .into_iter()
            .filter(|id| !self.is_open(id))
            .collect();
        missing.sort();
        missing
    }

    /// The open attempt resolved successfully: start I/O and timers.
    fn activate(&mut self, project_id: &str, channel: Channel) {
        let generation = self.bump_generation();
        let Some(record) = self.connections.get_mut(project_id) else {
            return;
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let previous = std::mem::replace(&mut record.phase, Phase::Reconnecting);
        record.rearm(
            &self.cancel,
            generation,
            Phase::Open {
                outbound: outbound_tx.clone(),
            },
        );
        record.reconnect_attempts = 0;
        record.last_message_at = Instant::now();
        record.connected_since = Some(chrono::Utc::now());

        let cancel = record.cancel_token().clone();
        let Channel { sink, stream } = channel;

        tokio::spawn(write_frames(
            project_id.to_string(),
            generation,
            sink,
            outbound_rx,
            self.socket_tx.clone(),
            cancel.clone(),
        ));
        tokio::spawn(read_frames(
            project_id.to_string(),
            generation,
            stream,
            self.socket_tx.clone(),
            cancel.clone(),
        ));
        match encode_ping(project_id) {
            Ok(ping) => {
                spawn_heartbeat(
                    project_id.to_string(),
                    ping,
                    outbound_tx,
                    self.config.heartbeat_interval,
                    cancel.clone(),
                );
            }
            Err(e) => {
                tracing::error!(project_id, error = %e, "Failed to encode heartbeat ping, heartbeat disabled");
            }
        }
        let signals = self.signal_tx.clone();
        let stale_project = project_id.to_string();
        spawn_stale_monitor(self.config.stale_check_interval, cancel, move || {
            signals
                .send(Signal::StaleCheck {
                    project_id: stale_project.clone(),
                    generation,
                })
                .is_ok()
        });

        tracing::info!(project_id, "Project channel open");

        if let Phase::Connecting { waiters, .. } = previous {
            for waiter in waiters {
                let _ = waiter.send(Ok(()));
            }
        }
    }

    /// The socket failed before opening.
    fn on_open_failed(&mut self, project_id: &str, error: TransportError) {
        let Some(record) = self.connections.get_mut(project_id) else {
            return;
        };
        let Phase::Connecting { waiters, retry } =
            std::mem::replace(&mut record.phase, Phase::Reconnecting)
        else {
            return;
        };

        for waiter in waiters {
            let _ = waiter.send(Err(ConnectError::Transport(error.clone())));
        }

        if retry {
            tracing::warn!(
                project_id,
                attempt = record.reconnect_attempts,
                error = %error,
                "Reconnect attempt failed",
            );
            self.schedule_reconnect(project_id);
        } else {
            tracing::warn!(project_id, error = %error, "Failed to open project channel");
            self.connections.remove(project_id);
        }
    }

    /// Apply the reconnection protocol after an unexpected drop.
    fn schedule_reconnect(&mut self, project_id: &str) {
        let generation = self.bump_generation();
        let Some(record) = self.connections.get_mut(project_id) else {
            return;
        };

        record.reconnect_attempts += 1;
        let attempt = record.reconnect_attempts;

        match self.config.reconnect.next_step(attempt) {
            ReconnectStep::GiveUp => {
                tracing::error!(
                    project_id,
                    max_attempts = self.config.reconnect.max_attempts,
                    "Reconnection attempts exhausted, abandoning channel",
                );
                self.connections.remove(project_id);
            }
            ReconnectStep::Retry(delay) => {
                record.rearm(&self.cancel, generation, Phase::Reconnecting);
                record.connected_since = None;

                tracing::info!(
                    project_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Reconnect scheduled",
                );

                let cancel = record.cancel_token().clone();
                let signals = self.signal_tx.clone();
                let project_id = project_id.to_string();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {
                            let _ = signals.send(Signal::ReconnectDue { project_id, generation });
                        }
                    }
                });
            }
        }
    }

    /// Open a fresh channel for an existing record.
    ///
    /// `fresh` resets the attempt counter (forced reconnect); otherwise
    /// the counter carries over from the reconnection protocol.
    fn reopen(&mut self, project_id: &str, fresh: bool) {
        let generation = self.bump_generation();
        let Some(record) = self.connections.get_mut(project_id) else {
            return;
        };
        if fresh {
            record.reconnect_attempts = 0;
        }
        record.connected_since = None;
        record.rearm(
            &self.cancel,
            generation,
            Phase::Connecting {
                waiters: Vec::new(),
                retry: true,
            },
        );
        spawn_open(&self.transport, &self.signal_tx, record);
    }

    fn check_stale(&mut self, project_id: &str) {
        let Some(record) = self.connections.get(project_id) else {
            return;
        };
        // A dead writer still counts: a hung reader never reports the drop.
        if !matches!(record.phase, Phase::Open { .. }) {
            return;
        }

        let now = Instant::now();
        if !is_stale(record.last_message_at, now, self.config.stale_threshold) {
            return;
        }

        let silent_secs = now.duration_since(record.last_message_at).as_secs();
        let is_active = self.active_project.as_deref() == Some(project_id);

        match self.policy.on_stale(project_id, is_active) {
            StaleAction::Reconnect => {
                tracing::warn!(project_id, silent_secs, is_active, "Channel stale, forcing reconnect");
                self.reopen(project_id, true);
            }
            StaleAction::Ignore => {
                tracing::warn!(project_id, silent_secs, is_active, "Channel stale");
            }
        }
    }

    // ---- messaging ----

    fn on_frame(&mut self, project_id: &str, generation: u64, text: &str) {
        let Some(record) = self
            .connections
            .get_mut(project_id)
            .filter(|r| r.generation == generation)
        else {
            return;
        };
        record.last_message_at = Instant::now();

        let event = match parse_event(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    project_id,
                    error = %e,
                    raw_message = %text,
                    "Discarding malformed frame",
                );
                return;
            }
        };

        if event.kind == EventType::Pong {
            tracing::trace!(project_id, "Pong received");
            return;
        }

        self.dispatch(&event);
    }

    /// Fan an event out to listeners.
    ///
    /// A panicking listener aborts the rest of this dispatch but not the
    /// manager.
    fn dispatch(&self, event: &ServerEvent) {
        match catch_unwind(AssertUnwindSafe(|| self.listeners.dispatch(event))) {
            Ok(invoked) => tracing::trace!(
                project_id = %event.project_id,
                event_type = %event.kind,
                invoked = invoked as u64,
                "Event dispatched",
            ),
            Err(_) => tracing::error!(
                project_id = %event.project_id,
                event_type = %event.kind,
                "Listener panicked, remaining listeners skipped",
            ),
        }
    }

    fn send(&self, target: SendTarget, frame: String) {
        let project_id = match target {
            SendTarget::Project(id) => id,
            SendTarget::Active => match &self.active_project {
                Some(id) => id.clone(),
                None => {
                    tracing::debug!("No active project, frame dropped");
                    return;
                }
            },
        };

        let sent = self
            .connections
            .get(&project_id)
            .is_some_and(|record| record.is_open() && record.send(frame));
        if !sent {
            tracing::debug!(project_id = %project_id, "Channel not open, frame dropped");
        }
    }

    // ---- queries ----

    fn is_open(&self, project_id: &str) -> bool {
        self.connections
            .get(project_id)
            .is_some_and(ConnectionRecord::is_open)
    }

    fn is_current(&self, project_id: &str, generation: u64) -> bool {
        self.connections
            .get(project_id)
            .is_some_and(|r| r.generation == generation)
    }

    fn snapshot(&self, project_id: &str) -> Option<ConnectionSnapshot> {
        let record = self.connections.get(project_id)?;
        let phase = match &record.phase {
            Phase::Connecting { .. } => ConnectionPhase::Connecting,
            Phase::Open { .. } if record.is_open() => ConnectionPhase::Open,
            Phase::Open { .. } | Phase::Reconnecting => ConnectionPhase::Reconnecting,
        };
        Some(ConnectionSnapshot {
            project_id: record.project_id.clone(),
            phase,
            reconnect_attempts: record.reconnect_attempts,
            connected_since: record.connected_since,
            is_active: self.active_project.as_deref() == Some(project_id),
        })
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

/// Spawn the open attempt for `record`'s current phase.
fn spawn_open(
    transport: &Arc<dyn Transport>,
    signals: &mpsc::UnboundedSender<Signal>,
    record: &ConnectionRecord,
) {
    let transport = Arc::clone(transport);
    let signals = signals.clone();
    let cancel = record.cancel_token().clone();
    let project_id = record.project_id.clone();
    let url = record.url.clone();
    let generation = record.generation;

    tracing::info!(project_id = %project_id, url = %url, "Opening project channel");

    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            result = transport.open(&url) => {
                let _ = signals.send(Signal::Opened { project_id, generation, result });
            }
        }
    });
}
