#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use torgman_realtime::transport::FrameSink;
use torgman_realtime::{
    listener, Channel, Listener, RealtimeConfig, ServerEvent, Transport, TransportError,
};

/// Build a test `RealtimeConfig` with the production timings and a
/// fixed base URL.
pub fn test_config() -> RealtimeConfig {
    RealtimeConfig {
        api_url: "http://test.local".to_string(),
        ..RealtimeConfig::default()
    }
}

/// Let spawned tasks run to their next await point.
///
/// Under a paused clock this also advances time by one millisecond,
/// which is far below every timer the manager uses.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ---------------------------------------------------------------------------
// In-memory transport
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Script {
    opened: Vec<String>,
    fail_next: u32,
    fail_all: bool,
    fail_writes: bool,
    open_delay: Option<Duration>,
}

/// `Transport` that hands the server side of every channel it opens to
/// the test through a [`Servers`] queue.
pub struct MemoryTransport {
    script: Mutex<Script>,
    servers: mpsc::UnboundedSender<ServerSide>,
}

impl MemoryTransport {
    pub fn new() -> (Arc<Self>, Servers) {
        let (servers, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            script: Mutex::new(Script::default()),
            servers,
        });
        (transport, Servers { rx })
    }

    /// URLs of every open attempt, successful or not.
    pub fn opened(&self) -> Vec<String> {
        self.script.lock().unwrap().opened.clone()
    }

    pub fn open_count(&self) -> usize {
        self.script.lock().unwrap().opened.len()
    }

    /// Refuse the next `n` open attempts.
    pub fn fail_next(&self, n: u32) {
        self.script.lock().unwrap().fail_next = n;
    }

    /// Refuse every open attempt until called again with `false`.
    pub fn fail_all(&self, fail: bool) {
        self.script.lock().unwrap().fail_all = fail;
    }

    /// Make every channel opened from now on reject writes while its
    /// inbound side stays silent.
    pub fn fail_writes(&self, fail: bool) {
        self.script.lock().unwrap().fail_writes = fail;
    }

    /// Delay every open attempt by `delay` before it resolves.
    pub fn open_delay(&self, delay: Duration) {
        self.script.lock().unwrap().open_delay = Some(delay);
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, url: &str) -> Result<Channel, TransportError> {
        let (fail, fail_writes, delay) = {
            let mut script = self.script.lock().unwrap();
            script.opened.push(url.to_string());
            let fail = if script.fail_next > 0 {
                script.fail_next -= 1;
                true
            } else {
                script.fail_all
            };
            (fail, script.fail_writes, script.open_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(TransportError::Connection(format!("{url} refused")));
        }

        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();

        let sink: FrameSink = if fail_writes {
            Box::pin(futures::sink::unfold(client_tx, |_tx, _frame: String| async move {
                Err::<mpsc::UnboundedSender<String>, _>(TransportError::Protocol(
                    "broken pipe".into(),
                ))
            }))
        } else {
            Box::pin(futures::sink::unfold(client_tx, |tx, frame: String| async move {
                tx.send(frame)
                    .map_err(|_| TransportError::Protocol("server side dropped".into()))?;
                Ok::<_, TransportError>(tx)
            }))
        };
        let stream = futures::stream::unfold(client_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });

        let _ = self.servers.send(ServerSide {
            url: url.to_string(),
            to_client: Some(to_client),
            from_client,
            received: Vec::new(),
            client_closed: false,
        });

        Ok(Channel::new(sink, Box::pin(stream)))
    }
}

/// Queue of server sides, one per successful open.
pub struct Servers {
    rx: mpsc::UnboundedReceiver<ServerSide>,
}

impl Servers {
    /// Wait for the next successfully opened channel.
    pub async fn next(&mut self) -> ServerSide {
        tokio::time::timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .expect("no channel was opened")
            .expect("transport dropped")
    }

    pub fn try_next(&mut self) -> Option<ServerSide> {
        self.rx.try_recv().ok()
    }
}

/// The backend end of one in-memory channel.
pub struct ServerSide {
    pub url: String,
    to_client: Option<mpsc::UnboundedSender<Result<String, TransportError>>>,
    from_client: mpsc::UnboundedReceiver<String>,
    received: Vec<String>,
    client_closed: bool,
}

impl ServerSide {
    /// Send a JSON frame to the client.
    pub fn push(&self, frame: serde_json::Value) {
        self.push_raw(&frame.to_string());
    }

    /// Send a raw text frame to the client.
    pub fn push_raw(&self, text: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Ok(text.to_string()));
        }
    }

    /// Fail the inbound stream with a protocol error.
    pub fn push_error(&self, reason: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Err(TransportError::Protocol(reason.to_string())));
        }
    }

    /// Close the channel from the server end.
    pub fn hang_up(&mut self) {
        self.to_client = None;
    }

    /// Frames the client has written so far.
    pub fn received(&mut self) -> &[String] {
        self.drain();
        &self.received
    }

    /// Frames the client has written, decoded as JSON.
    pub fn received_json(&mut self) -> Vec<serde_json::Value> {
        self.received()
            .iter()
            .map(|text| serde_json::from_str(text).expect("client frames are JSON"))
            .collect()
    }

    /// Whether the client has closed its side.
    pub fn client_closed(&mut self) -> bool {
        self.drain();
        self.client_closed
    }

    fn drain(&mut self) {
        loop {
            match self.from_client.try_recv() {
                Ok(frame) => self.received.push(frame),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.client_closed = true;
                    break;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Frames and listeners
// ---------------------------------------------------------------------------

/// A minimal server event of the given type.
pub fn event(project_id: &str, kind: &str) -> serde_json::Value {
    serde_json::json!({ "project_id": project_id, "type": kind })
}

/// A listener that records every event it receives.
pub fn recorder() -> (Listener, Arc<Mutex<Vec<ServerEvent>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let l = listener(move |event: &ServerEvent| sink.lock().unwrap().push(event.clone()));
    (l, seen)
}

/// A listener that appends `label` to a shared log.
pub fn tagger(label: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Listener {
    let log = Arc::clone(log);
    listener(move |_: &ServerEvent| log.lock().unwrap().push(label))
}
