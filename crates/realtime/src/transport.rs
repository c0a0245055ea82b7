//! Transport seam between the connection manager and the socket layer.
//!
//! [`Transport::open`] resolves once a channel is open (or fails before
//! it opens). The resulting [`Channel`] is a pair of text-frame halves:
//! a sink for outbound frames and a stream of inbound frames that ends
//! when the socket closes.
//!
//! [`WsTransport`] is the production implementation over
//! `tokio-tungstenite`.

use std::pin::Pin;

use futures::future;
use futures::sink::Sink;
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Outbound half of a channel: accepts serialised text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of a channel: yields text frames until the socket closes.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

/// An open, bidirectional text channel to one project.
pub struct Channel {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Channel {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Opens channels to a URL.
///
/// Implemented by [`WsTransport`] in production and by in-memory
/// transports in tests.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a channel to `url`.
    ///
    /// `Ok` means the socket is open; `Err` means it failed before
    /// opening.
    async fn open(&self, url: &str) -> Result<Channel, TransportError>;
}

/// WebSocket transport backed by `tokio-tungstenite`.
///
/// Binary frames are dropped. Transport-level Ping/Pong frames are
/// answered by tungstenite itself and never surface. A Close frame ends
/// the inbound stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> Result<Channel, TransportError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connection(format!("Failed to connect to {url}: {e}")))?;

        tracing::debug!(url, "WebSocket handshake complete");

        let (sink, stream) = ws_stream.split();

        let sink = sink
            .with(|text: String| future::ready(Ok::<_, tokio_tungstenite::tungstenite::Error>(Message::Text(text))))
            .sink_map_err(|e| TransportError::Protocol(e.to_string()));

        let stream = stream
            .take_while(|frame| future::ready(!matches!(frame, Ok(Message::Close(_)))))
            .filter_map(|frame| {
                future::ready(match frame {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(Message::Binary(_)) => {
                        tracing::trace!("Ignoring binary frame");
                        None
                    }
                    // Ping/Pong are handled by tungstenite; Close is cut by take_while.
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::Protocol(e.to_string()))),
                })
            })
            .boxed();

        Ok(Channel::new(Box::pin(sink), stream))
    }
}

/// Errors that can occur at the socket layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Failed to establish the channel.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an already-open channel.
    #[error("Protocol error: {0}")]
    Protocol(String),
}
