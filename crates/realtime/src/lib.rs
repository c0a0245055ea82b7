//! Real-time synchronisation layer for Torgman project channels.
//!
//! Maintains one WebSocket session per tracked project, decodes the
//! backend's progress and result events, and fans them out to
//! registered listeners. Sessions are kept alive with an
//! application-level heartbeat, monitored for staleness, and
//! re-established after unexpected drops.
//!
//! The entry point is [`ConnectionManager`]; everything else is the
//! vocabulary it speaks.

pub mod config;
mod connection;
pub mod error;
pub mod heartbeat;
pub mod listeners;
pub mod manager;
pub mod messages;
pub mod reconnect;
pub mod transport;

pub use config::RealtimeConfig;
pub use error::{ConnectError, SendError};
pub use heartbeat::{ActiveOnly, StaleAction, StalePolicy};
pub use listeners::{listener, Listener, ListenerKey};
pub use manager::{ConnectionManager, ConnectionPhase, ConnectionSnapshot};
pub use messages::{ClientFrame, EventType, ServerEvent};
pub use reconnect::ReconnectConfig;
pub use transport::{Channel, Transport, TransportError, WsTransport};
