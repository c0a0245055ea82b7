//! Error types surfaced to callers of the connection manager.
//!
//! Only caller-initiated actions report failures. Background activity
//! (drops, staleness, reconnection) is absorbed and logged.

use torgman_core::error::CoreError;

use crate::transport::TransportError;

/// Why a `connect` (or `set_active_project`) call did not end with an
/// open channel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectError {
    /// The project id or base URL could not produce a channel URL.
    #[error("Invalid channel address: {0}")]
    Address(#[from] CoreError),

    /// The socket reported an error before it opened.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A disconnect or replacing connect tore the record down while the
    /// open was still in flight.
    #[error("Connection attempt superseded")]
    Superseded,

    /// The manager task is no longer running.
    #[error("Connection manager stopped")]
    ManagerStopped,
}

/// Errors from [`ConnectionManager::send_message`](crate::ConnectionManager::send_message).
///
/// A closed target channel is not an error: the frame is dropped.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Connection manager stopped")]
    ManagerStopped,
}
