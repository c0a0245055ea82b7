//! Shared primitives for the Torgman real-time layer.
//!
//! Holds the identifier and timestamp types, the processing-stage
//! vocabulary the backend reports, and the WebSocket URL derivation
//! used by every project channel.

pub mod error;
pub mod status;
pub mod types;
pub mod ws_url;
