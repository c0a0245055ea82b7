//! Project channel message types and parser.
//!
//! The backend sends flat JSON events of the shape
//! `{"project_id": "...", "type": "<kind>", ...optional fields}`. This
//! module deserializes them into [`ServerEvent`] and encodes the one
//! control frame the client sends back ([`ClientFrame::Ping`]).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use torgman_core::status::ProcessingStatus;
use torgman_core::types::ProjectId;

/// All known server event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Processing stage update; `status`, `progress` and `message` are set.
    Status,
    /// Full subtitle list in `data`.
    Subtitles,
    /// Processing failed; `message` describes the failure.
    Error,
    /// Server-side keep-alive echo.
    Heartbeat,
    /// A processing or translation run finished.
    Completion,
    /// Translation progress.
    Translating,
    /// Reply to a client ping. Consumed by the manager, never dispatched.
    Pong,
    /// Export pipeline update; carries the download location when done.
    ExportStatus,
    /// A single subtitle line was edited; `data` is a [`SubtitleEdit`].
    SubtitleUpdated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Subtitles => "subtitles",
            Self::Error => "error",
            Self::Heartbeat => "heartbeat",
            Self::Completion => "completion",
            Self::Translating => "translating",
            Self::Pong => "pong",
            Self::ExportStatus => "export_status",
            Self::SubtitleUpdated => "subtitle_updated",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded server-to-client event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    /// Project the event concerns. Used for routing.
    pub project_id: ProjectId,

    #[serde(rename = "type")]
    pub kind: EventType,

    /// Processing stage; meaningful for `status` and `export_status`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProcessingStatus>,

    /// Completion percentage (0-100). Advisory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,

    /// Human-readable text for display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Event-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl ServerEvent {
    /// Create a bare event with no optional fields.
    pub fn new(project_id: impl Into<ProjectId>, kind: EventType) -> Self {
        Self {
            project_id: project_id.into(),
            kind,
            status: None,
            progress: None,
            message: None,
            data: None,
            filename: None,
            file_size: None,
            download_url: None,
        }
    }

    /// Download location of a finished export.
    ///
    /// Prefers the top-level field and falls back to `data.download_url`.
    pub fn download_url(&self) -> Option<&str> {
        self.download_url
            .as_deref()
            .or_else(|| self.data_str("download_url"))
    }

    /// Exported file name; top-level field first, then `data.filename`.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref().or_else(|| self.data_str("filename"))
    }

    /// Decode `data` into a typed payload.
    ///
    /// Returns `None` when the event carries no `data`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.data
            .as_ref()
            .map(|value| T::deserialize(value))
    }

    fn data_str(&self, field: &str) -> Option<&str> {
        self.data.as_ref()?.get(field)?.as_str()
    }
}

/// One subtitle line as carried in `subtitles` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleLine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

/// Payload of `subtitle_updated` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleEdit {
    pub index: usize,
    pub text: String,
    #[serde(default)]
    pub translation: Option<String>,
}

/// Control frames sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Application-level keep-alive.
    Ping { project_id: ProjectId },
}

impl ClientFrame {
    pub fn ping(project_id: impl Into<ProjectId>) -> Self {
        Self::Ping {
            project_id: project_id.into(),
        }
    }
}

/// Parse a text frame into a typed event.
///
/// Returns `Err` for malformed JSON, a missing `project_id` or `type`,
/// or an unknown `type`. Callers should log and drop the frame.
pub fn parse_event(text: &str) -> Result<ServerEvent, serde_json::Error> {
    serde_json::from_str(text)
}
