/// Projects are addressed by an opaque string identifier chosen by the backend.
pub type ProjectId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
