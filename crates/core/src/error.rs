#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    #[error("Project id must not be empty")]
    EmptyProjectId,

    #[error("Invalid base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}
