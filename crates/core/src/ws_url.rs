//! WebSocket endpoint derivation.
//!
//! Every project channel lives at `<base>/<ws_path>/<project_id>` on the
//! same host as the HTTP API, with the scheme switched to its WebSocket
//! counterpart (`http` -> `ws`, `https` -> `wss`).

use url::Url;

use crate::error::CoreError;

/// Build the WebSocket URL for a project channel.
///
/// `base_url` is the HTTP endpoint of the backend (e.g.
/// `http://localhost:8000`). A base already using `ws`/`wss` is accepted
/// unchanged. Any path on the base is kept as a prefix.
pub fn ws_url_for_project(
    base_url: &str,
    ws_path: &str,
    project_id: &str,
) -> Result<String, CoreError> {
    if project_id.is_empty() {
        return Err(CoreError::EmptyProjectId);
    }

    let mut url = Url::parse(base_url).map_err(|e| CoreError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(CoreError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|()| CoreError::UnsupportedScheme(scheme.to_string()))?;

    {
        let mut segments = url.path_segments_mut().map_err(|()| CoreError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: "cannot be a base".to_string(),
        })?;
        segments.pop_if_empty();
        for part in ws_path.split('/').filter(|s| !s.is_empty()) {
            segments.push(part);
        }
        segments.push(project_id);
    }

    Ok(url.to_string())
}
