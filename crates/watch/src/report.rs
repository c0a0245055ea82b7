//! Log lines for events received by the watcher.

use std::fmt::Write as _;

use torgman_realtime::{listener, ConnectionManager, EventType, ListenerKey, ServerEvent};

/// One-line human summary of an event.
///
/// `<project> <type>[ <status>][ (<progress>%)][: <message>][ -> <download>]`
pub fn describe(event: &ServerEvent) -> String {
    let mut line = format!("{} {}", event.project_id, event.kind);
    if let Some(status) = &event.status {
        let _ = write!(line, " {status}");
    }
    if let Some(progress) = event.progress {
        let _ = write!(line, " ({progress}%)");
    }
    if let Some(message) = &event.message {
        let _ = write!(line, ": {message}");
    }
    if let Some(url) = event.download_url() {
        let _ = write!(line, " -> {url}");
    }
    line
}

/// Whether an event marks the end of a pipeline run.
pub fn is_final(event: &ServerEvent) -> bool {
    match event.kind {
        EventType::Completion | EventType::Error => true,
        EventType::Status | EventType::ExportStatus => {
            event.status.as_ref().is_some_and(|s| s.is_terminal())
        }
        _ => false,
    }
}

/// Register the watcher's logging listeners.
pub fn install(manager: &ConnectionManager) {
    manager.add_event_listener(
        ListenerKey::All,
        listener(|event: &ServerEvent| {
            if event.kind == EventType::Error {
                tracing::warn!(project_id = %event.project_id, "{}", describe(event));
            } else if is_final(event) {
                tracing::info!(
                    project_id = %event.project_id,
                    filename = event.filename(),
                    "{}",
                    describe(event),
                );
            } else {
                tracing::debug!(project_id = %event.project_id, "{}", describe(event));
            }
        }),
    );

    manager.add_event_listener(
        ListenerKey::Event(EventType::SubtitleUpdated),
        listener(|event: &ServerEvent| {
            let index = event
                .data
                .as_ref()
                .and_then(|data| data.get("index"))
                .and_then(|index| index.as_u64());
            tracing::info!(project_id = %event.project_id, index, "Subtitle line edited");
        }),
    );
}
