//! Tests for event summaries printed by the watcher.

use serde_json::json;
use torgman_realtime::messages::parse_event;
use torgman_watch::report::{describe, is_final};

// ---------------------------------------------------------------------------
// Test: describe()
// ---------------------------------------------------------------------------

#[test]
fn status_event_summary() {
    let event = parse_event(
        &json!({
            "project_id": "p1",
            "type": "status",
            "status": "generating_subtitles",
            "progress": 60,
            "message": "Generating subtitles"
        })
        .to_string(),
    )
    .unwrap();

    assert_eq!(
        describe(&event),
        "p1 status generating_subtitles (60%): Generating subtitles"
    );
    assert!(!is_final(&event));
}

#[test]
fn export_completion_includes_download_location() {
    let event = parse_event(
        &json!({
            "project_id": "p1",
            "type": "export_status",
            "status": "export_completed",
            "progress": 100,
            "data": {
                "filename": "clip_burned.mp4",
                "download_url": "/api/projects/p1/download-export/clip_burned.mp4"
            }
        })
        .to_string(),
    )
    .unwrap();

    assert_eq!(
        describe(&event),
        "p1 export_status export_completed (100%) -> /api/projects/p1/download-export/clip_burned.mp4"
    );
    assert!(is_final(&event));
}

// ---------------------------------------------------------------------------
// Test: is_final()
// ---------------------------------------------------------------------------

#[test]
fn completion_and_error_are_final() {
    for kind in ["completion", "error"] {
        let event = parse_event(&json!({"project_id": "p1", "type": kind}).to_string()).unwrap();
        assert!(is_final(&event), "{kind} should be final");
    }

    let heartbeat =
        parse_event(&json!({"project_id": "p1", "type": "heartbeat"}).to_string()).unwrap();
    assert!(!is_final(&heartbeat));
}
