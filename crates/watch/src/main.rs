//! `torgman-watch` -- follow Torgman projects from the terminal.
//!
//! Keeps project channels open through the connection manager and logs
//! every progress, completion and export event the backend pushes.
//!
//! # Environment variables
//!
//! | Variable                  | Required | Default                 | Description                              |
//! |---------------------------|----------|-------------------------|------------------------------------------|
//! | `TORGMAN_API_URL`         | no       | `http://localhost:8000` | Backend base URL                         |
//! | `WATCH_PROJECT_IDS`       | no*      | --                      | Comma-separated projects to keep open    |
//! | `ACTIVE_PROJECT_ID`       | no*      | --                      | Project to watch in focused mode         |
//! | `RECONCILE_INTERVAL_SECS` | no       | `30`                    | Seconds between reconciliation passes    |
//! | `WATCH_LOG_FORMAT`        | no       | `text`                  | `text` or `json`                         |
//!
//! \* at least one of the two must be set. Timing knobs of the
//! connection manager itself are documented on `RealtimeConfig::from_env`.

use std::sync::Arc;

use torgman_realtime::{ConnectionManager, RealtimeConfig, WsTransport};
use torgman_watch::report;
use torgman_watch::settings::{LogFormat, WatchSettings};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = WatchSettings::from_env()?;
    init_tracing(settings.log_format);

    let config = RealtimeConfig::from_env()?;

    tracing::info!(
        api_url = %config.api_url,
        projects = settings.project_ids.len(),
        active = settings.active_project.as_deref(),
        reconcile_secs = settings.reconcile_interval.as_secs(),
        "Starting torgman-watch",
    );

    let manager = ConnectionManager::start(config, Arc::new(WsTransport));
    report::install(&manager);

    if let Some(active) = &settings.active_project {
        if let Err(e) = manager.set_active_project(active.clone()).await {
            tracing::warn!(project_id = %active, error = %e, "Active project not reachable yet");
        }
    }

    let mut reconcile = tokio::time::interval(settings.reconcile_interval);
    loop {
        tokio::select! {
            _ = reconcile.tick() => {
                manager
                    .ensure_project_connections(settings.project_ids.iter().cloned())
                    .await;
                if let Some(active) = &settings.active_project {
                    if !manager.is_active_project_connected().await {
                        if let Err(e) = manager.connect(active.clone()).await {
                            tracing::warn!(project_id = %active, error = %e, "Active project still unreachable");
                        }
                    }
                }
                let connected = manager.connected_projects().await;
                tracing::debug!(connected = connected.len(), "Reconciliation pass complete");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, closing channels");
                break;
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "torgman_watch=info,torgman_realtime=info".into());

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
