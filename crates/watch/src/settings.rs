use std::time::Duration;

use anyhow::{bail, Context};
use torgman_core::types::ProjectId;

/// Default interval between reconciliation passes.
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Watcher settings, on top of the connection manager's own
/// `RealtimeConfig`.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    /// Projects kept connected in ambient mode, in listed order.
    pub project_ids: Vec<ProjectId>,
    /// Project watched in focused mode, if any.
    pub active_project: Option<ProjectId>,
    pub reconcile_interval: Duration,
    pub log_format: LogFormat,
}

impl WatchSettings {
    /// Load settings from environment variables.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `WATCH_PROJECT_IDS`       | empty   |
    /// | `ACTIVE_PROJECT_ID`       | unset   |
    /// | `RECONCILE_INTERVAL_SECS` | `30`    |
    /// | `WATCH_LOG_FORMAT`        | `text`  |
    ///
    /// At least one of `WATCH_PROJECT_IDS` and `ACTIVE_PROJECT_ID` must
    /// name a project.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let project_ids = lookup("WATCH_PROJECT_IDS")
            .map(|raw| parse_project_list(&raw))
            .unwrap_or_default();

        let active_project = lookup("ACTIVE_PROJECT_ID")
            .map(|raw| raw.trim().to_string())
            .filter(|id| !id.is_empty());

        if project_ids.is_empty() && active_project.is_none() {
            bail!("nothing to watch: set WATCH_PROJECT_IDS or ACTIVE_PROJECT_ID");
        }

        let reconcile_secs = match lookup("RECONCILE_INTERVAL_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("RECONCILE_INTERVAL_SECS is invalid: {raw:?}"))?,
            None => DEFAULT_RECONCILE_INTERVAL_SECS,
        };
        if reconcile_secs == 0 {
            bail!("RECONCILE_INTERVAL_SECS must be greater than zero");
        }

        let log_format = match lookup("WATCH_LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => bail!("WATCH_LOG_FORMAT must be \"text\" or \"json\", got {other:?}"),
        };

        Ok(Self {
            project_ids,
            active_project,
            reconcile_interval: Duration::from_secs(reconcile_secs),
            log_format,
        })
    }
}

/// Split a comma-separated id list, dropping blanks and duplicates.
pub fn parse_project_list(raw: &str) -> Vec<ProjectId> {
    let mut ids: Vec<ProjectId> = Vec::new();
    for id in raw.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        if !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
    }
    ids
}
