use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{HookDispatcher, HookEvent, HookEventType, HookHandler};
use crate::config::HookConfig;
use crate::domain::metadata::{format_rfc3339, parse_rfc3339, whole_days_between};
use crate::domain::EntityKind;
use crate::git::{short_hash, GitAdapter};
use crate::store::StoreLayout;

pub const ACTIVITY_LOG: &str = "activity_log";
pub const COMMIT_TRACKER: &str = "commit_tracker";
pub const INACTIVITY_WARNING: &str = "inactivity_warning";

const ACTIVITY_LOG_FILE: &str = "activity.jsonl";
const COMMIT_LOG_FILE: &str = "commits.jsonl";

/// Appends every event it sees as one JSON line.
pub struct ActivityLogHook {
    path: PathBuf,
}

impl ActivityLogHook {
    pub fn new(layout: &StoreLayout) -> Self {
        Self {
            path: layout.state_dir().join(ACTIVITY_LOG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HookHandler for ActivityLogHook {
    async fn handle(&self, event: Arc<HookEvent>) -> Result<(), String> {
        let line = serde_json::to_string(event.as_ref()).map_err(|err| err.to_string())?;
        append_line(&self.path, &line).await
    }
}

/// Records the HEAD commit next to Work events when the root is inside a
/// git repository.
pub struct CommitTrackerHook {
    root: PathBuf,
    path: PathBuf,
}

impl CommitTrackerHook {
    pub fn new(layout: &StoreLayout) -> Self {
        Self {
            root: layout.root().to_path_buf(),
            path: layout.state_dir().join(COMMIT_LOG_FILE),
        }
    }
}

#[async_trait]
impl HookHandler for CommitTrackerHook {
    async fn handle(&self, event: Arc<HookEvent>) -> Result<(), String> {
        if event.entity_kind != EntityKind::Work {
            return Ok(());
        }
        let root = self.root.clone();
        let head = tokio::task::spawn_blocking(move || {
            let git = GitAdapter::new();
            if !git.is_repository(&root) {
                return Ok(None);
            }
            git.head(&root).map(Some)
        })
        .await
        .map_err(|err| format!("commit lookup task failed: {}", err))?
        .map_err(|err| err.to_string())?;

        let Some(head) = head else {
            debug!(root = %self.root.display(), "not a git repository; commit not tracked");
            return Ok(());
        };
        let line = json!({
            "occurred_at": format_rfc3339(event.occurred_at),
            "event_type": event.event_type,
            "work_id": event.entity_id,
            "commit": short_hash(&head.hash),
            "branch": head.branch,
            "subject": head.subject,
        });
        append_line(&self.path, &line.to_string()).await
    }
}

/// Warns before a write touches Work that sat idle past the threshold.
/// Reads `last_activity_at` from the event payload.
pub struct InactivityWarningHook {
    warning_days: i64,
}

impl InactivityWarningHook {
    pub fn new(warning_days: i64) -> Self {
        Self { warning_days }
    }

    pub fn days_inactive(&self, event: &HookEvent) -> Option<i64> {
        let raw = event.payload.get("last_activity_at")?.as_str()?;
        let last_activity = parse_rfc3339(raw)?;
        Some(whole_days_between(last_activity, event.occurred_at))
    }
}

#[async_trait]
impl HookHandler for InactivityWarningHook {
    async fn handle(&self, event: Arc<HookEvent>) -> Result<(), String> {
        if event.entity_kind != EntityKind::Work {
            return Ok(());
        }
        if let Some(days) = self.days_inactive(&event) {
            if days > self.warning_days {
                warn!(
                    work = %event.entity_id,
                    days_inactive = days,
                    threshold = self.warning_days,
                    "work has been inactive for a while"
                );
            }
        }
        Ok(())
    }
}

/// Registers the built-ins named in `config.builtin`. Returns the names that
/// were installed; unknown names are logged and skipped.
pub fn install_builtin_hooks(
    dispatcher: &mut HookDispatcher,
    layout: &StoreLayout,
    config: &HookConfig,
) -> Vec<String> {
    let mut installed = Vec::new();
    for name in &config.builtin {
        match name.trim() {
            ACTIVITY_LOG => {
                let hook: Arc<dyn HookHandler> = Arc::new(ActivityLogHook::new(layout));
                for event_type in HookEventType::ALL {
                    if *event_type != HookEventType::PreWrite {
                        dispatcher.register(*event_type, ACTIVITY_LOG, Arc::clone(&hook));
                    }
                }
            }
            COMMIT_TRACKER => {
                let hook: Arc<dyn HookHandler> = Arc::new(CommitTrackerHook::new(layout));
                for event_type in [
                    HookEventType::WorkCreated,
                    HookEventType::ScheduleChanged,
                    HookEventType::WorkCompleted,
                    HookEventType::UpdateRecorded,
                ] {
                    dispatcher.register(event_type, COMMIT_TRACKER, Arc::clone(&hook));
                }
            }
            INACTIVITY_WARNING => {
                dispatcher.register(
                    HookEventType::PreWrite,
                    INACTIVITY_WARNING,
                    Arc::new(InactivityWarningHook::new(config.inactivity_warning_days)),
                );
            }
            other => {
                warn!(hook = other, "unknown built-in hook; skipping");
                continue;
            }
        }
        installed.push(name.trim().to_string());
    }
    installed
}

async fn append_line(path: &Path, line: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| format!("failed to create {}: {}", parent.display(), err))?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|err| format!("failed to open {}: {}", path.display(), err))?;
    file.write_all(format!("{}\n", line).as_bytes())
        .await
        .map_err(|err| format!("failed to append to {}: {}", path.display(), err))?;
    file.flush().await.map_err(|err| err.to_string())
}
