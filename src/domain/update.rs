use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::entity_id::new_entity_id;

pub const UPDATE_PREFIX: &str = "update";

labeled_enum! {
    pub enum UpdateKind as "update type" {
        Automatic => "automatic" | "auto",
        Manual => "manual",
    }
}

impl Default for UpdateKind {
    fn default() -> Self {
        UpdateKind::Manual
    }
}

/// One progress note in a Work's journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub id: String,
    pub work_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub author: String,
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    pub title: String,
    pub summary: String,
    pub tasks_added: Vec<String>,
    pub tasks_completed: Vec<String>,
    pub progress_before: u8,
    pub progress_after: u8,
}

impl Update {
    pub fn new(
        work_id: &str,
        kind: UpdateKind,
        author: &str,
        title: &str,
        summary: &str,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: new_entity_id(UPDATE_PREFIX),
            work_id: work_id.to_string(),
            timestamp: now,
            author: author.trim().to_string(),
            kind,
            title: title.trim().to_string(),
            summary: summary.trim().to_string(),
            tasks_added: Vec::new(),
            tasks_completed: Vec::new(),
            progress_before: 0,
            progress_after: 0,
        }
    }

    pub fn with_progress(mut self, before: u8, after: u8) -> Self {
        self.progress_before = before.min(100);
        self.progress_after = after.min(100);
        self
    }

    pub fn with_tasks(mut self, added: Vec<String>, completed: Vec<String>) -> Self {
        self.tasks_added = added;
        self.tasks_completed = completed;
        self
    }

    pub fn progress_changed(&self) -> bool {
        self.progress_before != self.progress_after
    }
}
