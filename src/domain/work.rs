use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::metadata::{insert_ref, is_false, normalize_tags, remove_ref, GitContext};
use super::schedule::{Priority, Schedule, WorkStatus};
use crate::entity_id::new_entity_id;

pub const WORK_PREFIX: &str = "work";

/// A tracked unit of effort.
///
/// The serialized field order is the document header order. `content` and
/// `file_path` never reach the header: the first is the document body, the
/// second is where the store last read or wrote the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub schedule: Schedule,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_context: Option<GitContext>,
    #[serde(default)]
    pub session_number: u32,
    #[serde(default)]
    pub technical_tags: Vec<String>,
    #[serde(default)]
    pub(crate) artifact_refs: Vec<String>,
    pub metadata: WorkMetadata,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub started_at: Option<OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub overview_updated: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updates_ref: Option<String>,
    #[serde(skip)]
    pub content: String,
    #[serde(skip)]
    pub file_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkMetadata {
    pub status: WorkStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub artifact_count: usize,
    #[serde(default)]
    pub activity_score: f64,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_activity_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub needs_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consolidation_method: Option<String>,
}

impl Default for WorkMetadata {
    fn default() -> Self {
        Self {
            status: WorkStatus::Active,
            priority: Priority::default(),
            effort: None,
            progress: 0,
            artifact_count: 0,
            activity_score: 0.0,
            last_activity_at: None,
            needs_review: false,
            consolidation_method: None,
        }
    }
}

impl Work {
    pub fn new(
        title: &str,
        description: &str,
        schedule: Schedule,
        priority: Priority,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: new_entity_id(WORK_PREFIX),
            title: title.trim().to_string(),
            description: description.trim().to_string(),
            schedule,
            created_at: now,
            updated_at: now,
            git_context: None,
            session_number: 0,
            technical_tags: Vec::new(),
            artifact_refs: Vec::new(),
            metadata: WorkMetadata {
                priority,
                last_activity_at: Some(now),
                ..WorkMetadata::default()
            },
            started_at: None,
            completed_at: None,
            group_id: None,
            overview_updated: None,
            updates_ref: None,
            content: String::new(),
            file_path: None,
        }
    }

    pub fn artifact_refs(&self) -> &[String] {
        &self.artifact_refs
    }

    pub(crate) fn add_artifact_ref(&mut self, artifact_id: &str) -> bool {
        let changed = insert_ref(&mut self.artifact_refs, artifact_id);
        self.metadata.artifact_count = self.artifact_refs.len();
        changed
    }

    pub(crate) fn remove_artifact_ref(&mut self, artifact_id: &str) -> bool {
        let changed = remove_ref(&mut self.artifact_refs, artifact_id);
        self.metadata.artifact_count = self.artifact_refs.len();
        changed
    }

    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.technical_tags = normalize_tags(tags);
    }

    pub fn status(&self) -> WorkStatus {
        self.metadata.status
    }

    pub fn is_terminal(&self) -> bool {
        self.metadata.status.is_terminal()
    }

    pub fn last_activity(&self) -> OffsetDateTime {
        self.metadata.last_activity_at.unwrap_or(self.updated_at)
    }

    /// Records engagement: bumps both `updated_at` and the last-activity mark.
    pub fn touch(&mut self, now: OffsetDateTime) {
        self.updated_at = now;
        self.metadata.last_activity_at = Some(now);
    }

    pub fn start(&mut self, now: OffsetDateTime) {
        self.metadata.status = WorkStatus::InProgress;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.touch(now);
    }

    pub fn complete(&mut self, now: OffsetDateTime) {
        self.metadata.status = WorkStatus::Completed;
        self.metadata.progress = 100;
        self.completed_at = Some(now);
        self.touch(now);
    }

    pub fn set_progress(&mut self, progress: u8, now: OffsetDateTime) {
        self.metadata.progress = progress.min(100);
        self.touch(now);
    }

    pub fn matches_query(&self, needle: &str) -> bool {
        self.id.to_ascii_lowercase().contains(needle)
            || self.title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.content.to_lowercase().contains(needle)
            || self
                .technical_tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(needle))
    }
}
