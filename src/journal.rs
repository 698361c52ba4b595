//! Per-Work progress journal, newest entry first.
//!
//! ```text
//! # Updates: work-1a2b3c
//!
//! <!-- update -->
//! ## Title
//! - id: update-...
//! - timestamp: 2026-03-01T09:00:00Z
//! - author: dev
//! - type: manual
//! - progress: 10 -> 40
//!
//! Summary text.
//!
//! ### Tasks added
//! - ...
//! ```

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use time::OffsetDateTime;
use tracing::debug;

use crate::domain::metadata::{format_rfc3339, now_utc, parse_rfc3339};
use crate::domain::update::{Update, UpdateKind};
use crate::entity_id::validate_filename_component;
use crate::store::{write_atomically, StoreError, StoreLayout};

const BLOCK_DELIMITER: &str = "<!-- update -->";
const TASKS_ADDED: &str = "### Tasks added";
const TASKS_COMPLETED: &str = "### Tasks completed";
pub const AUTOMATIC_AUTHOR: &str = "worktrail";

#[derive(Debug, Clone)]
pub struct UpdatesJournal {
    layout: StoreLayout,
}

impl UpdatesJournal {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn path_for(&self, work_id: &str) -> Result<PathBuf, StoreError> {
        if !validate_filename_component(work_id) {
            return Err(StoreError::Validation(format!(
                "invalid work id for journal: '{}'",
                work_id
            )));
        }
        Ok(self.layout.journal_path(work_id))
    }

    /// Prepends `update` to the Work's journal, creating the file on first use.
    pub fn create_update(&self, work_id: &str, update: &Update) -> Result<PathBuf, StoreError> {
        let path = self.path_for(work_id)?;
        let existing = match fs::read_to_string(&path) {
            Ok(raw) => raw.replace("\r\n", "\n"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(StoreError::Io(err)),
        };

        let (header, older) = match first_block_offset(&existing) {
            Some(index) => (&existing[..index], &existing[index..]),
            None => (existing.as_str(), ""),
        };

        let mut out = if header.trim().is_empty() {
            format!("# Updates: {}\n", work_id)
        } else {
            format!("{}\n", header.trim_end())
        };
        out.push('\n');
        out.push_str(&render_block(update));
        if !older.trim().is_empty() {
            out.push('\n');
            out.push_str(older.trim_end());
            out.push('\n');
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomically(&path, out.as_bytes())?;
        debug!(work_id, update_id = %update.id, "journal entry recorded");
        Ok(path)
    }

    /// Newest first. A missing journal is an empty list.
    pub fn get_updates(&self, work_id: &str) -> Result<Vec<Update>, StoreError> {
        let path = self.path_for(work_id)?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw.replace("\r\n", "\n"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::Io(err)),
        };

        Ok(split_blocks(&raw)
            .iter()
            .filter(|block| !block.trim().is_empty())
            .map(|block| parse_block(work_id, block))
            .collect())
    }

    pub fn create_automatic_update(
        &self,
        work_id: &str,
        title: &str,
        summary: &str,
        progress_before: u8,
        progress_after: u8,
    ) -> Result<Update, StoreError> {
        let update = Update::new(
            work_id,
            UpdateKind::Automatic,
            AUTOMATIC_AUTHOR,
            title,
            summary,
            now_utc(),
        )
        .with_progress(progress_before, progress_after);
        self.create_update(work_id, &update)?;
        Ok(update)
    }

    pub fn create_manual_update(
        &self,
        work_id: &str,
        author: &str,
        title: &str,
        summary: &str,
    ) -> Result<Update, StoreError> {
        let update = Update::new(work_id, UpdateKind::Manual, author, title, summary, now_utc());
        self.create_update(work_id, &update)?;
        Ok(update)
    }
}

fn render_block(update: &Update) -> String {
    let mut out = String::new();
    out.push_str(BLOCK_DELIMITER);
    out.push('\n');
    out.push_str(&format!("## {}\n", single_line(&update.title)));
    out.push_str(&format!("- id: {}\n", update.id));
    out.push_str(&format!("- timestamp: {}\n", format_rfc3339(update.timestamp)));
    out.push_str(&format!("- author: {}\n", single_line(&update.author)));
    out.push_str(&format!("- type: {}\n", update.kind));
    out.push_str(&format!(
        "- progress: {} -> {}\n",
        update.progress_before, update.progress_after
    ));
    if !update.summary.is_empty() {
        out.push('\n');
        for line in update.summary.trim().lines() {
            if is_reserved_line(line) {
                out.push('\\');
            }
            out.push_str(line);
            out.push('\n');
        }
    }
    push_tasks(&mut out, TASKS_ADDED, &update.tasks_added);
    push_tasks(&mut out, TASKS_COMPLETED, &update.tasks_completed);
    out
}

fn push_tasks(out: &mut String, heading: &str, tasks: &[String]) {
    if tasks.is_empty() {
        return;
    }
    out.push('\n');
    out.push_str(heading);
    out.push('\n');
    for task in tasks {
        out.push_str(&format!("- {}\n", single_line(task)));
    }
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end() == BLOCK_DELIMITER
}

// Summary lines that would read as structure get a leading backslash.
fn is_reserved_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed == BLOCK_DELIMITER
        || trimmed == TASKS_ADDED
        || trimmed == TASKS_COMPLETED
        || trimmed.starts_with('\\')
}

fn first_block_offset(raw: &str) -> Option<usize> {
    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        if is_delimiter(line) {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

fn split_blocks(raw: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;
    for line in raw.lines() {
        if is_delimiter(line) {
            blocks.extend(current.replace(String::new()));
            continue;
        }
        if let Some(block) = current.as_mut() {
            block.push_str(line);
            block.push('\n');
        }
    }
    blocks.extend(current);
    blocks
}

fn single_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Fields,
    Summary,
    TasksAdded,
    TasksCompleted,
}

/// Best effort: unknown lines are ignored and missing fields keep zero values.
fn parse_block(work_id: &str, block: &str) -> Update {
    let mut update = Update {
        id: String::new(),
        work_id: work_id.to_string(),
        timestamp: OffsetDateTime::UNIX_EPOCH,
        author: String::new(),
        kind: UpdateKind::default(),
        title: String::new(),
        summary: String::new(),
        tasks_added: Vec::new(),
        tasks_completed: Vec::new(),
        progress_before: 0,
        progress_after: 0,
    };
    let mut summary: Vec<&str> = Vec::new();
    let mut section = Section::Fields;

    for line in block.lines() {
        let trimmed = line.trim();
        if let Some(title) = trimmed.strip_prefix("## ") {
            if update.title.is_empty() && section == Section::Fields {
                update.title = title.trim().to_string();
                continue;
            }
        }
        if trimmed == TASKS_ADDED {
            section = Section::TasksAdded;
            continue;
        }
        if trimmed == TASKS_COMPLETED {
            section = Section::TasksCompleted;
            continue;
        }

        match section {
            Section::Fields => {
                if trimmed.is_empty() {
                    if !update.title.is_empty() || !update.id.is_empty() {
                        section = Section::Summary;
                    }
                    continue;
                }
                if let Some((key, value)) = trimmed
                    .strip_prefix("- ")
                    .and_then(|field| field.split_once(':'))
                {
                    apply_field(&mut update, key.trim(), value.trim());
                }
            }
            Section::Summary => summary.push(line.strip_prefix('\\').unwrap_or(line)),
            Section::TasksAdded => {
                if let Some(task) = trimmed.strip_prefix("- ") {
                    update.tasks_added.push(task.trim().to_string());
                }
            }
            Section::TasksCompleted => {
                if let Some(task) = trimmed.strip_prefix("- ") {
                    update.tasks_completed.push(task.trim().to_string());
                }
            }
        }
    }

    update.summary = summary.join("\n").trim().to_string();
    update
}

fn apply_field(update: &mut Update, key: &str, value: &str) {
    match key {
        "id" => update.id = value.to_string(),
        "timestamp" => {
            if let Some(timestamp) = parse_rfc3339(value) {
                update.timestamp = timestamp;
            }
        }
        "author" => update.author = value.to_string(),
        "type" => update.kind = UpdateKind::from_str(value).unwrap_or_default(),
        "progress" => {
            if let Some((before, after)) = value.split_once("->") {
                update.progress_before = before.trim().parse().unwrap_or(0);
                update.progress_after = after.trim().parse().unwrap_or(0);
            }
        }
        _ => {}
    }
}
