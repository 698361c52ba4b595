use std::path::{Path, PathBuf};

use crate::domain::artifact::ArtifactType;
use crate::domain::schedule::Schedule;

const ARTIFACTS_DIR: &str = "artifacts";
const GROUPS_DIR: &str = "groups";
const JOURNAL_DIR: &str = "updates";
const STATE_DIR: &str = ".worktrail";

/// The single place that knows where each logical state lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn work_dir(&self, schedule: Schedule) -> PathBuf {
        self.root.join(schedule.dir_name())
    }

    pub fn work_dirs(&self) -> Vec<PathBuf> {
        Schedule::ALL
            .iter()
            .map(|schedule| self.work_dir(*schedule))
            .collect()
    }

    pub fn artifact_dir(&self, artifact_type: ArtifactType) -> PathBuf {
        self.root.join(ARTIFACTS_DIR).join(artifact_type.dir_name())
    }

    pub fn artifact_dirs(&self) -> Vec<PathBuf> {
        ArtifactType::ALL
            .iter()
            .map(|artifact_type| self.artifact_dir(*artifact_type))
            .collect()
    }

    pub fn group_dir(&self) -> PathBuf {
        self.root.join(GROUPS_DIR)
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.root.join(JOURNAL_DIR)
    }

    pub fn journal_path(&self, work_id: &str) -> PathBuf {
        self.journal_dir().join(format!("{work_id}.md"))
    }

    /// Scratch space for hook output; never scanned for entities.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }
}
