use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::metadata::{insert_ref, is_false, normalize_tags, remove_ref, GitContext};
use crate::entity_id::new_entity_id;

labeled_enum! {
    pub enum ArtifactType as "artifact type" {
        Plan => "plan" | "plans",
        Proposal => "proposal" | "proposals",
        Analysis => "analysis" | "analyses",
        Update => "update" | "updates",
        Decision => "decision" | "decisions",
    }
}

impl ArtifactType {
    pub fn dir_name(self) -> &'static str {
        match self {
            ArtifactType::Plan => "plans",
            ArtifactType::Proposal => "proposals",
            ArtifactType::Analysis => "analysis",
            ArtifactType::Update => "updates",
            ArtifactType::Decision => "decisions",
        }
    }

    pub fn filename_prefix(self) -> &'static str {
        self.as_str()
    }
}

labeled_enum! {
    pub enum ArtifactStatus as "artifact status" {
        Active => "active",
        Archived => "archived",
    }
}

labeled_enum! {
    pub enum ImplementationStatus as "implementation status" {
        NotStarted => "not_started" | "pending",
        InProgress => "in_progress",
        Implemented => "implemented" | "done",
        Abandoned => "abandoned",
    }
}

labeled_enum! {
    pub enum DecisionStatus as "decision status" {
        Proposed => "proposed",
        Accepted => "accepted",
        Rejected => "rejected",
        Superseded => "superseded",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub summary: String,
    #[serde(default)]
    pub technical_tags: Vec<String>,
    #[serde(default)]
    pub session_number: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_context: Option<GitContext>,
    #[serde(default)]
    pub(crate) related_artifacts: Vec<String>,
    #[serde(default)]
    pub(crate) work_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub metadata: ArtifactMetadata,
    #[serde(skip)]
    pub content: String,
    #[serde(skip)]
    pub file_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub status: ArtifactStatus,
    #[serde(default)]
    pub activity_score: f64,
    #[serde(default)]
    pub reference_count: u32,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_accessed_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub needs_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_status: Option<ImplementationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_status: Option<DecisionStatus>,
}

impl ArtifactMetadata {
    fn for_type(artifact_type: ArtifactType) -> Self {
        Self {
            status: ArtifactStatus::Active,
            activity_score: 0.0,
            reference_count: 0,
            last_accessed_at: None,
            needs_review: false,
            implementation_status: (artifact_type == ArtifactType::Plan)
                .then_some(ImplementationStatus::NotStarted),
            decision_status: (artifact_type == ArtifactType::Decision)
                .then_some(DecisionStatus::Proposed),
        }
    }
}

impl Artifact {
    pub fn new(
        artifact_type: ArtifactType,
        summary: &str,
        content: &str,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: new_entity_id(artifact_type.filename_prefix()),
            artifact_type,
            summary: summary.trim().to_string(),
            technical_tags: Vec::new(),
            session_number: 0,
            created_at: now,
            updated_at: now,
            git_context: None,
            related_artifacts: Vec::new(),
            work_refs: Vec::new(),
            group_id: None,
            metadata: ArtifactMetadata::for_type(artifact_type),
            content: content.to_string(),
            file_path: None,
        }
    }

    pub fn work_refs(&self) -> &[String] {
        &self.work_refs
    }

    pub fn related_artifacts(&self) -> &[String] {
        &self.related_artifacts
    }

    pub(crate) fn add_work_ref(&mut self, work_id: &str) -> bool {
        let changed = insert_ref(&mut self.work_refs, work_id);
        if changed {
            self.metadata.reference_count = self.metadata.reference_count.saturating_add(1);
        }
        changed
    }

    pub(crate) fn remove_work_ref(&mut self, work_id: &str) -> bool {
        let changed = remove_ref(&mut self.work_refs, work_id);
        if changed {
            self.metadata.reference_count = self.metadata.reference_count.saturating_sub(1);
        }
        changed
    }

    pub(crate) fn add_related(&mut self, artifact_id: &str) -> bool {
        insert_ref(&mut self.related_artifacts, artifact_id)
    }

    pub(crate) fn remove_related(&mut self, artifact_id: &str) -> bool {
        remove_ref(&mut self.related_artifacts, artifact_id)
    }

    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.technical_tags = normalize_tags(tags);
    }

    pub fn is_archived(&self) -> bool {
        self.metadata.status == ArtifactStatus::Archived
    }

    /// No work, no related artifact, no group and never referenced.
    pub fn is_orphaned(&self) -> bool {
        self.work_refs.is_empty()
            && self.related_artifacts.is_empty()
            && self.group_id.is_none()
            && self.metadata.reference_count == 0
    }

    pub fn last_activity(&self) -> OffsetDateTime {
        match self.metadata.last_accessed_at {
            Some(accessed) if accessed > self.updated_at => accessed,
            _ => self.updated_at,
        }
    }

    pub fn touch(&mut self, now: OffsetDateTime) {
        self.updated_at = now;
    }

    pub fn matches_query(&self, needle: &str) -> bool {
        self.id.to_ascii_lowercase().contains(needle)
            || self.summary.to_lowercase().contains(needle)
            || self.content.to_lowercase().contains(needle)
            || self
                .technical_tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::{Artifact, ArtifactType, DecisionStatus, ImplementationStatus};
    use std::str::FromStr;
    use time::macros::datetime;

    #[test]
    fn type_specific_metadata_is_seeded() {
        let now = datetime!(2026-02-01 09:00 UTC);
        let plan = Artifact::new(ArtifactType::Plan, "Rollout plan", "", now);
        assert_eq!(
            plan.metadata.implementation_status,
            Some(ImplementationStatus::NotStarted)
        );
        assert!(plan.metadata.decision_status.is_none());

        let decision = Artifact::new(ArtifactType::Decision, "Use sessions", "", now);
        assert_eq!(
            decision.metadata.decision_status,
            Some(DecisionStatus::Proposed)
        );
        assert!(decision.id.starts_with("decision-"));
    }

    #[test]
    fn plural_directory_names_parse_back() {
        for artifact_type in ArtifactType::ALL {
            assert_eq!(
                ArtifactType::from_str(artifact_type.dir_name()).unwrap(),
                *artifact_type
            );
        }
    }

    #[test]
    fn orphan_predicate_considers_every_link() {
        let now = datetime!(2026-02-01 09:00 UTC);
        let mut artifact = Artifact::new(ArtifactType::Analysis, "Perf dig", "", now);
        assert!(artifact.is_orphaned());

        artifact.add_work_ref("work-1");
        assert!(!artifact.is_orphaned());
        assert_eq!(artifact.metadata.reference_count, 1);

        artifact.remove_work_ref("work-1");
        assert_eq!(artifact.metadata.reference_count, 0);
        assert!(artifact.is_orphaned());

        artifact.group_id = Some("group-1".to_string());
        assert!(!artifact.is_orphaned());
    }
}
