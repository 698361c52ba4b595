use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::artifact::{Artifact, ArtifactType};
use super::metadata::{insert_ref, is_false, normalize_tags, remove_ref, GitContext};
use crate::config::GroupConfig;
use crate::entity_id::new_entity_id;

pub const GROUP_PREFIX: &str = "group";

labeled_enum! {
    pub enum GroupStatus as "group status" {
        Active => "active",
        Consolidated => "consolidated",
        Archived => "archived",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub theme: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_context: Option<GitContext>,
    #[serde(default)]
    pub session_number: u32,
    #[serde(default)]
    pub(crate) artifact_ids: Vec<String>,
    #[serde(default)]
    pub work_refs: Vec<String>,
    #[serde(default)]
    pub technical_tags: Vec<String>,
    pub metadata: GroupMetadata,
    #[serde(skip)]
    pub content: String,
    #[serde(skip)]
    pub file_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub status: GroupStatus,
    #[serde(default)]
    pub readiness_score: f64,
    #[serde(default)]
    pub cohesion_score: f64,
    #[serde(default)]
    pub artifact_count: usize,
    #[serde(default)]
    pub type_distribution: BTreeMap<ArtifactType, usize>,
    #[serde(default)]
    pub activity_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consolidated_to_work_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub needs_review: bool,
}

impl Group {
    pub fn new(name: &str, description: &str, theme: &str, now: OffsetDateTime) -> Self {
        Self {
            id: new_entity_id(GROUP_PREFIX),
            name: name.trim().to_string(),
            description: description.trim().to_string(),
            theme: theme.trim().to_string(),
            created_at: now,
            updated_at: now,
            git_context: None,
            session_number: 0,
            artifact_ids: Vec::new(),
            work_refs: Vec::new(),
            technical_tags: Vec::new(),
            metadata: GroupMetadata {
                status: GroupStatus::Active,
                readiness_score: 0.0,
                cohesion_score: 0.0,
                artifact_count: 0,
                type_distribution: BTreeMap::new(),
                activity_score: 0.0,
                consolidated_to_work_id: None,
                needs_review: false,
            },
            content: String::new(),
            file_path: None,
        }
    }

    pub fn artifact_ids(&self) -> &[String] {
        &self.artifact_ids
    }

    pub(crate) fn add_artifact_id(&mut self, artifact_id: &str) -> bool {
        let changed = insert_ref(&mut self.artifact_ids, artifact_id);
        self.metadata.artifact_count = self.artifact_ids.len();
        changed
    }

    pub(crate) fn remove_artifact_id(&mut self, artifact_id: &str) -> bool {
        let changed = remove_ref(&mut self.artifact_ids, artifact_id);
        self.metadata.artifact_count = self.artifact_ids.len();
        changed
    }

    pub fn is_active(&self) -> bool {
        self.metadata.status == GroupStatus::Active
    }

    pub fn touch(&mut self, now: OffsetDateTime) {
        self.updated_at = now;
    }

    /// Recomputes cohesion and readiness from the member artifacts.
    ///
    /// `members` may contain artifacts outside the group; only ids listed in
    /// `artifact_ids` are considered.
    pub fn calculate_scores(&mut self, members: &[Artifact]) {
        let members = self.members_of(members);
        self.metadata.artifact_count = self.artifact_ids.len();
        self.metadata.cohesion_score = cohesion(&members);

        let count = self.artifact_ids.len() as f64;
        let distinct_types: BTreeSet<ArtifactType> =
            members.iter().map(|artifact| artifact.artifact_type).collect();
        let has_direction = members.iter().any(|artifact| {
            matches!(
                artifact.artifact_type,
                ArtifactType::Plan | ArtifactType::Proposal
            )
        });

        let size_factor = (count / 3.0).min(1.0);
        let diversity_factor = (distinct_types.len() as f64 / 3.0).min(1.0);
        let direction_factor = if has_direction { 1.0 } else { 0.0 };
        self.metadata.readiness_score = 0.3 * size_factor
            + 0.3 * diversity_factor
            + 0.2 * direction_factor
            + 0.2 * self.metadata.cohesion_score;
    }

    pub fn update_type_distribution(&mut self, members: &[Artifact]) {
        let mut distribution = BTreeMap::new();
        for artifact in self.members_of(members) {
            *distribution.entry(artifact.artifact_type).or_insert(0) += 1;
        }
        self.metadata.type_distribution = distribution;
        self.metadata.artifact_count = self.artifact_ids.len();
    }

    /// Union of member tags, most frequent first.
    pub fn collect_tags(&mut self, members: &[Artifact]) {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for artifact in self.members_of(members) {
            for tag in &artifact.technical_tags {
                *counts.entry(tag.clone()).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(&right.0)));
        self.technical_tags = normalize_tags(ranked.into_iter().map(|(tag, _)| tag));
    }

    pub fn is_ready_for_work(&self, config: &GroupConfig) -> bool {
        self.is_active()
            && self.artifact_ids.len() >= config.min_artifacts
            && self.metadata.readiness_score >= config.min_readiness
    }

    pub fn should_merge(&self, config: &GroupConfig) -> bool {
        self.is_active() && self.artifact_ids.len() < config.min_artifacts
    }

    pub fn should_split(&self, config: &GroupConfig) -> bool {
        let count = self.artifact_ids.len();
        self.is_active()
            && (count > config.max_artifacts
                || (count >= 4 && self.metadata.cohesion_score < config.split_cohesion))
    }

    fn members_of<'a>(&self, candidates: &'a [Artifact]) -> Vec<&'a Artifact> {
        candidates
            .iter()
            .filter(|artifact| self.artifact_ids.contains(&artifact.id))
            .collect()
    }
}

/// Mean pairwise Jaccard similarity of member tag sets.
fn cohesion(members: &[&Artifact]) -> f64 {
    match members.len() {
        0 => return 0.0,
        1 => return 1.0,
        _ => {}
    }

    let tag_sets: Vec<BTreeSet<&str>> = members
        .iter()
        .map(|artifact| artifact.technical_tags.iter().map(String::as_str).collect())
        .collect();

    let mut total = 0.0;
    let mut pairs = 0usize;
    for (index, left) in tag_sets.iter().enumerate() {
        for right in &tag_sets[index + 1..] {
            let union = left.union(right).count();
            if union > 0 {
                total += left.intersection(right).count() as f64 / union as f64;
            }
            pairs += 1;
        }
    }

    total / pairs as f64
}
