use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::GroupConfig;
use crate::domain::artifact::{Artifact, ArtifactType};
use crate::domain::group::{Group, GroupStatus};
use crate::domain::metadata::now_utc;
use crate::domain::schedule::{Priority, Schedule};
use crate::domain::work::Work;
use crate::domain::EntityKind;
use crate::lifecycle::Decaying;
use crate::store::{EntityStore, StoreError};

labeled_enum! {
    pub enum ConsolidationMethod as "consolidation method" {
        Automatic => "automatic" | "auto",
        Manual => "manual",
    }
}

#[derive(Debug, Clone)]
pub struct Consolidation {
    pub work: Work,
    pub group: Group,
    /// Member artifacts whose back-reference could not be written.
    pub unlinked_artifacts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupHealthReport {
    pub total_groups: usize,
    pub active: usize,
    pub consolidated: usize,
    pub archived: usize,
    pub ready_for_work: Vec<String>,
    pub should_merge: Vec<String>,
    pub should_split: Vec<String>,
    pub average_readiness: f64,
    pub average_cohesion: f64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSuggestion {
    pub tag: String,
    pub artifact_ids: Vec<String>,
    pub types: Vec<ArtifactType>,
    pub estimated_readiness: f64,
    pub estimated_cohesion: f64,
}

pub struct GroupManager<'a> {
    store: &'a EntityStore,
    config: &'a GroupConfig,
}

impl<'a> GroupManager<'a> {
    pub fn new(store: &'a EntityStore, config: &'a GroupConfig) -> Self {
        Self { store, config }
    }

    pub fn create_group(
        &self,
        name: &str,
        description: &str,
        theme: &str,
        artifact_ids: &[String],
    ) -> Result<Group, StoreError> {
        if name.trim().is_empty() {
            return Err(StoreError::Validation(
                "group name must not be empty".to_string(),
            ));
        }

        let now = now_utc();
        let artifacts = self.store.list_all_artifacts()?;
        let by_id = index_by_id(&artifacts);
        for id in artifact_ids {
            if !by_id.contains_key(id.as_str()) {
                return Err(StoreError::not_found(EntityKind::Artifact, id));
            }
        }

        let mut group = Group::new(name, description, theme, now);
        group.session_number = self.store.config().session_number;
        for id in artifact_ids {
            group.add_artifact_id(id);
        }
        refresh_derived(&mut group, &artifacts, now);
        self.store.write_group(&mut group)?;

        for id in group.artifact_ids() {
            if let Some(artifact) = by_id.get(id.as_str()) {
                let mut artifact = (*artifact).clone();
                if let Some(previous) = artifact.group_id.as_deref() {
                    if previous != group.id {
                        warn!(
                            artifact_id = %artifact.id,
                            previous_group = previous,
                            group_id = %group.id,
                            "artifact moves to a new group"
                        );
                    }
                }
                artifact.group_id = Some(group.id.clone());
                artifact.touch(now);
                self.store.write_artifact(&mut artifact)?;
            }
        }

        info!(group_id = %group.id, members = group.artifact_ids().len(), "group created");
        Ok(group)
    }

    pub fn update_group(&self, group: &mut Group) -> Result<(), StoreError> {
        let now = now_utc();
        let artifacts = self.store.list_all_artifacts()?;
        refresh_derived(group, &artifacts, now);
        group.touch(now);
        self.store.write_group(group)?;
        Ok(())
    }

    pub fn add_artifact(&self, group_id: &str, artifact_id: &str) -> Result<Group, StoreError> {
        let mut group = self.store.find_group(group_id)?;
        let mut artifact = self.store.find_artifact(artifact_id)?;
        if !group.is_active() {
            return Err(StoreError::Validation(format!(
                "group '{}' is {} and cannot take new artifacts",
                group.id, group.metadata.status
            )));
        }

        if group.add_artifact_id(artifact_id) {
            self.update_group(&mut group)?;
        }
        if artifact.group_id.as_deref() != Some(group.id.as_str()) {
            artifact.group_id = Some(group.id.clone());
            artifact.touch(now_utc());
            self.store.write_artifact(&mut artifact)?;
        }
        Ok(group)
    }

    pub fn remove_artifact(&self, group_id: &str, artifact_id: &str) -> Result<Group, StoreError> {
        let mut group = self.store.find_group(group_id)?;
        if group.remove_artifact_id(artifact_id) {
            self.update_group(&mut group)?;
        }
        match self.store.find_artifact(artifact_id) {
            Ok(mut artifact) if artifact.group_id.as_deref() == Some(group.id.as_str()) => {
                artifact.group_id = None;
                artifact.touch(now_utc());
                self.store.write_artifact(&mut artifact)?;
            }
            Ok(_) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        Ok(group)
    }

    /// Removes the group document. Member back-references are cleared best
    /// effort.
    pub fn delete_group(&self, group_id: &str) -> Result<Group, StoreError> {
        let group = self.store.find_group(group_id)?;
        for id in group.artifact_ids() {
            let cleared = self.store.find_artifact(id).and_then(|mut artifact| {
                if artifact.group_id.as_deref() == Some(group.id.as_str()) {
                    artifact.group_id = None;
                    artifact.touch(now_utc());
                    self.store.write_artifact(&mut artifact)?;
                }
                Ok(())
            });
            if let Err(err) = cleared {
                warn!(group_id = %group.id, artifact_id = %id, error = %err, "failed to clear group reference");
            }
        }
        self.store.delete_group(&group)?;
        info!(group_id = %group.id, "group deleted");
        Ok(group)
    }

    /// Promotes a ready group into a new Work that references every member.
    pub fn consolidate_group_to_work(
        &self,
        group_id: &str,
        method: ConsolidationMethod,
    ) -> Result<Consolidation, StoreError> {
        self.consolidate_group_to_work_with(group_id, method, |_| Ok(()))
    }

    /// `before_work_write` sees the new Work before anything is written and
    /// can veto the consolidation.
    pub fn consolidate_group_to_work_with<E, F>(
        &self,
        group_id: &str,
        method: ConsolidationMethod,
        before_work_write: F,
    ) -> Result<Consolidation, E>
    where
        E: From<StoreError>,
        F: FnOnce(&Work) -> Result<(), E>,
    {
        let now = now_utc();
        let mut group = self.store.find_group(group_id)?;
        let artifacts = self.store.list_all_artifacts()?;
        refresh_derived(&mut group, &artifacts, now);

        if !group.is_ready_for_work(self.config) {
            return Err(StoreError::Validation(format!(
                "group '{}' is not ready for work (status {}, {} artifacts, readiness {:.2})",
                group.id,
                group.metadata.status,
                group.artifact_ids().len(),
                group.metadata.readiness_score
            ))
            .into());
        }

        let by_id = index_by_id(&artifacts);
        let members: Vec<&Artifact> = group
            .artifact_ids()
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).copied())
            .collect();

        let schedule = if group.metadata.readiness_score >= self.config.immediate_readiness {
            Schedule::Now
        } else {
            Schedule::Next
        };
        let has_decision = members
            .iter()
            .any(|artifact| artifact.artifact_type == ArtifactType::Decision);
        let priority = if group.artifact_ids().len() >= 5 || has_decision {
            Priority::High
        } else {
            Priority::Medium
        };
        let description = if group.description.is_empty() {
            group.theme.clone()
        } else {
            group.description.clone()
        };

        let mut work = Work::new(&group.name, &description, schedule, priority, now);
        work.session_number = self.store.config().session_number;
        work.git_context = group.git_context.clone();
        work.group_id = Some(group.id.clone());
        work.metadata.consolidation_method = Some(method.as_str().to_string());
        work.set_tags(
            members
                .iter()
                .flat_map(|artifact| artifact.technical_tags.iter()),
        );
        for member in &members {
            work.add_artifact_ref(&member.id);
        }
        work.content = consolidation_body(&group, &members);
        before_work_write(&work)?;
        self.store.write_work(&mut work)?;

        group.metadata.status = GroupStatus::Consolidated;
        group.metadata.consolidated_to_work_id = Some(work.id.clone());
        if !group.work_refs.contains(&work.id) {
            group.work_refs.push(work.id.clone());
        }
        group.touch(now);
        self.store.write_group(&mut group)?;

        let mut unlinked_artifacts = Vec::new();
        for member in &members {
            let mut artifact = (*member).clone();
            artifact.add_work_ref(&work.id);
            artifact.touch(now);
            if let Err(err) = self.store.write_artifact(&mut artifact) {
                warn!(
                    artifact_id = %artifact.id,
                    work_id = %work.id,
                    error = %err,
                    "failed to link artifact to consolidated work"
                );
                unlinked_artifacts.push(artifact.id.clone());
            }
        }

        info!(
            group_id = %group.id,
            work_id = %work.id,
            schedule = %work.schedule,
            method = %method,
            "group consolidated into work"
        );
        Ok(Consolidation {
            work,
            group,
            unlinked_artifacts,
        })
    }

    pub fn analyze_group_health(&self) -> Result<GroupHealthReport, StoreError> {
        let now = now_utc();
        let artifacts = self.store.list_all_artifacts()?;
        let mut groups = self.store.list_groups()?;

        let mut report = GroupHealthReport {
            total_groups: groups.len(),
            ..GroupHealthReport::default()
        };
        let mut readiness_total = 0.0;
        let mut cohesion_total = 0.0;

        for group in &mut groups {
            match group.metadata.status {
                GroupStatus::Active => report.active += 1,
                GroupStatus::Consolidated => {
                    report.consolidated += 1;
                    continue;
                }
                GroupStatus::Archived => {
                    report.archived += 1;
                    continue;
                }
            }

            refresh_derived(group, &artifacts, now);
            readiness_total += group.metadata.readiness_score;
            cohesion_total += group.metadata.cohesion_score;
            if group.is_ready_for_work(self.config) {
                report.ready_for_work.push(group.id.clone());
            }
            if group.should_merge(self.config) {
                report.should_merge.push(group.id.clone());
            }
            if group.should_split(self.config) {
                report.should_split.push(group.id.clone());
            }
        }

        if report.active > 0 {
            report.average_readiness = readiness_total / report.active as f64;
            report.average_cohesion = cohesion_total / report.active as f64;
        }
        report.recommendations = recommendations(&report);
        debug!(groups = report.total_groups, active = report.active, "group health analyzed");
        Ok(report)
    }

    /// Proposes groups from tags shared by ungrouped, active artifacts.
    /// Nothing is written.
    pub fn suggest_groups(&self, min_size: usize) -> Result<Vec<GroupSuggestion>, StoreError> {
        let now = now_utc();
        let candidates: Vec<Artifact> = self
            .store
            .list_all_artifacts()?
            .into_iter()
            .filter(|artifact| artifact.group_id.is_none() && !artifact.is_archived())
            .collect();

        let mut clusters: BTreeMap<&str, Vec<&Artifact>> = BTreeMap::new();
        for artifact in &candidates {
            for tag in &artifact.technical_tags {
                clusters.entry(tag.as_str()).or_default().push(artifact);
            }
        }

        let mut suggestions = Vec::new();
        for (tag, members) in clusters {
            if members.len() < min_size.max(1) {
                continue;
            }
            let mut probe = Group::new(tag, "", tag, now);
            for artifact in &members {
                probe.add_artifact_id(&artifact.id);
            }
            probe.calculate_scores(&candidates);
            probe.update_type_distribution(&candidates);

            suggestions.push(GroupSuggestion {
                tag: tag.to_string(),
                artifact_ids: probe.artifact_ids().to_vec(),
                types: probe.metadata.type_distribution.keys().copied().collect(),
                estimated_readiness: probe.metadata.readiness_score,
                estimated_cohesion: probe.metadata.cohesion_score,
            });
        }

        suggestions.sort_by(|left, right| {
            right
                .artifact_ids
                .len()
                .cmp(&left.artifact_ids.len())
                .then_with(|| left.tag.cmp(&right.tag))
        });
        Ok(suggestions)
    }
}

pub(crate) fn refresh_derived(group: &mut Group, artifacts: &[Artifact], now: OffsetDateTime) {
    group.calculate_scores(artifacts);
    group.update_type_distribution(artifacts);
    group.collect_tags(artifacts);
    group.calculate_activity_score(now);
}

fn index_by_id(artifacts: &[Artifact]) -> HashMap<&str, &Artifact> {
    artifacts
        .iter()
        .map(|artifact| (artifact.id.as_str(), artifact))
        .collect()
}

fn consolidation_body(group: &Group, members: &[&Artifact]) -> String {
    let mut body = format!("Consolidated from group {} ({}).\n\n", group.name, group.id);
    body.push_str("## Source artifacts\n");
    for artifact in members {
        body.push_str(&format!(
            "\n- [{}] {} ({})",
            artifact.artifact_type, artifact.summary, artifact.id
        ));
    }
    body
}

fn recommendations(report: &GroupHealthReport) -> Vec<String> {
    let mut out = Vec::new();
    if !report.ready_for_work.is_empty() {
        out.push(format!(
            "{} group(s) are ready to become work",
            report.ready_for_work.len()
        ));
    }
    if !report.should_merge.is_empty() {
        out.push(format!(
            "{} group(s) are too small and should be merged",
            report.should_merge.len()
        ));
    }
    if !report.should_split.is_empty() {
        out.push(format!(
            "{} group(s) are too broad and should be split",
            report.should_split.len()
        ));
    }
    if report.active > 0 && report.average_cohesion < 0.3 {
        out.push("average cohesion is low; review group membership".to_string());
    }
    if out.is_empty() && report.active > 0 {
        out.push("groups look healthy".to_string());
    }
    out
}
