use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::artifact::Artifact;
use crate::domain::metadata::{normalize_tags, now_utc};
use crate::domain::work::Work;
use crate::domain::EntityKind;
use crate::store::{EntityStore, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssociationGraph {
    pub work_to_artifacts: BTreeMap<String, Vec<String>>,
    pub artifact_to_work: BTreeMap<String, Vec<String>>,
    pub artifact_to_artifact: BTreeMap<String, Vec<String>>,
    pub orphaned_artifacts: Vec<String>,
    /// Tag → ids of the artifacts carrying it.
    pub tag_clusters: BTreeMap<String, Vec<String>>,
}

impl AssociationGraph {
    pub fn from_entities(work: &[Work], artifacts: &[Artifact]) -> Self {
        let mut graph = AssociationGraph::default();

        for item in work {
            graph
                .work_to_artifacts
                .insert(item.id.clone(), item.artifact_refs().to_vec());
        }

        for artifact in artifacts {
            graph
                .artifact_to_work
                .insert(artifact.id.clone(), artifact.work_refs().to_vec());
            if !artifact.related_artifacts().is_empty() {
                graph
                    .artifact_to_artifact
                    .insert(artifact.id.clone(), artifact.related_artifacts().to_vec());
            }
            if artifact.is_orphaned() && !artifact.is_archived() {
                graph.orphaned_artifacts.push(artifact.id.clone());
            }
            for tag in &artifact.technical_tags {
                graph
                    .tag_clusters
                    .entry(tag.clone())
                    .or_default()
                    .push(artifact.id.clone());
            }
        }

        graph.orphaned_artifacts.sort();
        for members in graph.tag_clusters.values_mut() {
            members.sort();
        }
        graph
    }

    pub fn association_count(&self) -> usize {
        self.work_to_artifacts.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone)]
pub struct Association {
    pub work: Work,
    pub artifact: Artifact,
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarEntity {
    pub kind: EntityKind,
    pub id: String,
    pub title: String,
    pub overlap: usize,
    pub shared_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionCount {
    pub id: String,
    pub connections: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssociationSummary {
    pub total_work: usize,
    pub total_artifacts: usize,
    pub total_associations: usize,
    pub orphaned_artifacts: usize,
    pub work_without_artifacts: usize,
    pub most_connected_work: Option<ConnectionCount>,
    pub most_connected_artifact: Option<ConnectionCount>,
}

pub struct GraphBuilder<'a> {
    store: &'a EntityStore,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(store: &'a EntityStore) -> Self {
        Self { store }
    }

    pub fn build_graph(&self) -> Result<AssociationGraph, StoreError> {
        let work = self.store.list_all_work()?;
        let artifacts = self.store.list_all_artifacts()?;
        Ok(AssociationGraph::from_entities(&work, &artifacts))
    }

    /// Links a Work and an Artifact on both sides. Associating twice is a
    /// no-op; a half-written link is repaired.
    ///
    /// The artifact is written first. If the Work write then fails the
    /// artifact is restored, so the pair never ends up one-sided.
    pub fn create_association(
        &self,
        work_id: &str,
        artifact_id: &str,
    ) -> Result<Association, StoreError> {
        let mut work = self.store.find_work(work_id)?;
        let mut artifact = self.store.find_artifact(artifact_id)?;

        let work_changed = !work.artifact_refs().iter().any(|id| id == artifact_id);
        let artifact_changed = !artifact.work_refs().iter().any(|id| id == work_id);
        if !work_changed && !artifact_changed {
            return Ok(Association {
                work,
                artifact,
                changed: false,
            });
        }

        let now = now_utc();
        let original_artifact = artifact.clone();
        if artifact_changed {
            artifact.add_work_ref(work_id);
            artifact.touch(now);
            self.store.write_artifact(&mut artifact)?;
        }
        if work_changed {
            work.add_artifact_ref(artifact_id);
            work.touch(now);
            if let Err(err) = self.store.write_work(&mut work) {
                if artifact_changed {
                    self.restore_artifact(original_artifact);
                }
                return Err(err);
            }
        }

        debug!(work_id, artifact_id, "association created");
        Ok(Association {
            work,
            artifact,
            changed: true,
        })
    }

    pub fn remove_association(
        &self,
        work_id: &str,
        artifact_id: &str,
    ) -> Result<Association, StoreError> {
        let mut work = self.store.find_work(work_id)?;
        let mut artifact = self.store.find_artifact(artifact_id)?;

        let work_changed = work.artifact_refs().iter().any(|id| id == artifact_id);
        let artifact_changed = artifact.work_refs().iter().any(|id| id == work_id);
        if !work_changed && !artifact_changed {
            return Ok(Association {
                work,
                artifact,
                changed: false,
            });
        }

        let now = now_utc();
        let original_artifact = artifact.clone();
        if artifact_changed {
            artifact.remove_work_ref(work_id);
            artifact.touch(now);
            self.store.write_artifact(&mut artifact)?;
        }
        if work_changed {
            work.remove_artifact_ref(artifact_id);
            work.touch(now);
            if let Err(err) = self.store.write_work(&mut work) {
                if artifact_changed {
                    self.restore_artifact(original_artifact);
                }
                return Err(err);
            }
        }

        debug!(work_id, artifact_id, "association removed");
        Ok(Association {
            work,
            artifact,
            changed: true,
        })
    }

    pub fn link_related(&self, left_id: &str, right_id: &str) -> Result<bool, StoreError> {
        if left_id == right_id {
            return Err(StoreError::Validation(
                "an artifact cannot be related to itself".to_string(),
            ));
        }
        let mut left = self.store.find_artifact(left_id)?;
        let mut right = self.store.find_artifact(right_id)?;
        let now = now_utc();

        let original_left = left.clone();
        let left_changed = left.add_related(right_id);
        let right_changed = right.add_related(left_id);
        if left_changed {
            left.touch(now);
            self.store.write_artifact(&mut left)?;
        }
        if right_changed {
            right.touch(now);
            if let Err(err) = self.store.write_artifact(&mut right) {
                if left_changed {
                    self.restore_artifact(original_left);
                }
                return Err(err);
            }
        }
        Ok(left_changed || right_changed)
    }

    pub fn unlink_related(&self, left_id: &str, right_id: &str) -> Result<bool, StoreError> {
        let mut left = self.store.find_artifact(left_id)?;
        let mut right = self.store.find_artifact(right_id)?;
        let now = now_utc();

        let original_left = left.clone();
        let left_changed = left.remove_related(right_id);
        let right_changed = right.remove_related(left_id);
        if left_changed {
            left.touch(now);
            self.store.write_artifact(&mut left)?;
        }
        if right_changed {
            right.touch(now);
            if let Err(err) = self.store.write_artifact(&mut right) {
                if left_changed {
                    self.restore_artifact(original_left);
                }
                return Err(err);
            }
        }
        Ok(left_changed || right_changed)
    }

    /// Artifacts a Work points at. References to missing artifacts are
    /// dropped from the result.
    pub fn resolve_work_artifacts(&self, work_id: &str) -> Result<Vec<Artifact>, StoreError> {
        let work = self.store.find_work(work_id)?;
        let mut by_id: HashMap<String, Artifact> = self
            .store
            .list_all_artifacts()?
            .into_iter()
            .map(|artifact| (artifact.id.clone(), artifact))
            .collect();
        Ok(work
            .artifact_refs()
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect())
    }

    pub fn resolve_artifact_work(&self, artifact_id: &str) -> Result<Vec<Work>, StoreError> {
        let artifact = self.store.find_artifact(artifact_id)?;
        let mut by_id: HashMap<String, Work> = self
            .store
            .list_all_work()?
            .into_iter()
            .map(|work| (work.id.clone(), work))
            .collect();
        Ok(artifact
            .work_refs()
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect())
    }

    pub fn find_similar_by_tags(
        &self,
        tags: &[String],
        exclude_id: Option<&str>,
    ) -> Result<Vec<SimilarEntity>, StoreError> {
        let wanted: BTreeSet<String> = normalize_tags(tags).into_iter().collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut similar = Vec::new();
        for work in self.store.list_all_work()? {
            if let Some(entity) = similar_entity(
                EntityKind::Work,
                &work.id,
                &work.title,
                &work.technical_tags,
                &wanted,
            ) {
                similar.push(entity);
            }
        }
        for artifact in self.store.list_all_artifacts()? {
            if let Some(entity) = similar_entity(
                EntityKind::Artifact,
                &artifact.id,
                &artifact.summary,
                &artifact.technical_tags,
                &wanted,
            ) {
                similar.push(entity);
            }
        }

        similar.retain(|entity| Some(entity.id.as_str()) != exclude_id);
        similar.sort_by(|left, right| {
            right
                .overlap
                .cmp(&left.overlap)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(similar)
    }

    pub fn get_association_summary(&self) -> Result<AssociationSummary, StoreError> {
        let work = self.store.list_all_work()?;
        let artifacts = self.store.list_all_artifacts()?;
        let graph = AssociationGraph::from_entities(&work, &artifacts);

        Ok(AssociationSummary {
            total_work: work.len(),
            total_artifacts: artifacts.len(),
            total_associations: graph.association_count(),
            orphaned_artifacts: graph.orphaned_artifacts.len(),
            work_without_artifacts: work
                .iter()
                .filter(|item| !item.is_terminal() && item.artifact_refs().is_empty())
                .count(),
            most_connected_work: most_connected(&graph.work_to_artifacts),
            most_connected_artifact: most_connected(&graph.artifact_to_work),
        })
    }

    pub fn get_orphaned_artifacts(&self) -> Result<Vec<Artifact>, StoreError> {
        let artifacts = self.store.list_all_artifacts()?;
        Ok(artifacts
            .into_iter()
            .filter(|artifact| artifact.is_orphaned() && !artifact.is_archived())
            .collect())
    }

    fn restore_artifact(&self, mut original: Artifact) {
        if let Err(err) = self.store.write_artifact(&mut original) {
            warn!(
                artifact_id = %original.id,
                error = %err,
                "failed to roll back artifact after work write failure"
            );
        }
    }
}

fn similar_entity(
    kind: EntityKind,
    id: &str,
    title: &str,
    tags: &[String],
    wanted: &BTreeSet<String>,
) -> Option<SimilarEntity> {
    let shared_tags: Vec<String> = tags
        .iter()
        .filter(|tag| wanted.contains(*tag))
        .cloned()
        .collect();
    if shared_tags.is_empty() {
        return None;
    }
    Some(SimilarEntity {
        kind,
        id: id.to_string(),
        title: title.to_string(),
        overlap: shared_tags.len(),
        shared_tags,
    })
}

fn most_connected(edges: &BTreeMap<String, Vec<String>>) -> Option<ConnectionCount> {
    edges
        .iter()
        .filter(|(_, targets)| !targets.is_empty())
        .max_by(|(left_id, left), (right_id, right)| {
            left.len()
                .cmp(&right.len())
                .then_with(|| right_id.cmp(left_id))
        })
        .map(|(id, targets)| ConnectionCount {
            id: id.clone(),
            connections: targets.len(),
        })
}

#[cfg(test)]
mod tests;
