use super::{AssociationGraph, GraphBuilder};
use crate::config::StoreConfig;
use crate::domain::artifact::{Artifact, ArtifactType};
use crate::domain::schedule::{Priority, Schedule};
use crate::domain::work::Work;
use crate::domain::EntityKind;
use crate::store::{EntityStore, StoreError};
use std::path::PathBuf;
use time::macros::datetime;
use uuid::Uuid;

fn unique_workspace() -> PathBuf {
    let root = std::env::temp_dir().join(format!("worktrail-graph-test-{}", Uuid::now_v7()));
    std::fs::create_dir_all(&root).expect("temp workspace should be creatable");
    root
}

fn seed_work(store: &EntityStore, title: &str, tags: &[&str]) -> Work {
    let mut work = Work::new(
        title,
        "",
        Schedule::Now,
        Priority::Medium,
        datetime!(2026-04-01 09:00 UTC),
    );
    work.set_tags(tags.iter().copied());
    store.write_work(&mut work).expect("work write should succeed");
    work
}

fn seed_artifact(
    store: &EntityStore,
    artifact_type: ArtifactType,
    summary: &str,
    tags: &[&str],
) -> Artifact {
    let mut artifact = Artifact::new(
        artifact_type,
        summary,
        "",
        datetime!(2026-04-01 09:00 UTC),
    );
    artifact.set_tags(tags.iter().copied());
    store
        .write_artifact(&mut artifact)
        .expect("artifact write should succeed");
    artifact
}

#[test]
fn association_updates_both_sides_and_is_idempotent() {
    let root = unique_workspace();
    let store = EntityStore::new(&root, StoreConfig::default());
    let graph = GraphBuilder::new(&store);

    let work = seed_work(&store, "Fix login bug", &[]);
    let artifact = seed_artifact(&store, ArtifactType::Analysis, "Cookie analysis", &[]);

    let first = graph
        .create_association(&work.id, &artifact.id)
        .expect("association should succeed");
    assert!(first.changed);

    let second = graph
        .create_association(&work.id, &artifact.id)
        .expect("repeat association should succeed");
    assert!(!second.changed);

    let stored_work = store.find_work(&work.id).expect("work should exist");
    let stored_artifact = store.find_artifact(&artifact.id).expect("artifact should exist");
    assert_eq!(stored_work.artifact_refs(), [artifact.id.clone()]);
    assert_eq!(stored_work.metadata.artifact_count, 1);
    assert_eq!(stored_artifact.work_refs(), [work.id.clone()]);
    assert_eq!(stored_artifact.metadata.reference_count, 1);

    graph
        .remove_association(&work.id, &artifact.id)
        .expect("removal should succeed");
    let stored_work = store.find_work(&work.id).expect("work should exist");
    let stored_artifact = store.find_artifact(&artifact.id).expect("artifact should exist");
    assert!(stored_work.artifact_refs().is_empty());
    assert!(stored_artifact.work_refs().is_empty());
    assert_eq!(stored_artifact.metadata.reference_count, 0);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn association_with_missing_entity_is_not_found_and_writes_nothing() {
    let root = unique_workspace();
    let store = EntityStore::new(&root, StoreConfig::default());
    let graph = GraphBuilder::new(&store);

    let work = seed_work(&store, "Lonely", &[]);
    let err = graph
        .create_association(&work.id, "analysis-missing")
        .expect_err("missing artifact should fail");
    assert!(matches!(
        err,
        StoreError::NotFound {
            kind: EntityKind::Artifact,
            ..
        }
    ));
    let stored = store.find_work(&work.id).expect("work should exist");
    assert!(stored.artifact_refs().is_empty());

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn orphan_detection_follows_associations() {
    let root = unique_workspace();
    let store = EntityStore::new(&root, StoreConfig::default());
    let graph = GraphBuilder::new(&store);

    let work = seed_work(&store, "Fix login bug", &[]);
    let artifact = seed_artifact(&store, ArtifactType::Plan, "Login plan", &[]);

    let orphans = graph
        .get_orphaned_artifacts()
        .expect("orphan scan should succeed");
    assert!(orphans.iter().any(|orphan| orphan.id == artifact.id));

    graph
        .create_association(&work.id, &artifact.id)
        .expect("association should succeed");
    let orphans = graph
        .get_orphaned_artifacts()
        .expect("orphan scan should succeed");
    assert!(orphans.iter().all(|orphan| orphan.id != artifact.id));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn related_links_are_symmetric() {
    let root = unique_workspace();
    let store = EntityStore::new(&root, StoreConfig::default());
    let graph = GraphBuilder::new(&store);

    let plan = seed_artifact(&store, ArtifactType::Plan, "Plan", &[]);
    let decision = seed_artifact(&store, ArtifactType::Decision, "Decision", &[]);

    assert!(graph
        .link_related(&plan.id, &decision.id)
        .expect("link should succeed"));
    assert!(!graph
        .link_related(&decision.id, &plan.id)
        .expect("relink should succeed"));

    let built = graph.build_graph().expect("graph should build");
    assert_eq!(
        built.artifact_to_artifact.get(&plan.id),
        Some(&vec![decision.id.clone()])
    );
    assert_eq!(
        built.artifact_to_artifact.get(&decision.id),
        Some(&vec![plan.id.clone()])
    );
    assert!(built.orphaned_artifacts.is_empty());

    assert!(graph
        .unlink_related(&plan.id, &decision.id)
        .expect("unlink should succeed"));
    assert_eq!(
        graph
            .get_orphaned_artifacts()
            .expect("orphan scan should succeed")
            .len(),
        2
    );

    let self_link = graph.link_related(&plan.id, &plan.id);
    assert!(matches!(self_link, Err(StoreError::Validation(_))));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn resolution_drops_dangling_references() {
    let root = unique_workspace();
    let store = EntityStore::new(&root, StoreConfig::default());
    let graph = GraphBuilder::new(&store);

    let mut work = seed_work(&store, "Dangling", &[]);
    let artifact = seed_artifact(&store, ArtifactType::Analysis, "Real", &[]);
    graph
        .create_association(&work.id, &artifact.id)
        .expect("association should succeed");

    work = store.find_work(&work.id).expect("work should exist");
    work.add_artifact_ref("analysis-deleted");
    store.write_work(&mut work).expect("write should succeed");

    let resolved = graph
        .resolve_work_artifacts(&work.id)
        .expect("resolution should succeed");
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].id, artifact.id);

    let owners = graph
        .resolve_artifact_work(&artifact.id)
        .expect("resolution should succeed");
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].id, work.id);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn similar_entities_rank_by_overlap_then_id() {
    let root = unique_workspace();
    let store = EntityStore::new(&root, StoreConfig::default());
    let graph = GraphBuilder::new(&store);

    let work = seed_work(&store, "Auth rework", &["auth", "login", "session"]);
    let both = seed_artifact(&store, ArtifactType::Analysis, "Both", &["auth", "login"]);
    let one_a = seed_artifact(&store, ArtifactType::Plan, "One", &["auth"]);
    let one_b = seed_artifact(&store, ArtifactType::Decision, "Other", &["login"]);
    seed_artifact(&store, ArtifactType::Plan, "Unrelated", &["billing"]);

    let tags = vec!["Auth".to_string(), "login".to_string()];
    let similar = graph
        .find_similar_by_tags(&tags, Some(&work.id))
        .expect("similarity should succeed");

    assert_eq!(similar.len(), 3);
    assert_eq!(similar[0].id, both.id);
    assert_eq!(similar[0].overlap, 2);
    let mut singles = vec![one_a.id.clone(), one_b.id.clone()];
    singles.sort();
    assert_eq!(similar[1].id, singles[0]);
    assert_eq!(similar[2].id, singles[1]);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn summary_reports_totals_and_most_connected() {
    let root = unique_workspace();
    let store = EntityStore::new(&root, StoreConfig::default());
    let graph = GraphBuilder::new(&store);

    let busy = seed_work(&store, "Busy", &[]);
    let idle = seed_work(&store, "Idle", &[]);
    let first = seed_artifact(&store, ArtifactType::Plan, "First", &[]);
    let second = seed_artifact(&store, ArtifactType::Analysis, "Second", &[]);
    seed_artifact(&store, ArtifactType::Decision, "Loose", &[]);

    graph
        .create_association(&busy.id, &first.id)
        .expect("association should succeed");
    graph
        .create_association(&busy.id, &second.id)
        .expect("association should succeed");
    graph
        .create_association(&idle.id, &second.id)
        .expect("association should succeed");

    let summary = graph
        .get_association_summary()
        .expect("summary should succeed");
    assert_eq!(summary.total_work, 2);
    assert_eq!(summary.total_artifacts, 3);
    assert_eq!(summary.total_associations, 3);
    assert_eq!(summary.orphaned_artifacts, 1);
    assert_eq!(summary.work_without_artifacts, 0);
    let top_work = summary.most_connected_work.expect("a connected work");
    assert_eq!(top_work.id, busy.id);
    assert_eq!(top_work.connections, 2);
    let top_artifact = summary
        .most_connected_artifact
        .expect("a connected artifact");
    assert_eq!(top_artifact.id, second.id);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn tag_clusters_group_artifact_ids() {
    let now = datetime!(2026-04-01 09:00 UTC);
    let mut left = Artifact::new(ArtifactType::Plan, "Left", "", now);
    left.set_tags(["auth", "db"]);
    let mut right = Artifact::new(ArtifactType::Analysis, "Right", "", now);
    right.set_tags(["auth"]);

    let graph = AssociationGraph::from_entities(&[], &[left.clone(), right.clone()]);
    let mut expected = vec![left.id.clone(), right.id.clone()];
    expected.sort();
    assert_eq!(graph.tag_clusters.get("auth"), Some(&expected));
    assert_eq!(graph.tag_clusters.get("db"), Some(&vec![left.id.clone()]));
    assert_eq!(graph.orphaned_artifacts.len(), 2);
}
