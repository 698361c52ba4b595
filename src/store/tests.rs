use super::{EntityStore, StoreError};
use crate::config::StoreConfig;
use crate::domain::artifact::{Artifact, ArtifactType};
use crate::domain::group::Group;
use crate::domain::schedule::{Priority, Schedule};
use crate::domain::work::Work;
use crate::domain::EntityKind;
use std::path::{Path, PathBuf};
use time::macros::datetime;
use time::Duration;
use uuid::Uuid;

fn unique_workspace() -> PathBuf {
    let root = std::env::temp_dir().join(format!("worktrail-store-test-{}", Uuid::now_v7()));
    std::fs::create_dir_all(&root).expect("temp workspace should be creatable");
    root
}

fn store_at(root: &Path) -> EntityStore {
    EntityStore::new(root, StoreConfig::default())
}

fn md_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .expect("directory should be readable")
        .map(|entry| entry.expect("entry should be readable").path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
        .collect();
    files.sort();
    files
}

#[test]
fn work_round_trips_through_its_schedule_directory() {
    let root = unique_workspace();
    let store = store_at(&root);

    let mut work = Work::new(
        "Fix login bug",
        "Users are bounced to the login page",
        Schedule::Now,
        Priority::High,
        datetime!(2026-03-01 09:00 UTC),
    );
    work.set_tags(["auth", "login"]);
    work.content = "## Notes\n\nRepro on staging.\n\n\n".to_string();

    let path = store.write_work(&mut work).expect("write should succeed");
    assert_eq!(path.parent(), Some(root.join("now").as_path()));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .expect("utf8 file name");
    assert!(file_name.starts_with("work-fix-login-bug-2026-03-01-"));
    assert_eq!(work.content, "## Notes\n\nRepro on staging.");

    let read = store.read_work(&path).expect("read should succeed");
    assert_eq!(read, work);

    let raw = std::fs::read_to_string(&path).expect("document should be readable");
    assert!(raw.starts_with("---\nid: "));
    assert!(raw.contains("schedule: now"));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn schedule_change_moves_the_document_and_keeps_the_name() {
    let root = unique_workspace();
    let store = store_at(&root);

    let mut work = Work::new(
        "Refactor session layer",
        "",
        Schedule::Later,
        Priority::Medium,
        datetime!(2026-03-01 09:00 UTC),
    );
    let first = store.write_work(&mut work).expect("write should succeed");

    let moved = store
        .update_schedule(&mut work, Schedule::Now)
        .expect("schedule change should succeed");
    assert_eq!(moved.parent(), Some(root.join("now").as_path()));
    assert_eq!(moved.file_name(), first.file_name());
    assert!(!first.exists());
    assert!(md_files(&root.join("later")).is_empty());
    assert_eq!(md_files(&root.join("now")), vec![moved.clone()]);
    assert_eq!(work.file_path.as_deref(), Some(moved.as_path()));

    let closed = store
        .update_schedule(&mut work, Schedule::Closed)
        .expect("closing should succeed");
    assert!(!moved.exists());
    assert!(closed.exists());
    let found = store.find_work(&work.id).expect("work should be found");
    assert_eq!(found.schedule, Schedule::Closed);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn failed_schedule_change_restores_the_previous_state() {
    let root = unique_workspace();
    let store = store_at(&root);

    let mut work = Work::new(
        "Stuck item",
        "",
        Schedule::Next,
        Priority::Low,
        datetime!(2026-03-01 09:00 UTC),
    );
    let original = store.write_work(&mut work).expect("write should succeed");
    let before = work.clone();

    // A plain file where the target directory should be makes the write fail.
    std::fs::write(root.join("now"), "not a directory").expect("blocker file");

    let result = store.update_schedule(&mut work, Schedule::Now);
    assert!(matches!(result, Err(StoreError::Io(_))));
    assert_eq!(work, before);
    assert!(original.exists());

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn artifact_type_selects_the_directory() {
    let root = unique_workspace();
    let store = store_at(&root);

    let now = datetime!(2026-03-02 10:00 UTC);
    let mut analysis = Artifact::new(ArtifactType::Analysis, "Auth flow analysis", "Body", now);
    let mut decision = Artifact::new(ArtifactType::Decision, "Use sessions", "", now);
    let analysis_path = store
        .write_artifact(&mut analysis)
        .expect("write should succeed");
    store
        .write_artifact(&mut decision)
        .expect("write should succeed");

    assert_eq!(
        analysis_path.parent(),
        Some(root.join("artifacts/analysis").as_path())
    );
    assert_eq!(md_files(&root.join("artifacts/decisions")).len(), 1);
    assert_eq!(
        store
            .list_artifacts(ArtifactType::Analysis)
            .expect("list should succeed")
            .len(),
        1
    );

    let moved = store
        .update_artifact_type(&mut analysis, ArtifactType::Proposal)
        .expect("retype should succeed");
    assert_eq!(
        moved.parent(),
        Some(root.join("artifacts/proposals").as_path())
    );
    assert!(!analysis_path.exists());

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn listing_skips_malformed_and_foreign_files() {
    let root = unique_workspace();
    let store = store_at(&root);

    let mut work = Work::new(
        "Healthy",
        "",
        Schedule::Now,
        Priority::Medium,
        datetime!(2026-03-01 09:00 UTC),
    );
    store.write_work(&mut work).expect("write should succeed");

    let now_dir = root.join("now");
    std::fs::write(now_dir.join("broken.md"), "no header here\n").expect("write broken");
    std::fs::write(now_dir.join("bad-yaml.md"), "---\nid: [oops\n---\n").expect("write bad");
    std::fs::write(now_dir.join("notes.txt"), "ignored").expect("write txt");
    std::fs::write(now_dir.join(".hidden.md"), "---\nid: x\n---\n").expect("write hidden");

    let listed = store.list_work(Schedule::Now).expect("list should succeed");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, work.id);

    let malformed = store.read_work(&now_dir.join("broken.md"));
    assert!(matches!(malformed, Err(StoreError::Malformed { .. })));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn missing_directories_list_as_empty() {
    let root = unique_workspace();
    let store = store_at(&root);
    assert!(store.list_all_work().expect("list should succeed").is_empty());
    assert!(store
        .list_all_artifacts()
        .expect("list should succeed")
        .is_empty());
    assert!(store.list_groups().expect("list should succeed").is_empty());
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn work_lists_by_priority_then_recency() {
    let root = unique_workspace();
    let store = store_at(&root);
    let base = datetime!(2026-03-01 09:00 UTC);

    let mut low = Work::new("Low", "", Schedule::Now, Priority::Low, base);
    let mut high_old = Work::new("High old", "", Schedule::Now, Priority::High, base);
    let mut high_new = Work::new(
        "High new",
        "",
        Schedule::Next,
        Priority::High,
        base + Duration::days(2),
    );
    let mut critical = Work::new("Critical", "", Schedule::Later, Priority::Critical, base);
    for work in [&mut low, &mut high_old, &mut high_new, &mut critical] {
        store.write_work(work).expect("write should succeed");
    }

    let titles: Vec<String> = store
        .list_all_work()
        .expect("list should succeed")
        .into_iter()
        .map(|work| work.title)
        .collect();
    assert_eq!(titles, vec!["Critical", "High new", "High old", "Low"]);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn duplicate_ids_resolve_to_the_newest_copy() {
    let root = unique_workspace();
    let store = store_at(&root);

    let mut work = Work::new(
        "Half moved",
        "",
        Schedule::Later,
        Priority::Medium,
        datetime!(2026-03-01 09:00 UTC),
    );
    let stale_path = store.write_work(&mut work).expect("write should succeed");

    // Simulate a crash between writing the new copy and removing the old one.
    let mut newer = work.clone();
    newer.file_path = None;
    newer.schedule = Schedule::Now;
    newer.updated_at = datetime!(2026-03-05 09:00 UTC);
    let fresh_path = store.write_work(&mut newer).expect("write should succeed");
    assert!(stale_path.exists());

    let listed = store.list_all_work().expect("list should succeed");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].schedule, Schedule::Now);

    let duplicates = store.find_duplicates().expect("scan should succeed");
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].kind, EntityKind::Work);
    assert_eq!(duplicates[0].kept, fresh_path);
    assert_eq!(duplicates[0].stale, vec![stale_path.clone()]);

    assert_eq!(store.remove_duplicates().expect("cleanup should succeed"), 1);
    assert!(!stale_path.exists());
    assert!(store
        .find_duplicates()
        .expect("scan should succeed")
        .is_empty());

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn find_reports_not_found_for_unknown_ids() {
    let root = unique_workspace();
    let store = store_at(&root);
    let err = store
        .find_work("work-missing")
        .expect_err("missing work should fail");
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "work 'work-missing' not found");
    assert!(store.find_artifact("plan-missing").is_err());
    assert!(store.find_group("group-missing").is_err());
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn search_matches_across_kinds_and_ignores_blank_queries() {
    let root = unique_workspace();
    let store = store_at(&root);
    let now = datetime!(2026-03-01 09:00 UTC);

    let mut work = Work::new("Login redirect loop", "", Schedule::Now, Priority::High, now);
    store.write_work(&mut work).expect("write should succeed");
    let mut artifact = Artifact::new(
        ArtifactType::Analysis,
        "Cookie scope",
        "The LOGIN cookie is scoped wrong",
        now,
    );
    store
        .write_artifact(&mut artifact)
        .expect("write should succeed");
    let mut other = Artifact::new(ArtifactType::Plan, "Billing export", "", now);
    store.write_artifact(&mut other).expect("write should succeed");

    let results = store.search("  Login ").expect("search should succeed");
    assert_eq!(results.work.len(), 1);
    assert_eq!(results.artifacts.len(), 1);
    assert_eq!(results.artifacts[0].id, artifact.id);

    assert!(store.search("   ").expect("search should succeed").is_empty());

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn groups_persist_and_delete() {
    let root = unique_workspace();
    let store = store_at(&root);

    let mut group = Group::new("Auth", "", "login", datetime!(2026-03-01 09:00 UTC));
    let path = store.write_group(&mut group).expect("write should succeed");
    assert_eq!(path.parent(), Some(root.join("groups").as_path()));
    assert_eq!(store.list_groups().expect("list should succeed").len(), 1);

    store.delete_group(&group).expect("delete should succeed");
    assert!(!path.exists());
    assert!(store.find_group(&group.id).is_err());

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn writes_leave_no_temp_files_behind() {
    let root = unique_workspace();
    let store = store_at(&root);
    let mut work = Work::new(
        "Atomic",
        "",
        Schedule::Now,
        Priority::Medium,
        datetime!(2026-03-01 09:00 UTC),
    );
    store.write_work(&mut work).expect("write should succeed");
    store.write_work(&mut work).expect("rewrite should succeed");

    let leftovers: Vec<_> = std::fs::read_dir(root.join("now"))
        .expect("directory should be readable")
        .map(|entry| entry.expect("entry").file_name())
        .filter(|name| name.to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());

    let _ = std::fs::remove_dir_all(root);
}
