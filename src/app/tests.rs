use super::{App, AppError, ArtifactDraft, UpdateDraft, WorkDraft};
use crate::config::{DispatchMode, EngineConfig};
use crate::domain::artifact::ArtifactType;
use crate::domain::schedule::{Priority, Schedule, WorkStatus};
use crate::domain::update::UpdateKind;
use crate::domain::work::Work;
use crate::domain::group::GroupStatus;
use crate::groups::ConsolidationMethod;
use crate::hooks::{HookError, HookEventType};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use time::macros::datetime;
use uuid::Uuid;

fn unique_workspace() -> PathBuf {
    let root = std::env::temp_dir().join(format!("worktrail-app-test-{}", Uuid::now_v7()));
    std::fs::create_dir_all(&root).expect("temp workspace should be creatable");
    root
}

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.store.capture_git_context = false;
    config.hooks.builtin = vec!["activity_log".to_string()];
    config
}

fn open_app(root: &Path) -> App {
    App::with_config(root, test_config()).expect("app should open")
}

fn count_documents(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "md"))
                .count()
        })
        .unwrap_or(0)
}

fn frozen_app(root: &Path, calls: &Arc<AtomicUsize>) -> App {
    let mut config = test_config();
    config.hooks.continue_on_error = false;
    config.hooks.mode = DispatchMode::Sequential;
    let mut app = App::with_config(root, config).expect("app should open");
    let seen = Arc::clone(calls);
    app.hooks_mut()
        .register_fn(HookEventType::PreWrite, "gate", move |_event| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Err("writes are frozen".to_string())
            }
        });
    app
}

fn seed_artifacts(app: &App, tag: &str) -> Vec<String> {
    [
        (ArtifactType::Plan, "Plan"),
        (ArtifactType::Analysis, "Dig"),
        (ArtifactType::Proposal, "Pitch"),
    ]
    .into_iter()
    .map(|(artifact_type, summary)| {
        app.create_artifact(ArtifactDraft {
            artifact_type,
            summary: summary.to_string(),
            content: String::new(),
            tags: vec![tag.to_string()],
            work_id: None,
        })
        .expect("artifact should be created")
        .id
    })
    .collect()
}

fn logged_event_types(root: &Path) -> Vec<String> {
    let raw = std::fs::read_to_string(root.join(".worktrail/activity.jsonl"))
        .expect("activity log should exist");
    raw.lines()
        .map(|line| {
            let value: serde_json::Value =
                serde_json::from_str(line).expect("activity line should be json");
            value["event_type"]
                .as_str()
                .expect("event_type should be a string")
                .to_string()
        })
        .collect()
}

#[test]
fn work_moves_through_schedule_directories() {
    let root = unique_workspace();
    let app = open_app(&root);

    let mut draft = WorkDraft::new("Fix login bug");
    draft.priority = Priority::High;
    draft.tags = vec!["Auth".to_string(), "login".to_string()];
    let work = app.create_work(draft).expect("work should be created");
    assert_eq!(work.schedule, Schedule::Next);
    assert_eq!(work.technical_tags, vec!["auth", "login"]);
    let created_path = work.file_path.clone().expect("path should be recorded");
    assert!(created_path.starts_with(root.join("next")));

    let started = app.start_work(&work.id).expect("start should succeed");
    assert_eq!(started.schedule, Schedule::Now);
    assert_eq!(started.status(), WorkStatus::InProgress);
    assert!(started.started_at.is_some());
    assert_eq!(count_documents(&root.join("next")), 0);
    assert_eq!(count_documents(&root.join("now")), 1);
    assert_eq!(
        started.file_path.as_ref().and_then(|path| path.file_name()),
        created_path.file_name()
    );

    let completed = app.complete_work(&work.id).expect("complete should succeed");
    assert_eq!(completed.schedule, Schedule::Closed);
    assert_eq!(completed.status(), WorkStatus::Completed);
    assert_eq!(completed.metadata.progress, 100);
    assert_eq!(count_documents(&root.join("now")), 0);
    assert_eq!(count_documents(&root.join("closed")), 1);

    let reloaded = app.find_work(&work.id).expect("work should be found");
    assert_eq!(reloaded.schedule, Schedule::Closed);

    let err = app
        .start_work(&work.id)
        .expect_err("completed work should not restart");
    assert!(matches!(err, AppError::InvalidArgument(_)));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn mutations_are_recorded_by_the_activity_log() {
    let root = unique_workspace();
    let app = open_app(&root);

    let work = app
        .create_work(WorkDraft::new("Ship docs"))
        .expect("work should be created");
    app.update_schedule(&work.id, Schedule::Later)
        .expect("schedule change should succeed");

    assert_eq!(
        logged_event_types(&root),
        vec!["post_write", "work_created", "post_write", "schedule_changed"]
    );

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn failing_pre_write_hook_blocks_the_write() {
    let root = unique_workspace();
    let mut config = test_config();
    config.hooks.continue_on_error = false;
    config.hooks.mode = DispatchMode::Sequential;
    let mut app = App::with_config(&root, config).expect("app should open");
    app.hooks_mut()
        .register_fn(HookEventType::PreWrite, "gate", |_event| async {
            Err("writes are frozen".to_string())
        });

    let err = app
        .create_work(WorkDraft::new("Blocked"))
        .expect_err("pre-write failure should abort");
    match err {
        AppError::Hook(HookError::Aborted { handler, .. }) => assert_eq!(handler, "gate"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(app.list_work(None).expect("list should succeed").is_empty());

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn failing_post_write_hook_reports_after_persisting() {
    let root = unique_workspace();
    let mut config = test_config();
    config.hooks.continue_on_error = false;
    let mut app = App::with_config(&root, config).expect("app should open");
    app.hooks_mut()
        .register_fn(HookEventType::WorkCreated, "notify", |_event| async {
            Err("mailer offline".to_string())
        });

    let err = app
        .create_work(WorkDraft::new("Persisted anyway"))
        .expect_err("post-write failure should surface");
    assert!(matches!(
        err,
        AppError::Hook(HookError::PartialFailure { failed: 1, .. })
    ));
    assert_eq!(app.list_work(None).expect("list should succeed").len(), 1);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn tolerant_hooks_never_block_writes() {
    let root = unique_workspace();
    let mut app = open_app(&root);
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    app.hooks_mut()
        .register_fn(HookEventType::PreWrite, "flaky", move |_event| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Err("flaky".to_string())
            }
        });

    app.create_work(WorkDraft::new("Still written"))
        .expect("continue_on_error should let the write through");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(app.list_work(None).expect("list should succeed").len(), 1);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn recording_updates_tracks_progress_and_journal() {
    let root = unique_workspace();
    let app = open_app(&root);
    let work = app
        .create_work(WorkDraft::new("Cache layer"))
        .expect("work should be created");

    let first = app
        .record_update(
            &work.id,
            UpdateDraft {
                author: Some("dana".to_string()),
                title: "Wired the client".to_string(),
                summary: "Reads go through the cache.".to_string(),
                tasks_added: vec!["Add eviction".to_string()],
                tasks_completed: Vec::new(),
                progress: Some(40),
            },
        )
        .expect("update should be recorded");
    assert_eq!(first.kind, UpdateKind::Manual);
    assert_eq!((first.progress_before, first.progress_after), (0, 40));

    let second = app
        .record_update(
            &work.id,
            UpdateDraft {
                title: "Nightly sync".to_string(),
                ..UpdateDraft::default()
            },
        )
        .expect("update should be recorded");
    assert_eq!(second.kind, UpdateKind::Automatic);
    assert_eq!((second.progress_before, second.progress_after), (40, 40));

    let reloaded = app.find_work(&work.id).expect("work should exist");
    assert_eq!(reloaded.metadata.progress, 40);
    assert_eq!(
        reloaded.updates_ref.as_deref(),
        Some(format!("updates/{}.md", work.id).as_str())
    );

    let updates = app.updates(&work.id).expect("journal should load");
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].title, "Nightly sync");
    assert_eq!(updates[1].tasks_added, vec!["Add eviction"]);

    let err = app
        .record_update(
            &work.id,
            UpdateDraft {
                title: "Too far".to_string(),
                progress: Some(150),
                ..UpdateDraft::default()
            },
        )
        .expect_err("progress over 100 should be rejected");
    assert!(matches!(err, AppError::InvalidArgument(_)));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn artifact_created_for_work_is_linked_both_ways() {
    let root = unique_workspace();
    let app = open_app(&root);
    let work = app
        .create_work(WorkDraft::new("Session storage"))
        .expect("work should be created");

    let artifact = app
        .create_artifact(ArtifactDraft {
            artifact_type: ArtifactType::Plan,
            summary: "Move sessions to redis".to_string(),
            content: "Steps".to_string(),
            tags: vec!["sessions".to_string()],
            work_id: Some(work.id.clone()),
        })
        .expect("artifact should be created");
    assert_eq!(artifact.work_refs(), [work.id.clone()]);
    assert!(artifact
        .file_path
        .as_ref()
        .is_some_and(|path| path.starts_with(root.join("artifacts/plans"))));

    let reloaded = app.find_work(&work.id).expect("work should exist");
    assert_eq!(reloaded.artifact_refs(), [artifact.id.clone()]);
    assert!(app
        .orphaned_artifacts()
        .expect("orphans should load")
        .is_empty());

    app.dissociate(&work.id, &artifact.id)
        .expect("dissociate should succeed");
    let orphans = app.orphaned_artifacts().expect("orphans should load");
    assert_eq!(orphans.len(), 1);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn invalid_input_and_missing_entities_are_reported() {
    let root = unique_workspace();
    let app = open_app(&root);

    let err = app
        .create_work(WorkDraft::new("   "))
        .expect_err("blank title should fail");
    assert!(matches!(err, AppError::InvalidArgument(_)));

    let err = app
        .start_work("work-missing")
        .expect_err("unknown work should fail");
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "work 'work-missing' not found");

    let err = app
        .create_artifact(ArtifactDraft {
            artifact_type: ArtifactType::Analysis,
            summary: "Dangling".to_string(),
            content: String::new(),
            tags: Vec::new(),
            work_id: Some("work-missing".to_string()),
        })
        .expect_err("unknown work should fail");
    assert!(err.is_not_found());
    assert!(app
        .list_artifacts(None)
        .expect("list should succeed")
        .is_empty());

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn consolidating_a_group_fires_consolidation_events() {
    let root = unique_workspace();
    let app = open_app(&root);

    let mut ids = Vec::new();
    for (artifact_type, summary) in [
        (ArtifactType::Plan, "Plan"),
        (ArtifactType::Analysis, "Dig"),
        (ArtifactType::Proposal, "Pitch"),
    ] {
        let artifact = app
            .create_artifact(ArtifactDraft {
                artifact_type,
                summary: summary.to_string(),
                content: String::new(),
                tags: vec!["search".to_string()],
                work_id: None,
            })
            .expect("artifact should be created");
        ids.push(artifact.id);
    }
    let group = app
        .create_group("Search revamp", "", "search", &ids)
        .expect("group should be created");

    let consolidation = app
        .consolidate_group(&group.id, ConsolidationMethod::Manual)
        .expect("consolidation should succeed");
    assert_eq!(consolidation.work.artifact_refs().len(), 3);

    let events = logged_event_types(&root);
    assert!(events.iter().any(|event| event == "work_created"));
    assert_eq!(events.last().map(String::as_str), Some("group_consolidated"));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn failing_pre_write_hook_blocks_cleanup_of_work() {
    let root = unique_workspace();
    let calls = Arc::new(AtomicUsize::new(0));
    let app = frozen_app(&root, &calls);
    let mut idle = Work::new(
        "Forgotten spike",
        "",
        Schedule::Next,
        Priority::Low,
        datetime!(2025-06-01 09:00 UTC),
    );
    app.store()
        .write_work(&mut idle)
        .expect("seed write should succeed");
    let now = datetime!(2026-06-01 09:00 UTC);

    let report = app.auto_cleanup(now).expect("auto cleanup should finish");
    assert_eq!(report.attempted, 1);
    assert_eq!(report.failed, 1);
    assert!(report.results[0]
        .error
        .as_deref()
        .is_some_and(|error| error.contains("writes are frozen")));

    let analysis = app.analyze_decay(now).expect("analysis should succeed");
    let action = analysis
        .actions
        .iter()
        .find(|action| action.item_id == idle.id)
        .expect("idle work should have an action");
    let err = app
        .execute_cleanup_action(action, now)
        .expect_err("gated archive should fail");
    assert!(matches!(err, AppError::Hook(HookError::Aborted { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let stored = app.find_work(&idle.id).expect("work should still exist");
    assert_eq!(stored.schedule, Schedule::Next);
    assert_eq!(stored.status(), WorkStatus::Active);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn archiving_idle_work_stamps_the_cleanup_time() {
    let root = unique_workspace();
    let app = open_app(&root);
    let mut idle = Work::new(
        "Forgotten spike",
        "",
        Schedule::Next,
        Priority::Low,
        datetime!(2025-06-01 09:00 UTC),
    );
    app.store()
        .write_work(&mut idle)
        .expect("seed write should succeed");
    let now = datetime!(2026-06-01 09:00 UTC);

    let report = app.auto_cleanup(now).expect("auto cleanup should finish");
    assert_eq!(report.succeeded, 1);

    let stored = app.find_work(&idle.id).expect("work should exist");
    assert_eq!(stored.schedule, Schedule::Closed);
    assert_eq!(stored.status(), WorkStatus::Archived);
    assert_eq!(stored.updated_at, now);
    assert_eq!(count_documents(&app.store().layout().work_dir(Schedule::Next)), 0);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn failing_pre_write_hook_blocks_consolidation() {
    let root = unique_workspace();
    let calls = Arc::new(AtomicUsize::new(0));
    let app = frozen_app(&root, &calls);
    let ids = seed_artifacts(&app, "search");
    let group = app
        .create_group("Search revamp", "", "search", &ids)
        .expect("group should be created");

    let err = app
        .consolidate_group(&group.id, ConsolidationMethod::Manual)
        .expect_err("gated consolidation should fail");
    assert!(matches!(err, AppError::Hook(HookError::Aborted { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(app.list_work(None).expect("list should succeed").is_empty());
    let stored = app.find_group(&group.id).expect("group should exist");
    assert_eq!(stored.metadata.status, GroupStatus::Active);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn group_membership_changes_fire_post_write() {
    let root = unique_workspace();
    let app = open_app(&root);
    let ids = seed_artifacts(&app, "billing");
    let group = app
        .create_group("Billing", "", "billing", &ids[..2])
        .expect("group should be created");
    let before = logged_event_types(&root).len();

    app.add_group_artifact(&group.id, &ids[2])
        .expect("add should succeed");
    app.remove_group_artifact(&group.id, &ids[0])
        .expect("remove should succeed");
    app.delete_group(&group.id).expect("delete should succeed");

    let events = logged_event_types(&root);
    assert_eq!(events.len(), before + 3);
    assert!(events[before..].iter().all(|event| event == "post_write"));

    let _ = std::fs::remove_dir_all(root);
}
