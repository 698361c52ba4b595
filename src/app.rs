use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::json;
use time::OffsetDateTime;
use tokio::runtime::Runtime;
use tracing::debug;

use crate::config::{ConfigError, EngineConfig};
use crate::domain::artifact::{Artifact, ArtifactType};
use crate::domain::group::Group;
use crate::domain::metadata::{format_rfc3339, now_utc};
use crate::domain::schedule::{Priority, Schedule};
use crate::domain::update::{Update, UpdateKind};
use crate::domain::work::Work;
use crate::domain::EntityKind;
use crate::git::GitAdapter;
use crate::graph::{
    Association, AssociationGraph, AssociationSummary, GraphBuilder, SimilarEntity,
};
use crate::groups::{
    Consolidation, ConsolidationMethod, GroupHealthReport, GroupManager, GroupSuggestion,
};
use crate::hooks::{install_builtin_hooks, HookDispatcher, HookError, HookEvent, HookEventType};
use crate::journal::{UpdatesJournal, AUTOMATIC_AUTHOR};
use crate::lifecycle::{
    ActionOutcome, CleanupAction, CleanupReport, DecayAnalysis, LifecycleAnalyzer,
};
use crate::store::{DuplicateSet, EntityStore, SearchResults, StoreError};

pub struct App {
    store: EntityStore,
    config: EngineConfig,
    journal: UpdatesJournal,
    hooks: HookDispatcher,
    git: GitAdapter,
    runtime: Runtime,
}

#[derive(Debug, Clone)]
pub struct WorkDraft {
    pub title: String,
    pub description: String,
    pub schedule: Schedule,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub content: String,
}

impl WorkDraft {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            description: String::new(),
            schedule: Schedule::Next,
            priority: Priority::default(),
            tags: Vec::new(),
            content: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactDraft {
    pub artifact_type: ArtifactType,
    pub summary: String,
    pub content: String,
    pub tags: Vec<String>,
    pub work_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateDraft {
    pub author: Option<String>,
    pub title: String,
    pub summary: String,
    pub tasks_added: Vec<String>,
    pub tasks_completed: Vec<String>,
    pub progress: Option<u8>,
}

impl App {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = root.into();
        let config = EngineConfig::load(&root)?;
        Self::with_config(root, config)
    }

    pub fn with_config(root: impl Into<PathBuf>, config: EngineConfig) -> Result<Self, AppError> {
        let store = EntityStore::new(root, config.store.clone());
        let journal = UpdatesJournal::new(store.layout().clone());
        let mut hooks = HookDispatcher::new(config.hooks.clone());
        let installed = install_builtin_hooks(&mut hooks, store.layout(), &config.hooks);
        debug!(root = %store.root().display(), hooks = ?installed, "app opened");

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.hooks.max_concurrency.clamp(1, 8))
            .enable_all()
            .build()?;

        Ok(Self {
            store,
            config,
            journal,
            hooks,
            git: GitAdapter::new(),
            runtime,
        })
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn hooks(&self) -> &HookDispatcher {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut HookDispatcher {
        &mut self.hooks
    }

    pub fn create_work(&self, draft: WorkDraft) -> Result<Work, AppError> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(AppError::InvalidArgument(
                "work title must not be empty".to_string(),
            ));
        }

        let now = now_utc();
        let mut work = Work::new(title, &draft.description, draft.schedule, draft.priority, now);
        work.set_tags(&draft.tags);
        work.content = draft.content;
        work.session_number = self.config.store.session_number;
        if self.config.store.capture_git_context {
            work.git_context = self.git.capture_context(self.store.root());
        }

        self.before_work_write(&work, "create")?;
        self.store.write_work(&mut work)?;
        self.after_write(
            EntityKind::Work,
            &work.id,
            HookEventType::WorkCreated,
            json!({
                "title": work.title,
                "schedule": work.schedule,
                "priority": work.metadata.priority,
            }),
        )?;
        Ok(work)
    }

    pub fn create_artifact(&self, draft: ArtifactDraft) -> Result<Artifact, AppError> {
        let summary = draft.summary.trim();
        if summary.is_empty() {
            return Err(AppError::InvalidArgument(
                "artifact summary must not be empty".to_string(),
            ));
        }
        if let Some(work_id) = draft.work_id.as_deref() {
            self.store.find_work(work_id)?;
        }

        let mut artifact = Artifact::new(draft.artifact_type, summary, &draft.content, now_utc());
        artifact.set_tags(&draft.tags);
        artifact.session_number = self.config.store.session_number;
        if self.config.store.capture_git_context {
            artifact.git_context = self.git.capture_context(self.store.root());
        }
        self.store.write_artifact(&mut artifact)?;
        self.fire(post_write_event(
            self.store.root(),
            EntityKind::Artifact,
            &artifact.id,
            "create",
        ))?;

        match draft.work_id {
            Some(work_id) => Ok(self.associate(&work_id, &artifact.id)?.artifact),
            None => Ok(artifact),
        }
    }

    pub fn start_work(&self, id: &str) -> Result<Work, AppError> {
        let mut work = self.store.find_work(id)?;
        if work.is_terminal() {
            return Err(AppError::InvalidArgument(format!(
                "work '{}' is {} and cannot be started",
                work.id,
                work.status()
            )));
        }
        self.before_work_write(&work, "start")?;

        let previous = work.schedule;
        work.start(now_utc());
        self.store.update_schedule(&mut work, Schedule::Now)?;
        self.after_write(
            EntityKind::Work,
            &work.id,
            HookEventType::ScheduleChanged,
            json!({ "from": previous, "to": work.schedule, "status": work.status() }),
        )?;
        Ok(work)
    }

    pub fn complete_work(&self, id: &str) -> Result<Work, AppError> {
        let mut work = self.store.find_work(id)?;
        self.before_work_write(&work, "complete")?;

        let previous = work.schedule;
        work.complete(now_utc());
        self.store.update_schedule(&mut work, Schedule::Closed)?;
        self.after_write(
            EntityKind::Work,
            &work.id,
            HookEventType::WorkCompleted,
            json!({ "from": previous, "to": work.schedule }),
        )?;
        Ok(work)
    }

    pub fn update_schedule(&self, id: &str, schedule: Schedule) -> Result<Work, AppError> {
        let mut work = self.store.find_work(id)?;
        if work.schedule == schedule {
            return Ok(work);
        }
        self.before_work_write(&work, "schedule")?;

        let previous = work.schedule;
        work.touch(now_utc());
        self.store.update_schedule(&mut work, schedule)?;
        self.after_write(
            EntityKind::Work,
            &work.id,
            HookEventType::ScheduleChanged,
            json!({ "from": previous, "to": schedule }),
        )?;
        Ok(work)
    }

    pub fn associate(&self, work_id: &str, artifact_id: &str) -> Result<Association, AppError> {
        let work = self.store.find_work(work_id)?;
        self.before_work_write(&work, "associate")?;
        let association = GraphBuilder::new(&self.store).create_association(work_id, artifact_id)?;
        if association.changed {
            self.after_write(
                EntityKind::Work,
                work_id,
                HookEventType::AssociationChanged,
                json!({ "artifact_id": artifact_id, "linked": true }),
            )?;
        }
        Ok(association)
    }

    pub fn dissociate(&self, work_id: &str, artifact_id: &str) -> Result<Association, AppError> {
        let work = self.store.find_work(work_id)?;
        self.before_work_write(&work, "dissociate")?;
        let association = GraphBuilder::new(&self.store).remove_association(work_id, artifact_id)?;
        if association.changed {
            self.after_write(
                EntityKind::Work,
                work_id,
                HookEventType::AssociationChanged,
                json!({ "artifact_id": artifact_id, "linked": false }),
            )?;
        }
        Ok(association)
    }

    pub fn link_related(&self, left_id: &str, right_id: &str) -> Result<bool, AppError> {
        let changed = GraphBuilder::new(&self.store).link_related(left_id, right_id)?;
        if changed {
            self.after_write(
                EntityKind::Artifact,
                left_id,
                HookEventType::AssociationChanged,
                json!({ "related_id": right_id, "linked": true }),
            )?;
        }
        Ok(changed)
    }

    pub fn unlink_related(&self, left_id: &str, right_id: &str) -> Result<bool, AppError> {
        let changed = GraphBuilder::new(&self.store).unlink_related(left_id, right_id)?;
        if changed {
            self.after_write(
                EntityKind::Artifact,
                left_id,
                HookEventType::AssociationChanged,
                json!({ "related_id": right_id, "linked": false }),
            )?;
        }
        Ok(changed)
    }

    pub fn record_update(&self, work_id: &str, draft: UpdateDraft) -> Result<Update, AppError> {
        if draft.title.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "update title must not be empty".to_string(),
            ));
        }
        if draft.progress.is_some_and(|progress| progress > 100) {
            return Err(AppError::InvalidArgument(
                "progress must be between 0 and 100".to_string(),
            ));
        }

        let mut work = self.store.find_work(work_id)?;
        self.before_work_write(&work, "update")?;

        let now = now_utc();
        let before = work.metadata.progress;
        let after = draft.progress.unwrap_or(before);
        let (kind, author) = match draft.author.as_deref().map(str::trim) {
            Some(author) if !author.is_empty() => (UpdateKind::Manual, author.to_string()),
            _ => (UpdateKind::Automatic, AUTOMATIC_AUTHOR.to_string()),
        };
        let update = Update::new(&work.id, kind, &author, &draft.title, &draft.summary, now)
            .with_progress(before, after)
            .with_tasks(draft.tasks_added, draft.tasks_completed);

        let journal_path = self.journal.create_update(&work.id, &update)?;
        work.updates_ref = Some(self.relative_ref(&journal_path));
        work.set_progress(after, now);
        self.store.write_work(&mut work)?;

        self.after_write(
            EntityKind::Work,
            &work.id,
            HookEventType::UpdateRecorded,
            json!({
                "update_id": update.id,
                "kind": update.kind,
                "progress_before": before,
                "progress_after": after,
            }),
        )?;
        Ok(update)
    }

    pub fn updates(&self, work_id: &str) -> Result<Vec<Update>, AppError> {
        self.store.find_work(work_id)?;
        Ok(self.journal.get_updates(work_id)?)
    }

    pub fn list_work(&self, schedule: Option<Schedule>) -> Result<Vec<Work>, AppError> {
        Ok(match schedule {
            Some(schedule) => self.store.list_work(schedule)?,
            None => self.store.list_all_work()?,
        })
    }

    pub fn list_artifacts(
        &self,
        artifact_type: Option<ArtifactType>,
    ) -> Result<Vec<Artifact>, AppError> {
        Ok(match artifact_type {
            Some(artifact_type) => self.store.list_artifacts(artifact_type)?,
            None => self.store.list_all_artifacts()?,
        })
    }

    pub fn list_groups(&self) -> Result<Vec<Group>, AppError> {
        Ok(self.store.list_groups()?)
    }

    pub fn find_work(&self, id: &str) -> Result<Work, AppError> {
        Ok(self.store.find_work(id)?)
    }

    pub fn find_artifact(&self, id: &str) -> Result<Artifact, AppError> {
        Ok(self.store.find_artifact(id)?)
    }

    pub fn find_group(&self, id: &str) -> Result<Group, AppError> {
        Ok(self.store.find_group(id)?)
    }

    pub fn search(&self, query: &str) -> Result<SearchResults, AppError> {
        Ok(self.store.search(query)?)
    }

    pub fn graph(&self) -> Result<AssociationGraph, AppError> {
        Ok(GraphBuilder::new(&self.store).build_graph()?)
    }

    pub fn association_summary(&self) -> Result<AssociationSummary, AppError> {
        Ok(GraphBuilder::new(&self.store).get_association_summary()?)
    }

    pub fn orphaned_artifacts(&self) -> Result<Vec<Artifact>, AppError> {
        Ok(GraphBuilder::new(&self.store).get_orphaned_artifacts()?)
    }

    pub fn resolve_work_artifacts(&self, work_id: &str) -> Result<Vec<Artifact>, AppError> {
        Ok(GraphBuilder::new(&self.store).resolve_work_artifacts(work_id)?)
    }

    pub fn similar(
        &self,
        tags: &[String],
        exclude_id: Option<&str>,
    ) -> Result<Vec<SimilarEntity>, AppError> {
        Ok(GraphBuilder::new(&self.store).find_similar_by_tags(tags, exclude_id)?)
    }

    pub fn analyze_decay(&self, now: OffsetDateTime) -> Result<DecayAnalysis, AppError> {
        Ok(self.analyzer().analyze_decay(now)?)
    }

    pub fn execute_cleanup_action(
        &self,
        action: &CleanupAction,
        now: OffsetDateTime,
    ) -> Result<ActionOutcome, AppError> {
        let outcome = self
            .analyzer()
            .execute_cleanup_action_with(action, now, |work| {
                self.before_work_write(work, "cleanup")
            })?;
        self.after_cleanup(action, &outcome)?;
        Ok(outcome)
    }

    pub fn auto_cleanup(&self, now: OffsetDateTime) -> Result<CleanupReport, AppError> {
        let report = self
            .analyzer()
            .auto_cleanup_with(now, |work| self.before_work_write(work, "cleanup"))?;
        let mut first_error = None;
        for result in &report.results {
            if let Some(outcome) = &result.outcome {
                if let Err(err) = self.after_cleanup(&result.action, outcome) {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    pub fn create_group(
        &self,
        name: &str,
        description: &str,
        theme: &str,
        artifact_ids: &[String],
    ) -> Result<Group, AppError> {
        let group = self
            .groups()
            .create_group(name, description, theme, artifact_ids)?;
        self.fire(post_write_event(
            self.store.root(),
            EntityKind::Group,
            &group.id,
            "create",
        ))?;
        Ok(group)
    }

    pub fn add_group_artifact(&self, group_id: &str, artifact_id: &str) -> Result<Group, AppError> {
        let group = self.groups().add_artifact(group_id, artifact_id)?;
        self.fire(
            post_write_event(self.store.root(), EntityKind::Group, &group.id, "add_artifact")
                .with_payload(json!({ "action": "add_artifact", "artifact_id": artifact_id })),
        )?;
        Ok(group)
    }

    pub fn remove_group_artifact(
        &self,
        group_id: &str,
        artifact_id: &str,
    ) -> Result<Group, AppError> {
        let group = self.groups().remove_artifact(group_id, artifact_id)?;
        self.fire(
            post_write_event(self.store.root(), EntityKind::Group, &group.id, "remove_artifact")
                .with_payload(json!({ "action": "remove_artifact", "artifact_id": artifact_id })),
        )?;
        Ok(group)
    }

    pub fn delete_group(&self, group_id: &str) -> Result<Group, AppError> {
        let group = self.groups().delete_group(group_id)?;
        self.fire(post_write_event(
            self.store.root(),
            EntityKind::Group,
            &group.id,
            "delete",
        ))?;
        Ok(group)
    }

    pub fn consolidate_group(
        &self,
        group_id: &str,
        method: ConsolidationMethod,
    ) -> Result<Consolidation, AppError> {
        let consolidation = self
            .groups()
            .consolidate_group_to_work_with(group_id, method, |work| {
                self.before_work_write(work, "consolidate")
            })?;
        self.after_consolidation(&consolidation)?;
        Ok(consolidation)
    }

    pub fn group_health(&self) -> Result<GroupHealthReport, AppError> {
        Ok(self.groups().analyze_group_health()?)
    }

    pub fn suggest_groups(&self, min_size: usize) -> Result<Vec<GroupSuggestion>, AppError> {
        Ok(self.groups().suggest_groups(min_size)?)
    }

    pub fn find_duplicates(&self) -> Result<Vec<DuplicateSet>, AppError> {
        Ok(self.store.find_duplicates()?)
    }

    pub fn remove_duplicates(&self) -> Result<usize, AppError> {
        Ok(self.store.remove_duplicates()?)
    }

    fn analyzer(&self) -> LifecycleAnalyzer<'_> {
        LifecycleAnalyzer::new(&self.store, &self.config.lifecycle, &self.config.groups)
    }

    fn groups(&self) -> GroupManager<'_> {
        GroupManager::new(&self.store, &self.config.groups)
    }

    fn relative_ref(&self, path: &Path) -> String {
        path.strip_prefix(self.store.root())
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn fire(&self, event: HookEvent) -> Result<(), AppError> {
        self.runtime
            .block_on(self.hooks.dispatch(event))
            .map(|_| ())
            .map_err(AppError::Hook)
    }

    fn before_work_write(&self, work: &Work, action: &str) -> Result<(), AppError> {
        let event = HookEvent::new(
            HookEventType::PreWrite,
            EntityKind::Work,
            &work.id,
            self.store.root(),
        )
        .with_payload(json!({
            "action": action,
            "schedule": work.schedule,
            "status": work.status(),
            "last_activity_at": format_rfc3339(work.last_activity()),
        }));
        self.fire(event)
    }

    fn after_write(
        &self,
        kind: EntityKind,
        id: &str,
        event_type: HookEventType,
        payload: serde_json::Value,
    ) -> Result<(), AppError> {
        let post = self.fire(
            post_write_event(self.store.root(), kind, id, event_type.as_str())
                .with_payload(json!({ "event": event_type, "details": payload.clone() })),
        );
        let specific = self.fire(
            HookEvent::new(event_type, kind, id, self.store.root()).with_payload(payload),
        );
        post.and(specific)
    }

    fn after_cleanup(&self, action: &CleanupAction, outcome: &ActionOutcome) -> Result<(), AppError> {
        let cleanup = self.fire(
            HookEvent::new(
                HookEventType::CleanupExecuted,
                action.item_kind,
                &action.item_id,
                self.store.root(),
            )
            .with_payload(json!({ "action": action, "outcome": outcome })),
        );
        if let ActionOutcome::Consolidated { work_id } = outcome {
            let consolidated = self.fire(
                HookEvent::new(
                    HookEventType::GroupConsolidated,
                    EntityKind::Group,
                    &action.item_id,
                    self.store.root(),
                )
                .with_payload(json!({ "work_id": work_id })),
            );
            return cleanup.and(consolidated);
        }
        cleanup
    }

    fn after_consolidation(&self, consolidation: &Consolidation) -> Result<(), AppError> {
        let created = self.after_write(
            EntityKind::Work,
            &consolidation.work.id,
            HookEventType::WorkCreated,
            json!({
                "title": consolidation.work.title,
                "schedule": consolidation.work.schedule,
                "group_id": consolidation.group.id,
            }),
        );
        let consolidated = self.fire(
            HookEvent::new(
                HookEventType::GroupConsolidated,
                EntityKind::Group,
                &consolidation.group.id,
                self.store.root(),
            )
            .with_payload(json!({
                "work_id": consolidation.work.id,
                "unlinked_artifacts": consolidation.unlinked_artifacts,
            })),
        );
        created.and(consolidated)
    }
}

fn post_write_event(root: &Path, kind: EntityKind, id: &str, action: &str) -> HookEvent {
    HookEvent::new(HookEventType::PostWrite, kind, id, root)
        .with_payload(json!({ "action": action }))
}

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    Store(StoreError),
    Config(ConfigError),
    Hook(HookError),
    InvalidArgument(String),
}

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::Store(err) if err.is_not_found())
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(err) => write!(f, "I/O error: {}", err),
            AppError::Store(err) => write!(f, "{}", err),
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Hook(err) => write!(f, "hook error: {}", err),
            AppError::InvalidArgument(message) => write!(f, "{}", message),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Io(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Config(err) => Some(err),
            AppError::Hook(err) => Some(err),
            AppError::InvalidArgument(_) => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::Io(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        AppError::Store(value)
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Config(value)
    }
}

impl From<HookError> for AppError {
    fn from(value: HookError) -> Self {
        AppError::Hook(value)
    }
}

#[cfg(test)]
mod tests;
