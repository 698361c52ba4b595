//! Activity scoring, decay classification and cleanup.
//!
//! Analysis is a pure function of the stored documents and `now`; nothing is
//! written until a [`CleanupAction`] is executed.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::{GroupConfig, LifecycleConfig};
use crate::domain::artifact::{Artifact, ArtifactStatus};
use crate::domain::group::{Group, GroupStatus};
use crate::domain::metadata::{format_rfc3339, whole_days_between};
use crate::domain::schedule::{Schedule, WorkStatus};
use crate::domain::work::Work;
use crate::domain::EntityKind;
use crate::groups::{refresh_derived, ConsolidationMethod, GroupManager};
use crate::store::{EntityStore, StoreError};

/// Half-life decay of engagement. Implemented by every stored entity.
pub trait Decaying {
    fn last_activity(&self) -> OffsetDateTime;
    fn activity_score(&self) -> f64;
    fn is_terminal(&self) -> bool;

    fn calculate_activity_score(&mut self, now: OffsetDateTime) -> f64;

    fn days_inactive(&self, now: OffsetDateTime) -> i64 {
        whole_days_between(self.last_activity(), now)
    }

    fn should_decay(&self, now: OffsetDateTime, config: &LifecycleConfig) -> bool {
        !self.is_terminal()
            && self.days_inactive(now) >= config.decay_after_days
            && self.activity_score() < config.min_activity_score
    }
}

fn half_life(base: f64, days: i64, half_life_days: f64) -> f64 {
    base * 0.5_f64.powf(days as f64 / half_life_days)
}

impl Decaying for Work {
    fn last_activity(&self) -> OffsetDateTime {
        Work::last_activity(self)
    }

    fn activity_score(&self) -> f64 {
        self.metadata.activity_score
    }

    fn is_terminal(&self) -> bool {
        Work::is_terminal(self)
    }

    fn calculate_activity_score(&mut self, now: OffsetDateTime) -> f64 {
        let days = self.days_inactive(now);
        let refs = (self.artifact_refs().len() as f64 * 0.5).min(3.0);
        let progress = f64::from(self.metadata.progress.min(100)) / 100.0 * 2.0;
        let status = match self.metadata.status {
            WorkStatus::InProgress => 1.0,
            WorkStatus::Blocked => -1.0,
            _ => 0.0,
        };
        let score = (half_life(10.0, days, 7.0) + refs + progress + status).max(0.0);
        self.metadata.activity_score = score;
        score
    }
}

impl Decaying for Artifact {
    fn last_activity(&self) -> OffsetDateTime {
        Artifact::last_activity(self)
    }

    fn activity_score(&self) -> f64 {
        self.metadata.activity_score
    }

    fn is_terminal(&self) -> bool {
        self.is_archived()
    }

    fn calculate_activity_score(&mut self, now: OffsetDateTime) -> f64 {
        let days = self.days_inactive(now);
        let references = (f64::from(self.metadata.reference_count) * 0.5).min(3.0);
        let work = (self.work_refs().len() as f64 * 0.5).min(2.0);
        let score = half_life(10.0, days, 14.0) + references + work;
        self.metadata.activity_score = score;
        score
    }
}

impl Decaying for Group {
    fn last_activity(&self) -> OffsetDateTime {
        self.updated_at
    }

    fn activity_score(&self) -> f64 {
        self.metadata.activity_score
    }

    fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    fn calculate_activity_score(&mut self, now: OffsetDateTime) -> f64 {
        let members = self.artifact_ids().len();
        let score = if members == 0 {
            0.0
        } else {
            let days = self.days_inactive(now);
            half_life(5.0, days, 14.0) + (members as f64 * 0.5).min(5.0)
        };
        self.metadata.activity_score = score;
        score
    }
}

labeled_enum! {
    pub enum ActionType as "action type" {
        Archive => "archive",
        Review => "review",
        Consolidate => "consolidate",
    }
}

labeled_enum! {
    /// Declaration order is sort order: high comes first.
    pub enum ActionPriority as "action priority" {
        High => "high",
        Medium => "medium",
        Low => "low",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaleItem {
    pub kind: EntityKind,
    pub id: String,
    pub title: String,
    pub days_inactive: i64,
    pub activity_score: f64,
    pub priority: ActionPriority,
    pub auto_safe: bool,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupAction {
    pub action_type: ActionType,
    pub priority: ActionPriority,
    pub item_kind: EntityKind,
    pub item_id: String,
    pub title: String,
    pub reason: String,
    pub auto_safe: bool,
}

impl CleanupAction {
    fn for_item(action_type: ActionType, item: &StaleItem) -> Self {
        Self {
            action_type,
            priority: item.priority,
            item_kind: item.kind,
            item_id: item.id.clone(),
            title: item.title.clone(),
            reason: item.reason.clone(),
            auto_safe: item.auto_safe,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecaySummary {
    pub total_work: usize,
    pub total_artifacts: usize,
    pub total_groups: usize,
    pub stale_work: usize,
    pub stale_artifacts: usize,
    pub orphaned_artifacts: usize,
    pub stale_groups: usize,
    pub unsupported_work: usize,
    pub auto_safe_actions: usize,
    /// 1.0 means nothing stale, orphaned or unsupported.
    pub health_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecayAnalysis {
    pub stale_work: Vec<StaleItem>,
    pub stale_artifacts: Vec<StaleItem>,
    pub orphaned_artifacts: Vec<StaleItem>,
    pub stale_groups: Vec<StaleItem>,
    pub unsupported_work: Vec<StaleItem>,
    pub actions: Vec<CleanupAction>,
    pub summary: DecaySummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Archived,
    Flagged,
    Consolidated { work_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub action: CleanupAction,
    pub outcome: Option<ActionOutcome>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<ActionResult>,
}

/// Urgency from idle days. Only items past the auto-archive horizon may be
/// cleaned up without confirmation.
pub fn classify_priority(
    days_inactive: i64,
    scheduled_now: bool,
    config: &LifecycleConfig,
) -> (ActionPriority, bool) {
    if days_inactive > config.auto_archive_days {
        (ActionPriority::High, true)
    } else if scheduled_now && days_inactive > config.now_inactive_days {
        (ActionPriority::High, false)
    } else if days_inactive > config.review_after_days {
        (ActionPriority::Medium, false)
    } else {
        (ActionPriority::Low, false)
    }
}

pub struct LifecycleAnalyzer<'a> {
    store: &'a EntityStore,
    config: &'a LifecycleConfig,
    group_config: &'a GroupConfig,
}

impl<'a> LifecycleAnalyzer<'a> {
    pub fn new(
        store: &'a EntityStore,
        config: &'a LifecycleConfig,
        group_config: &'a GroupConfig,
    ) -> Self {
        Self {
            store,
            config,
            group_config,
        }
    }

    pub fn analyze_decay(&self, now: OffsetDateTime) -> Result<DecayAnalysis, StoreError> {
        let work = self.store.list_all_work()?;
        let artifacts = self.store.list_all_artifacts()?;
        let groups = self.store.list_groups()?;
        Ok(self.analyze_entities(work, artifacts, groups, now))
    }

    pub fn analyze_entities(
        &self,
        work: Vec<Work>,
        artifacts: Vec<Artifact>,
        groups: Vec<Group>,
        now: OffsetDateTime,
    ) -> DecayAnalysis {
        let mut analysis = DecayAnalysis::default();
        let mut actioned: HashSet<String> = HashSet::new();

        analysis.summary.total_work = work.len();
        analysis.summary.total_artifacts = artifacts.len();
        analysis.summary.total_groups = groups.len();

        for mut item in work {
            if Decaying::is_terminal(&item) {
                continue;
            }
            item.calculate_activity_score(now);
            let days = item.days_inactive(now);

            if item.should_decay(now, self.config) {
                let (priority, auto_safe) =
                    classify_priority(days, item.schedule == Schedule::Now, self.config);
                let stale = StaleItem {
                    kind: EntityKind::Work,
                    id: item.id.clone(),
                    title: item.title.clone(),
                    days_inactive: days,
                    activity_score: item.metadata.activity_score,
                    priority,
                    auto_safe,
                    reason: format!(
                        "no activity for {} days in {} (score {:.2})",
                        days, item.schedule, item.metadata.activity_score
                    ),
                };
                let action_type = if auto_safe {
                    ActionType::Archive
                } else {
                    ActionType::Review
                };
                analysis
                    .actions
                    .push(CleanupAction::for_item(action_type, &stale));
                actioned.insert(item.id.clone());
                analysis.stale_work.push(stale);
            }

            if item.artifact_refs().is_empty() {
                let unsupported = StaleItem {
                    kind: EntityKind::Work,
                    id: item.id.clone(),
                    title: item.title.clone(),
                    days_inactive: days,
                    activity_score: item.metadata.activity_score,
                    priority: ActionPriority::Low,
                    auto_safe: false,
                    reason: "work has no supporting artifacts".to_string(),
                };
                if actioned.insert(item.id.clone()) {
                    analysis
                        .actions
                        .push(CleanupAction::for_item(ActionType::Review, &unsupported));
                }
                analysis.unsupported_work.push(unsupported);
            }
        }

        for artifact in &artifacts {
            if artifact.metadata.status == ArtifactStatus::Archived {
                continue;
            }
            let mut artifact = artifact.clone();
            artifact.calculate_activity_score(now);
            let days = artifact.days_inactive(now);

            if artifact.should_decay(now, self.config) {
                let (priority, auto_safe) = classify_priority(days, false, self.config);
                let stale = StaleItem {
                    kind: EntityKind::Artifact,
                    id: artifact.id.clone(),
                    title: artifact.summary.clone(),
                    days_inactive: days,
                    activity_score: artifact.metadata.activity_score,
                    priority,
                    auto_safe,
                    reason: format!(
                        "{} untouched for {} days (score {:.2})",
                        artifact.artifact_type, days, artifact.metadata.activity_score
                    ),
                };
                let action_type = if auto_safe {
                    ActionType::Archive
                } else {
                    ActionType::Review
                };
                analysis
                    .actions
                    .push(CleanupAction::for_item(action_type, &stale));
                actioned.insert(artifact.id.clone());
                analysis.stale_artifacts.push(stale);
            }

            if artifact.is_orphaned() {
                let auto_safe = days > self.config.auto_archive_days;
                let orphan = StaleItem {
                    kind: EntityKind::Artifact,
                    id: artifact.id.clone(),
                    title: artifact.summary.clone(),
                    days_inactive: days,
                    activity_score: artifact.metadata.activity_score,
                    priority: if auto_safe {
                        ActionPriority::High
                    } else {
                        ActionPriority::Medium
                    },
                    auto_safe,
                    reason: "artifact is not linked to any work, artifact or group".to_string(),
                };
                if actioned.insert(artifact.id.clone()) {
                    let action_type = if auto_safe {
                        ActionType::Archive
                    } else {
                        ActionType::Review
                    };
                    analysis
                        .actions
                        .push(CleanupAction::for_item(action_type, &orphan));
                }
                analysis.orphaned_artifacts.push(orphan);
            }
        }

        for mut group in groups {
            if !group.is_active() {
                continue;
            }
            refresh_derived(&mut group, &artifacts, now);
            self.classify_group(&mut analysis, &group, now);
        }

        analysis.actions.sort_by_key(|action| action.priority);

        let summary = &mut analysis.summary;
        summary.stale_work = analysis.stale_work.len();
        summary.stale_artifacts = analysis.stale_artifacts.len();
        summary.orphaned_artifacts = analysis.orphaned_artifacts.len();
        summary.stale_groups = analysis.stale_groups.len();
        summary.unsupported_work = analysis.unsupported_work.len();
        summary.auto_safe_actions = analysis
            .actions
            .iter()
            .filter(|action| action.auto_safe)
            .count();
        summary.health_score = health_score(summary);

        analysis
    }

    fn classify_group(&self, analysis: &mut DecayAnalysis, group: &Group, now: OffsetDateTime) {
        let days = group.days_inactive(now);
        let members = group.artifact_ids().len();
        let ready = group.is_ready_for_work(self.group_config);
        let stale = members == 0
            || (days > self.config.group_stale_days && !ready)
            || group.metadata.activity_score < self.config.group_min_activity;

        let (priority, auto_safe) = if members == 0 {
            if days > self.config.auto_archive_days {
                (ActionPriority::High, true)
            } else {
                (ActionPriority::Medium, false)
            }
        } else {
            let (priority, _) = classify_priority(days, false, self.config);
            (priority, false)
        };

        let item = StaleItem {
            kind: EntityKind::Group,
            id: group.id.clone(),
            title: group.name.clone(),
            days_inactive: days,
            activity_score: group.metadata.activity_score,
            priority,
            auto_safe,
            reason: if members == 0 {
                "group has no artifacts".to_string()
            } else {
                format!(
                    "group unchanged for {} days (readiness {:.2}, score {:.2})",
                    days, group.metadata.readiness_score, group.metadata.activity_score
                )
            },
        };

        if members == 0 {
            analysis
                .actions
                .push(CleanupAction::for_item(ActionType::Archive, &item));
        } else if ready {
            analysis.actions.push(CleanupAction {
                action_type: ActionType::Consolidate,
                priority: ActionPriority::Medium,
                item_kind: EntityKind::Group,
                item_id: group.id.clone(),
                title: group.name.clone(),
                reason: format!(
                    "group is ready to become work (readiness {:.2})",
                    group.metadata.readiness_score
                ),
                auto_safe: false,
            });
        } else if group.should_split(self.group_config) {
            analysis.actions.push(CleanupAction {
                action_type: ActionType::Review,
                priority: ActionPriority::Low,
                item_kind: EntityKind::Group,
                item_id: group.id.clone(),
                title: group.name.clone(),
                reason: format!(
                    "group is too broad (cohesion {:.2}, {} artifacts)",
                    group.metadata.cohesion_score, members
                ),
                auto_safe: false,
            });
        } else if stale {
            analysis
                .actions
                .push(CleanupAction::for_item(ActionType::Review, &item));
        }

        if stale {
            analysis.stale_groups.push(item);
        }
    }

    /// Applies one action. Archiving annotates the body and, for Work, moves
    /// the document to `closed`.
    pub fn execute_cleanup_action(
        &self,
        action: &CleanupAction,
        now: OffsetDateTime,
    ) -> Result<ActionOutcome, StoreError> {
        self.execute_cleanup_action_with(action, now, |_| Ok(()))
    }

    /// Like [`Self::execute_cleanup_action`], calling `before_work_write`
    /// with the Work about to be written. An error leaves the store untouched.
    pub fn execute_cleanup_action_with<E, F>(
        &self,
        action: &CleanupAction,
        now: OffsetDateTime,
        mut before_work_write: F,
    ) -> Result<ActionOutcome, E>
    where
        E: From<StoreError>,
        F: FnMut(&Work) -> Result<(), E>,
    {
        let outcome = match (action.item_kind, action.action_type) {
            (EntityKind::Work, ActionType::Archive) => {
                let mut work = self.store.find_work(&action.item_id)?;
                before_work_write(&work)?;
                append_archive_note(&mut work.content, &action.reason, now);
                work.metadata.status = WorkStatus::Archived;
                work.schedule = Schedule::Closed;
                work.updated_at = now;
                self.store.write_work(&mut work)?;
                ActionOutcome::Archived
            }
            (EntityKind::Work, _) => {
                let mut work = self.store.find_work(&action.item_id)?;
                before_work_write(&work)?;
                work.metadata.needs_review = true;
                work.updated_at = now;
                self.store.write_work(&mut work)?;
                ActionOutcome::Flagged
            }
            (EntityKind::Artifact, ActionType::Archive) => {
                let mut artifact = self.store.find_artifact(&action.item_id)?;
                append_archive_note(&mut artifact.content, &action.reason, now);
                artifact.metadata.status = ArtifactStatus::Archived;
                artifact.updated_at = now;
                self.store.write_artifact(&mut artifact)?;
                ActionOutcome::Archived
            }
            (EntityKind::Artifact, _) => {
                let mut artifact = self.store.find_artifact(&action.item_id)?;
                artifact.metadata.needs_review = true;
                artifact.updated_at = now;
                self.store.write_artifact(&mut artifact)?;
                ActionOutcome::Flagged
            }
            (EntityKind::Group, ActionType::Archive) => {
                let mut group = self.store.find_group(&action.item_id)?;
                append_archive_note(&mut group.content, &action.reason, now);
                group.metadata.status = GroupStatus::Archived;
                group.updated_at = now;
                self.store.write_group(&mut group)?;
                ActionOutcome::Archived
            }
            (EntityKind::Group, ActionType::Consolidate) => {
                let group = self.store.find_group(&action.item_id)?;
                let manager = GroupManager::new(self.store, self.group_config);
                let artifacts = self.store.list_all_artifacts()?;
                let mut probe = group.clone();
                refresh_derived(&mut probe, &artifacts, now);
                if probe.is_ready_for_work(self.group_config) {
                    let consolidation = manager.consolidate_group_to_work_with(
                        &group.id,
                        ConsolidationMethod::Automatic,
                        |work| before_work_write(work),
                    )?;
                    ActionOutcome::Consolidated {
                        work_id: consolidation.work.id,
                    }
                } else {
                    self.flag_group(group, now)?
                }
            }
            (EntityKind::Group, ActionType::Review) => {
                let group = self.store.find_group(&action.item_id)?;
                self.flag_group(group, now)?
            }
        };

        debug!(
            kind = %action.item_kind,
            id = %action.item_id,
            action = %action.action_type,
            "cleanup action executed"
        );
        Ok(outcome)
    }

    /// Re-analyzes and executes every auto-safe action, continuing past
    /// failures.
    pub fn auto_cleanup(&self, now: OffsetDateTime) -> Result<CleanupReport, StoreError> {
        self.auto_cleanup_with(now, |_| Ok::<(), StoreError>(()))
    }

    pub fn auto_cleanup_with<E, F>(
        &self,
        now: OffsetDateTime,
        mut before_work_write: F,
    ) -> Result<CleanupReport, StoreError>
    where
        E: From<StoreError> + fmt::Display,
        F: FnMut(&Work) -> Result<(), E>,
    {
        let analysis = self.analyze_decay(now)?;
        let mut report = CleanupReport::default();

        for action in analysis.actions.into_iter().filter(|action| action.auto_safe) {
            report.attempted += 1;
            match self.execute_cleanup_action_with(&action, now, &mut before_work_write) {
                Ok(outcome) => {
                    report.succeeded += 1;
                    report.results.push(ActionResult {
                        action,
                        outcome: Some(outcome),
                        error: None,
                    });
                }
                Err(err) => {
                    warn!(
                        kind = %action.item_kind,
                        id = %action.item_id,
                        error = %err,
                        "auto cleanup action failed"
                    );
                    report.failed += 1;
                    report.results.push(ActionResult {
                        action,
                        outcome: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "auto cleanup finished"
        );
        Ok(report)
    }

    fn flag_group(&self, mut group: Group, now: OffsetDateTime) -> Result<ActionOutcome, StoreError> {
        group.metadata.needs_review = true;
        group.updated_at = now;
        self.store.write_group(&mut group)?;
        Ok(ActionOutcome::Flagged)
    }
}

fn append_archive_note(body: &mut String, reason: &str, now: OffsetDateTime) {
    let trimmed = body.trim_end().len();
    body.truncate(trimmed);
    if !body.is_empty() {
        body.push_str("\n\n");
    }
    body.push_str(&format!("> Archived {}: {}", format_rfc3339(now), reason));
}

fn health_score(summary: &DecaySummary) -> f64 {
    let total = summary.total_work + summary.total_artifacts;
    if total == 0 {
        return 1.0;
    }
    let unhealthy = summary.stale_work
        + summary.stale_artifacts
        + summary.orphaned_artifacts
        + summary.unsupported_work;
    (1.0 - unhealthy as f64 / total as f64).clamp(0.0, 1.0)
}
