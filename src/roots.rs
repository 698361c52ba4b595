use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::app::{App, AppError};
use crate::config::EngineConfig;
use crate::domain::artifact::Artifact;
use crate::domain::schedule::Schedule;
use crate::domain::work::Work;
use crate::domain::EntityKind;
use crate::lifecycle::DecaySummary;
use crate::store::{work_order, SearchResults, StoreError};

#[derive(Debug, Clone, Serialize)]
pub struct RootedWork {
    pub root: PathBuf,
    pub work: Work,
}

#[derive(Debug, Clone, Serialize)]
pub struct RootSearch {
    pub root: PathBuf,
    pub results: SearchResults,
}

#[derive(Debug, Clone, Serialize)]
pub struct RootHealth {
    pub root: PathBuf,
    pub summary: DecaySummary,
}

pub struct RootSet {
    apps: Vec<App>,
}

impl RootSet {
    pub fn open<I, P>(roots: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::open_with(roots, EngineConfig::load)
    }

    pub fn open_with<I, P, F>(roots: I, mut load: F) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
        F: FnMut(&Path) -> Result<EngineConfig, crate::config::ConfigError>,
    {
        let mut seen = BTreeSet::new();
        let mut apps = Vec::new();
        for root in roots {
            let root = root.into();
            if !seen.insert(root.clone()) {
                debug!(root = %root.display(), "duplicate root ignored");
                continue;
            }
            let config = load(&root)?;
            apps.push(App::with_config(root, config)?);
        }
        if apps.is_empty() {
            return Err(AppError::InvalidArgument(
                "at least one storage root is required".to_string(),
            ));
        }
        Ok(Self { apps })
    }

    pub fn apps(&self) -> &[App] {
        &self.apps
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// The first root given. New entities are created here.
    pub fn primary(&self) -> &App {
        &self.apps[0]
    }

    pub fn app_for(&self, root: &Path) -> Option<&App> {
        self.apps.iter().find(|app| app.root() == root)
    }

    /// Finds the root holding the Work, searching roots in order.
    pub fn locate_work(&self, id: &str) -> Result<(&App, Work), AppError> {
        for app in &self.apps {
            match app.find_work(id) {
                Ok(work) => return Ok((app, work)),
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }
        Err(StoreError::not_found(EntityKind::Work, id).into())
    }

    pub fn locate_artifact(&self, id: &str) -> Result<(&App, Artifact), AppError> {
        for app in &self.apps {
            match app.find_artifact(id) {
                Ok(artifact) => return Ok((app, artifact)),
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }
        Err(StoreError::not_found(EntityKind::Artifact, id).into())
    }

    pub fn locate_group(&self, id: &str) -> Result<&App, AppError> {
        for app in &self.apps {
            match app.find_group(id) {
                Ok(_) => return Ok(app),
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }
        Err(StoreError::not_found(EntityKind::Group, id).into())
    }

    pub fn list_work(&self, schedule: Option<Schedule>) -> Result<Vec<RootedWork>, AppError> {
        let mut merged = Vec::new();
        for app in &self.apps {
            merged.extend(app.list_work(schedule)?.into_iter().map(|work| RootedWork {
                root: app.root().to_path_buf(),
                work,
            }));
        }
        merged.sort_by(|left, right| work_order(&left.work, &right.work));
        Ok(merged)
    }

    pub fn search(&self, query: &str) -> Result<Vec<RootSearch>, AppError> {
        let mut hits = Vec::new();
        for app in &self.apps {
            let results = app.search(query)?;
            if !results.is_empty() {
                hits.push(RootSearch {
                    root: app.root().to_path_buf(),
                    results,
                });
            }
        }
        Ok(hits)
    }

    pub fn health(&self, now: OffsetDateTime) -> Result<Vec<RootHealth>, AppError> {
        self.apps
            .iter()
            .map(|app| {
                Ok(RootHealth {
                    root: app.root().to_path_buf(),
                    summary: app.analyze_decay(now)?.summary,
                })
            })
            .collect()
    }
}
