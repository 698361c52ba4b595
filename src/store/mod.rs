use std::cmp::Ordering;
use std::collections::HashMap;
use std::error::Error;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::document::{self, DocumentError};
use crate::domain::artifact::{Artifact, ArtifactType};
use crate::domain::group::{Group, GROUP_PREFIX};
use crate::domain::metadata::now_utc;
use crate::domain::schedule::Schedule;
use crate::domain::work::{Work, WORK_PREFIX};
use crate::domain::EntityKind;
use crate::entity_id::document_filename;

pub mod layout;

pub use layout::StoreLayout;

const DOCUMENT_EXTENSION: &str = "md";

pub trait StoredEntity: Serialize + DeserializeOwned {
    const KIND: EntityKind;

    fn entity_id(&self) -> &str;
    fn created_at(&self) -> OffsetDateTime;
    fn updated_at(&self) -> OffsetDateTime;
    fn filename_prefix(&self) -> &'static str;
    fn slug_source(&self) -> &str;
    fn body(&self) -> &str;
    fn set_body(&mut self, body: String);
    fn stored_path(&self) -> Option<&Path>;
    fn set_stored_path(&mut self, path: PathBuf);
}

impl StoredEntity for Work {
    const KIND: EntityKind = EntityKind::Work;

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    fn filename_prefix(&self) -> &'static str {
        WORK_PREFIX
    }

    fn slug_source(&self) -> &str {
        &self.title
    }

    fn body(&self) -> &str {
        &self.content
    }

    fn set_body(&mut self, body: String) {
        self.content = body;
    }

    fn stored_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    fn set_stored_path(&mut self, path: PathBuf) {
        self.file_path = Some(path);
    }
}

impl StoredEntity for Artifact {
    const KIND: EntityKind = EntityKind::Artifact;

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    fn filename_prefix(&self) -> &'static str {
        self.artifact_type.filename_prefix()
    }

    fn slug_source(&self) -> &str {
        &self.summary
    }

    fn body(&self) -> &str {
        &self.content
    }

    fn set_body(&mut self, body: String) {
        self.content = body;
    }

    fn stored_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    fn set_stored_path(&mut self, path: PathBuf) {
        self.file_path = Some(path);
    }
}

impl StoredEntity for Group {
    const KIND: EntityKind = EntityKind::Group;

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    fn filename_prefix(&self) -> &'static str {
        GROUP_PREFIX
    }

    fn slug_source(&self) -> &str {
        &self.name
    }

    fn body(&self) -> &str {
        &self.content
    }

    fn set_body(&mut self, body: String) {
        self.content = body;
    }

    fn stored_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    fn set_stored_path(&mut self, path: PathBuf) {
        self.file_path = Some(path);
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub work: Vec<Work>,
    pub artifacts: Vec<Artifact>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.work.is_empty() && self.artifacts.is_empty()
    }
}

/// Several documents claiming one id. `kept` is the newest copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateSet {
    pub kind: EntityKind,
    pub id: String,
    pub kept: PathBuf,
    pub stale: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct EntityStore {
    layout: StoreLayout,
    config: StoreConfig,
}

impl EntityStore {
    pub fn new(root: impl Into<PathBuf>, config: StoreConfig) -> Self {
        Self {
            layout: StoreLayout::new(root),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn read_work(&self, path: &Path) -> Result<Work, StoreError> {
        self.read_entity(path)
    }

    pub fn write_work(&self, work: &mut Work) -> Result<PathBuf, StoreError> {
        let target = self.layout.work_dir(work.schedule);
        self.write_entity(work, target)
    }

    /// Sets the schedule and relocates the document. On failure the schedule
    /// is restored and the previous document is left untouched.
    pub fn update_schedule(
        &self,
        work: &mut Work,
        schedule: Schedule,
    ) -> Result<PathBuf, StoreError> {
        let previous_schedule = work.schedule;
        let previous_updated_at = work.updated_at;
        work.schedule = schedule;
        work.updated_at = now_utc();

        match self.write_work(work) {
            Ok(path) => {
                debug!(
                    work_id = %work.id,
                    from = %previous_schedule,
                    to = %schedule,
                    "work schedule updated"
                );
                Ok(path)
            }
            Err(err) => {
                work.schedule = previous_schedule;
                work.updated_at = previous_updated_at;
                Err(err)
            }
        }
    }

    pub fn list_work(&self, schedule: Schedule) -> Result<Vec<Work>, StoreError> {
        let mut work = self.list_entities::<Work>(&[self.layout.work_dir(schedule)])?;
        sort_work(&mut work);
        Ok(work)
    }

    pub fn list_all_work(&self) -> Result<Vec<Work>, StoreError> {
        let mut work = self.list_entities::<Work>(&self.layout.work_dirs())?;
        sort_work(&mut work);
        Ok(work)
    }

    pub fn find_work(&self, id: &str) -> Result<Work, StoreError> {
        self.list_all_work()?
            .into_iter()
            .find(|work| work.id == id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Work, id))
    }

    pub fn read_artifact(&self, path: &Path) -> Result<Artifact, StoreError> {
        self.read_entity(path)
    }

    pub fn write_artifact(&self, artifact: &mut Artifact) -> Result<PathBuf, StoreError> {
        let target = self.layout.artifact_dir(artifact.artifact_type);
        self.write_entity(artifact, target)
    }

    pub fn update_artifact_type(
        &self,
        artifact: &mut Artifact,
        artifact_type: ArtifactType,
    ) -> Result<PathBuf, StoreError> {
        let previous_type = artifact.artifact_type;
        let previous_updated_at = artifact.updated_at;
        artifact.artifact_type = artifact_type;
        artifact.updated_at = now_utc();

        self.write_artifact(artifact).inspect_err(|_| {
            artifact.artifact_type = previous_type;
            artifact.updated_at = previous_updated_at;
        })
    }

    pub fn list_artifacts(&self, artifact_type: ArtifactType) -> Result<Vec<Artifact>, StoreError> {
        let mut artifacts =
            self.list_entities::<Artifact>(&[self.layout.artifact_dir(artifact_type)])?;
        sort_newest_first(&mut artifacts);
        Ok(artifacts)
    }

    pub fn list_all_artifacts(&self) -> Result<Vec<Artifact>, StoreError> {
        let mut artifacts = self.list_entities::<Artifact>(&self.layout.artifact_dirs())?;
        sort_newest_first(&mut artifacts);
        Ok(artifacts)
    }

    pub fn find_artifact(&self, id: &str) -> Result<Artifact, StoreError> {
        self.list_all_artifacts()?
            .into_iter()
            .find(|artifact| artifact.id == id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Artifact, id))
    }

    pub fn read_group(&self, path: &Path) -> Result<Group, StoreError> {
        self.read_entity(path)
    }

    pub fn write_group(&self, group: &mut Group) -> Result<PathBuf, StoreError> {
        let target = self.layout.group_dir();
        self.write_entity(group, target)
    }

    pub fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        let mut groups = self.list_entities::<Group>(&[self.layout.group_dir()])?;
        sort_newest_first(&mut groups);
        Ok(groups)
    }

    pub fn find_group(&self, id: &str) -> Result<Group, StoreError> {
        self.list_groups()?
            .into_iter()
            .find(|group| group.id == id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Group, id))
    }

    /// Groups are the only entities that are ever removed from disk.
    pub fn delete_group(&self, group: &Group) -> Result<(), StoreError> {
        let path = match group.file_path.clone() {
            Some(path) => path,
            None => self
                .find_group(&group.id)?
                .file_path
                .ok_or_else(|| StoreError::not_found(EntityKind::Group, &group.id))?,
        };
        fs::remove_file(&path)?;
        debug!(group_id = %group.id, path = %path.display(), "group deleted");
        Ok(())
    }

    pub fn search(&self, query: &str) -> Result<SearchResults, StoreError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(SearchResults::default());
        }

        let work = self
            .list_all_work()?
            .into_iter()
            .filter(|work| work.matches_query(&needle))
            .collect();
        let artifacts = self
            .list_all_artifacts()?
            .into_iter()
            .filter(|artifact| artifact.matches_query(&needle))
            .collect();
        Ok(SearchResults { work, artifacts })
    }

    /// Reports ids stored in more than one document, e.g. after a crash
    /// between writing a relocated document and removing the old one.
    pub fn find_duplicates(&self) -> Result<Vec<DuplicateSet>, StoreError> {
        let mut sets = Vec::new();
        sets.extend(duplicates_of(
            self.scan_entities::<Work>(&self.layout.work_dirs())?,
        ));
        sets.extend(duplicates_of(
            self.scan_entities::<Artifact>(&self.layout.artifact_dirs())?,
        ));
        sets.extend(duplicates_of(
            self.scan_entities::<Group>(&[self.layout.group_dir()])?,
        ));
        Ok(sets)
    }

    pub fn remove_duplicates(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for set in self.find_duplicates()? {
            for path in &set.stale {
                fs::remove_file(path)?;
                removed += 1;
                warn!(
                    kind = %set.kind,
                    id = %set.id,
                    removed = %path.display(),
                    kept = %set.kept.display(),
                    "removed duplicate document"
                );
            }
        }
        Ok(removed)
    }

    fn read_entity<E: StoredEntity>(&self, path: &Path) -> Result<E, StoreError> {
        let raw = fs::read_to_string(path)?;
        let (mut entity, body): (E, String) =
            document::parse(&raw).map_err(|source| StoreError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        entity.set_body(body);
        entity.set_stored_path(path.to_path_buf());
        Ok(entity)
    }

    fn write_entity<E: StoredEntity>(
        &self,
        entity: &mut E,
        target_dir: PathBuf,
    ) -> Result<PathBuf, StoreError> {
        let body = document::normalize_body(entity.body());
        entity.set_body(body);

        let previous_path = entity.stored_path().map(Path::to_path_buf);
        let filename = match previous_path.as_deref().and_then(Path::file_name) {
            Some(name) => name.to_os_string(),
            None => OsString::from(document_filename(
                entity.filename_prefix(),
                entity.slug_source(),
                entity.created_at(),
                entity.entity_id(),
                self.config.slug_max_len,
            )),
        };
        let path = target_dir.join(&filename);
        let rendered = document::render(&*entity, entity.body()).map_err(StoreError::Render)?;

        fs::create_dir_all(&target_dir)?;
        write_atomically(&path, rendered.as_bytes())?;

        if let Some(old) = previous_path.filter(|old| *old != path) {
            match fs::remove_file(&old) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(StoreError::Io(err)),
            }
            debug!(
                kind = %E::KIND,
                id = %entity.entity_id(),
                from = %old.display(),
                to = %path.display(),
                "document relocated"
            );
        }

        entity.set_stored_path(path.clone());
        Ok(path)
    }

    /// Lenient listing: unreadable or malformed documents are logged and
    /// skipped, and duplicate ids collapse to the newest copy.
    fn list_entities<E: StoredEntity>(&self, dirs: &[PathBuf]) -> Result<Vec<E>, StoreError> {
        let mut by_id: HashMap<String, E> = HashMap::new();
        for entity in self.scan_entities::<E>(dirs)? {
            let id = entity.entity_id().to_string();
            match by_id.get(&id) {
                Some(existing) if existing.updated_at() >= entity.updated_at() => {
                    warn!(kind = %E::KIND, id = %id, "ignoring older duplicate document");
                }
                Some(_) => {
                    warn!(kind = %E::KIND, id = %id, "newer duplicate document replaces older copy");
                    by_id.insert(id, entity);
                }
                None => {
                    by_id.insert(id, entity);
                }
            }
        }
        Ok(by_id.into_values().collect())
    }

    fn scan_entities<E: StoredEntity>(&self, dirs: &[PathBuf]) -> Result<Vec<E>, StoreError> {
        let mut entities = Vec::new();
        for dir in dirs {
            for path in document_paths(dir)? {
                match self.read_entity::<E>(&path) {
                    Ok(entity) => entities.push(entity),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping unreadable document");
                    }
                }
            }
        }
        Ok(entities)
    }
}

fn document_paths(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));
        if hidden || !path.is_file() {
            continue;
        }
        if path
            .extension()
            .is_some_and(|ext| ext == DOCUMENT_EXTENSION)
        {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Writes to a hidden sibling then renames over the target, so readers never
/// observe a half-written document.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("document");
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(err) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::Io(err));
    }
    Ok(())
}

fn sort_work(work: &mut [Work]) {
    work.sort_by(work_order);
}

pub(crate) fn work_order(left: &Work, right: &Work) -> Ordering {
    left.metadata
        .priority
        .cmp(&right.metadata.priority)
        .then_with(|| right.updated_at.cmp(&left.updated_at))
        .then_with(|| left.id.cmp(&right.id))
}

fn sort_newest_first<E: StoredEntity>(entities: &mut [E]) {
    entities.sort_by(|left, right| {
        right
            .updated_at()
            .cmp(&left.updated_at())
            .then_with(|| left.entity_id().cmp(right.entity_id()))
    });
}

fn duplicates_of<E: StoredEntity>(entities: Vec<E>) -> Vec<DuplicateSet> {
    let mut by_id: HashMap<String, Vec<E>> = HashMap::new();
    for entity in entities {
        by_id
            .entry(entity.entity_id().to_string())
            .or_default()
            .push(entity);
    }

    let mut sets: Vec<DuplicateSet> = by_id
        .into_iter()
        .filter(|(_, copies)| copies.len() > 1)
        .filter_map(|(id, mut copies)| {
            copies.sort_by_key(|copy| std::cmp::Reverse(copy.updated_at()));
            let mut paths = copies
                .iter()
                .filter_map(|copy| copy.stored_path().map(Path::to_path_buf));
            let kept = paths.next()?;
            Some(DuplicateSet {
                kind: E::KIND,
                id,
                kept,
                stale: paths.collect(),
            })
        })
        .collect();
    sets.sort_by(|left, right| left.id.cmp(&right.id));
    sets
}

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Malformed {
        path: PathBuf,
        source: DocumentError,
    },
    Render(DocumentError),
    NotFound {
        kind: EntityKind,
        id: String,
    },
    Validation(String),
}

impl StoreError {
    pub fn not_found(kind: EntityKind, id: &str) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "I/O error: {}", err),
            StoreError::Malformed { path, source } => {
                write!(f, "{} ({})", source, path.display())
            }
            StoreError::Render(err) => write!(f, "failed to render document: {}", err),
            StoreError::NotFound { kind, id } => write!(f, "{} '{}' not found", kind, id),
            StoreError::Validation(message) => write!(f, "{}", message),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err),
            StoreError::Malformed { source, .. } => Some(source),
            StoreError::Render(err) => Some(err),
            StoreError::NotFound { .. } => None,
            StoreError::Validation(_) => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        StoreError::Io(value)
    }
}

#[cfg(test)]
mod tests;
