//! Contract for the persistent project store, plus an in-memory store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::engine::Alteration;

/// Errors reported while fetching or updating projects.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No project exists under the identifier.
    #[error("project '{project_id}' not found")]
    NotFound {
        /// Requested identifier.
        project_id: String,
    },
    /// The addressed part does not exist in the project.
    #[error("project '{project_id}' has {parts} parts; part {part} does not exist")]
    UnknownPart {
        /// Project that was addressed.
        project_id: String,
        /// Requested part index.
        part: usize,
        /// Number of parts in the project.
        parts: usize,
    },
    /// The backing store could not complete the request.
    #[error("project store unavailable: {message}")]
    Unavailable {
        /// Human readable explanation.
        message: String,
    },
}

/// Handle to one project, offering the three update granularities.
pub trait Project {
    /// Applies `alteration` at a single location within one part.
    fn update_part_at_offset(
        &mut self,
        part: usize,
        offset: f64,
        alteration: Alteration,
    ) -> Result<(), StoreError>;

    /// Applies `alteration` across one whole part.
    fn update_part(&mut self, part: usize, alteration: Alteration) -> Result<(), StoreError>;

    /// Applies `alteration` across every part.
    fn update_parts(&mut self, alteration: Alteration) -> Result<(), StoreError>;
}

/// Fetches project handles by identifier.
pub trait ProjectStore: Send + Sync {
    /// Handle type returned by [`ProjectStore::fetch`].
    type Project: Project;

    /// Fetches the project stored under `project_id`.
    fn fetch(&self, project_id: &str) -> Result<Self::Project, StoreError>;
}

/// Granularity at which a recorded update was applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateScope {
    /// A single location within one part.
    Location {
        /// Addressed part.
        part: usize,
        /// Addressed document-time offset.
        offset: f64,
    },
    /// One whole part.
    Part {
        /// Addressed part.
        part: usize,
    },
    /// Every part of the project.
    Project,
}

/// Update recorded by [`MemoryProjectStore`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedUpdate {
    /// Where the update was applied.
    pub scope: UpdateScope,
    /// Range reported by the engine.
    pub alteration: Alteration,
}

#[derive(Debug, Default)]
struct ProjectRecord {
    parts: usize,
    updates: Vec<RecordedUpdate>,
}

type Projects = Arc<Mutex<HashMap<String, ProjectRecord>>>;

fn lock(projects: &Projects) -> MutexGuard<'_, HashMap<String, ProjectRecord>> {
    projects.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process project store keyed by project identifier.
///
/// Clones share the same projects. In auto-create mode unknown projects are
/// created on first fetch and grow parts as edits address them; otherwise
/// projects must be registered with [`MemoryProjectStore::insert_project`].
#[derive(Debug, Clone, Default)]
pub struct MemoryProjectStore {
    projects: Projects,
    auto_create: bool,
}

impl MemoryProjectStore {
    /// Builds a store that only serves registered projects.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store that creates projects on first use.
    #[must_use]
    pub fn auto_create() -> Self {
        Self {
            projects: Projects::default(),
            auto_create: true,
        }
    }

    /// Registers a project with `parts` parts, replacing any previous one.
    pub fn insert_project(&self, project_id: impl Into<String>, parts: usize) {
        lock(&self.projects).insert(
            project_id.into(),
            ProjectRecord {
                parts,
                updates: Vec::new(),
            },
        );
    }

    /// Reports whether a project exists under `project_id`.
    #[must_use]
    pub fn contains(&self, project_id: &str) -> bool {
        lock(&self.projects).contains_key(project_id)
    }

    /// Returns the updates applied to a project, oldest first.
    #[must_use]
    pub fn updates(&self, project_id: &str) -> Vec<RecordedUpdate> {
        lock(&self.projects)
            .get(project_id)
            .map(|record| record.updates.clone())
            .unwrap_or_default()
    }
}

impl ProjectStore for MemoryProjectStore {
    type Project = MemoryProject;

    fn fetch(&self, project_id: &str) -> Result<Self::Project, StoreError> {
        let mut projects = lock(&self.projects);
        if !projects.contains_key(project_id) {
            if !self.auto_create {
                return Err(StoreError::NotFound {
                    project_id: project_id.to_owned(),
                });
            }
            projects.insert(project_id.to_owned(), ProjectRecord::default());
        }
        Ok(MemoryProject {
            project_id: project_id.to_owned(),
            projects: Arc::clone(&self.projects),
            grow_parts: self.auto_create,
        })
    }
}

/// Handle to a project held by [`MemoryProjectStore`].
#[derive(Debug)]
pub struct MemoryProject {
    project_id: String,
    projects: Projects,
    grow_parts: bool,
}

impl MemoryProject {
    fn record(&self, part: Option<usize>, update: RecordedUpdate) -> Result<(), StoreError> {
        let mut projects = lock(&self.projects);
        let record =
            projects
                .get_mut(&self.project_id)
                .ok_or_else(|| StoreError::NotFound {
                    project_id: self.project_id.clone(),
                })?;
        if let Some(part) = part
            && part >= record.parts
        {
            if !self.grow_parts {
                return Err(StoreError::UnknownPart {
                    project_id: self.project_id.clone(),
                    part,
                    parts: record.parts,
                });
            }
            record.parts = part + 1;
        }
        record.updates.push(update);
        Ok(())
    }
}

impl Project for MemoryProject {
    fn update_part_at_offset(
        &mut self,
        part: usize,
        offset: f64,
        alteration: Alteration,
    ) -> Result<(), StoreError> {
        self.record(
            Some(part),
            RecordedUpdate {
                scope: UpdateScope::Location { part, offset },
                alteration,
            },
        )
    }

    fn update_part(&mut self, part: usize, alteration: Alteration) -> Result<(), StoreError> {
        self.record(
            Some(part),
            RecordedUpdate {
                scope: UpdateScope::Part { part },
                alteration,
            },
        )
    }

    fn update_parts(&mut self, alteration: Alteration) -> Result<(), StoreError> {
        self.record(
            None,
            RecordedUpdate {
                scope: UpdateScope::Project,
                alteration,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_projects_are_not_found() {
        let store = MemoryProjectStore::new();
        assert!(matches!(
            store.fetch("missing"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn registered_projects_record_updates() {
        let store = MemoryProjectStore::new();
        store.insert_project("score", 2);
        let mut project = store.fetch("score").expect("fetch project");
        project
            .update_part_at_offset(1, 3.0, Alteration::new(3.0, 4.0))
            .expect("location update");
        project
            .update_parts(Alteration::point(0.0))
            .expect("project update");

        let updates = store.updates("score");
        assert_eq!(updates.len(), 2);
        assert_eq!(
            updates.first().map(|update| update.scope),
            Some(UpdateScope::Location {
                part: 1,
                offset: 3.0
            })
        );
        assert_eq!(
            updates.get(1).map(|update| update.scope),
            Some(UpdateScope::Project)
        );
    }

    #[test]
    fn registered_projects_reject_unknown_parts() {
        let store = MemoryProjectStore::new();
        store.insert_project("score", 1);
        let mut project = store.fetch("score").expect("fetch project");
        let error = project
            .update_part(3, Alteration::point(0.0))
            .expect_err("part 3 does not exist");
        assert!(matches!(error, StoreError::UnknownPart { part: 3, .. }));
        assert!(store.updates("score").is_empty());
    }

    #[test]
    fn auto_created_projects_grow_parts() {
        let store = MemoryProjectStore::auto_create();
        let mut project = store.fetch("fresh").expect("auto-create project");
        project
            .update_part(5, Alteration::point(0.0))
            .expect("part grows on demand");
        assert!(store.contains("fresh"));
        assert_eq!(store.updates("fresh").len(), 1);
    }

    #[test]
    fn clones_share_projects() {
        let store = MemoryProjectStore::new();
        let view = store.clone();
        store.insert_project("shared", 1);
        assert!(view.contains("shared"));
    }
}
