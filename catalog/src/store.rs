//! Persistence seam for catalog records.
//!
//! Every insert is an insert-if-absent on the record's natural key. When a
//! row with the same key already exists the stored row is returned instead,
//! so concurrent creators always converge on a single record.
use crate::types::{Build, Project, ProjectId, Version, VersionFamily, VersionId};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("record references unknown {0}")]
    DanglingReference(&'static str),
}

/// Outcome of an insert-if-absent.
#[derive(Clone, Debug, PartialEq)]
pub enum Stored<T> {
    Created(T),
    Existing(T),
}

impl<T> Stored<T> {
    pub fn into_inner(self) -> T {
        match self {
            Stored::Created(value) | Stored::Existing(value) => value,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Stored::Created(_))
    }
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_project(&self, name: &str) -> Result<Option<Project>, StoreError>;
    async fn insert_project(&self, project: Project) -> Result<Stored<Project>, StoreError>;

    async fn find_family(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<VersionFamily>, StoreError>;
    async fn insert_family(
        &self,
        family: VersionFamily,
    ) -> Result<Stored<VersionFamily>, StoreError>;

    async fn find_version(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<Version>, StoreError>;
    async fn insert_version(&self, version: Version) -> Result<Stored<Version>, StoreError>;

    async fn find_build(
        &self,
        project: ProjectId,
        version: VersionId,
        number: u32,
    ) -> Result<Option<Build>, StoreError>;
    /// The highest-numbered build of the project and version below `number`.
    async fn previous_build(
        &self,
        project: ProjectId,
        version: VersionId,
        number: u32,
    ) -> Result<Option<Build>, StoreError>;
    async fn insert_build(&self, build: Build) -> Result<Stored<Build>, StoreError>;

    /// Returns the updated build, or `None` if no build has that key.
    async fn set_promoted(
        &self,
        project: ProjectId,
        version: VersionId,
        number: u32,
        promoted: bool,
    ) -> Result<Option<Build>, StoreError>;
}

type BuildKey = (ProjectId, VersionId, u32);

/// The full set of catalog records, indexed by natural key.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct CatalogData {
    projects: HashMap<String, Project>,
    families: HashMap<(ProjectId, String), VersionFamily>,
    versions: HashMap<(ProjectId, String), Version>,
    builds: BTreeMap<BuildKey, Build>,
}

impl CatalogData {
    pub(crate) fn find_project(&self, name: &str) -> Option<Project> {
        self.projects.get(name).cloned()
    }

    pub(crate) fn insert_project(&mut self, project: Project) -> Stored<Project> {
        if let Some(existing) = self.projects.get(&project.name) {
            return Stored::Existing(existing.clone());
        }
        self.projects.insert(project.name.clone(), project.clone());
        Stored::Created(project)
    }

    fn has_project(&self, id: ProjectId) -> bool {
        self.projects.values().any(|p| p.id == id)
    }

    pub(crate) fn find_family(&self, project: ProjectId, name: &str) -> Option<VersionFamily> {
        self.families.get(&(project, name.to_string())).cloned()
    }

    pub(crate) fn insert_family(
        &mut self,
        family: VersionFamily,
    ) -> Result<Stored<VersionFamily>, StoreError> {
        let key = (family.project, family.name.clone());
        if let Some(existing) = self.families.get(&key) {
            return Ok(Stored::Existing(existing.clone()));
        }
        if !self.has_project(family.project) {
            return Err(StoreError::DanglingReference("project"));
        }
        self.families.insert(key, family.clone());
        Ok(Stored::Created(family))
    }

    pub(crate) fn find_version(&self, project: ProjectId, name: &str) -> Option<Version> {
        self.versions.get(&(project, name.to_string())).cloned()
    }

    pub(crate) fn insert_version(
        &mut self,
        version: Version,
    ) -> Result<Stored<Version>, StoreError> {
        let key = (version.project, version.name.clone());
        if let Some(existing) = self.versions.get(&key) {
            return Ok(Stored::Existing(existing.clone()));
        }
        // A version may only hang off a family of its own project.
        let family_matches = self
            .families
            .values()
            .any(|f| f.id == version.family && f.project == version.project);
        if !family_matches {
            return Err(StoreError::DanglingReference("version family"));
        }
        self.versions.insert(key, version.clone());
        Ok(Stored::Created(version))
    }

    pub(crate) fn find_build(
        &self,
        project: ProjectId,
        version: VersionId,
        number: u32,
    ) -> Option<Build> {
        self.builds.get(&(project, version, number)).cloned()
    }

    pub(crate) fn previous_build(
        &self,
        project: ProjectId,
        version: VersionId,
        number: u32,
    ) -> Option<Build> {
        self.builds
            .range((project, version, 0)..(project, version, number))
            .next_back()
            .map(|(_, build)| build.clone())
    }

    pub(crate) fn insert_build(&mut self, build: Build) -> Result<Stored<Build>, StoreError> {
        let key = (build.project, build.version, build.number);
        if let Some(existing) = self.builds.get(&key) {
            return Ok(Stored::Existing(existing.clone()));
        }
        let version_matches = self
            .versions
            .values()
            .any(|v| v.id == build.version && v.project == build.project);
        if !version_matches {
            return Err(StoreError::DanglingReference("version"));
        }
        self.builds.insert(key, build.clone());
        Ok(Stored::Created(build))
    }

    pub(crate) fn set_promoted(
        &mut self,
        project: ProjectId,
        version: VersionId,
        number: u32,
        promoted: bool,
    ) -> Option<Build> {
        let build = self.builds.get_mut(&(project, version, number))?;
        build.promoted = Some(promoted);
        Some(build.clone())
    }
}

/// Keeps every record in process memory. Contents are lost on exit.
#[derive(Default)]
pub struct MemoryCatalogStore {
    data: RwLock<CatalogData>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn find_project(&self, name: &str) -> Result<Option<Project>, StoreError> {
        Ok(self.data.read().find_project(name))
    }

    async fn insert_project(&self, project: Project) -> Result<Stored<Project>, StoreError> {
        Ok(self.data.write().insert_project(project))
    }

    async fn find_family(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<VersionFamily>, StoreError> {
        Ok(self.data.read().find_family(project, name))
    }

    async fn insert_family(
        &self,
        family: VersionFamily,
    ) -> Result<Stored<VersionFamily>, StoreError> {
        self.data.write().insert_family(family)
    }

    async fn find_version(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<Version>, StoreError> {
        Ok(self.data.read().find_version(project, name))
    }

    async fn insert_version(&self, version: Version) -> Result<Stored<Version>, StoreError> {
        self.data.write().insert_version(version)
    }

    async fn find_build(
        &self,
        project: ProjectId,
        version: VersionId,
        number: u32,
    ) -> Result<Option<Build>, StoreError> {
        Ok(self.data.read().find_build(project, version, number))
    }

    async fn previous_build(
        &self,
        project: ProjectId,
        version: VersionId,
        number: u32,
    ) -> Result<Option<Build>, StoreError> {
        Ok(self.data.read().previous_build(project, version, number))
    }

    async fn insert_build(&self, build: Build) -> Result<Stored<Build>, StoreError> {
        self.data.write().insert_build(build)
    }

    async fn set_promoted(
        &self,
        project: ProjectId,
        version: VersionId,
        number: u32,
        promoted: bool,
    ) -> Result<Option<Build>, StoreError> {
        Ok(self
            .data
            .write()
            .set_promoted(project, version, number, promoted))
    }
}
