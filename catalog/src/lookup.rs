//! Single-step lookups a download request walks through before resolving bytes.
use crate::errors::LookupError;
use crate::store::CatalogStore;
use crate::types::{Build, Download, Project, Version};

/// Everything needed to resolve one download.
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadTarget {
    pub project: Project,
    pub version: Version,
    pub build: Build,
    pub download: Download,
}

pub async fn find_project(store: &dyn CatalogStore, project: &str) -> Result<Project, LookupError> {
    store
        .find_project(project)
        .await?
        .ok_or(LookupError::ProjectNotFound)
}

pub async fn find_version(
    store: &dyn CatalogStore,
    project: &str,
    version: &str,
) -> Result<(Project, Version), LookupError> {
    let project = find_project(store, project).await?;
    let version = store
        .find_version(project.id, version)
        .await?
        .ok_or(LookupError::VersionNotFound)?;
    Ok((project, version))
}

pub async fn find_build(
    store: &dyn CatalogStore,
    project: &str,
    version: &str,
    build: u32,
) -> Result<(Project, Version, Build), LookupError> {
    let (project, version) = find_version(store, project, version).await?;
    let build = store
        .find_build(project.id, version.id, build)
        .await?
        .ok_or(LookupError::BuildNotFound)?;
    Ok((project, version, build))
}

/// Finds a download by its file name, not by its key within the build.
pub async fn find_download(
    store: &dyn CatalogStore,
    project: &str,
    version: &str,
    build: u32,
    file: &str,
) -> Result<DownloadTarget, LookupError> {
    let (project, version, build) = find_build(store, project, version, build).await?;
    let download = build
        .download_named(file)
        .cloned()
        .ok_or(LookupError::DownloadNotFound)?;
    Ok(DownloadTarget {
        project,
        version,
        build,
        download,
    })
}

/// Sets or clears the promoted flag of an existing build.
pub async fn promote(
    store: &dyn CatalogStore,
    project: &str,
    version: &str,
    build: u32,
    promoted: bool,
) -> Result<Build, LookupError> {
    let (project, version, build) = find_build(store, project, version, build).await?;
    let updated = store
        .set_promoted(project.id, version.id, build.number, promoted)
        .await?
        .ok_or(LookupError::BuildNotFound)?;
    tracing::info!(
        project = %project.name,
        version = %version.name,
        build = updated.number,
        promoted,
        "Updated build promotion"
    );
    Ok(updated)
}
