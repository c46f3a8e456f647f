//! Lazily creates the project / version family / version chain a build is
//! reported against.
use crate::errors::PublishError;
use crate::manifest::{ManifestClient, VersionManifest};
use crate::store::CatalogStore;
use crate::types::{Project, Version, VersionFamily, is_safe_segment};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct Hierarchy {
    pub project: Project,
    pub family: VersionFamily,
    pub version: Version,
}

/// Result of looking up one level of the hierarchy before anything is written.
enum Lookup<T> {
    Found(T),
    Missing,
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(record) => Lookup::Found(record),
            None => Lookup::Missing,
        }
    }
}

impl<T> Lookup<T> {
    fn is_missing(&self) -> bool {
        matches!(self, Lookup::Missing)
    }
}

pub struct HierarchyMaterializer {
    store: Arc<dyn CatalogStore>,
    manifest: ManifestClient,
}

impl HierarchyMaterializer {
    pub fn new(store: Arc<dyn CatalogStore>, manifest: ManifestClient) -> Self {
        HierarchyMaterializer { store, manifest }
    }

    /// Returns the stored project, family and version for the given names,
    /// creating whichever of them do not exist yet. `display_name` and
    /// `repository` only apply when the project is created.
    ///
    /// The manifest is only consulted when a family or version is missing,
    /// and then at most once. Every manifest lookup happens before the first
    /// insert, so an unknown family or version leaves the store untouched.
    pub async fn materialize(
        &self,
        project_name: &str,
        display_name: &str,
        repository: Option<&str>,
        family_name: &str,
        version_name: &str,
    ) -> Result<Hierarchy, PublishError> {
        // Project and version names become cache directories.
        if !Project::is_valid_name(project_name) {
            return Err(PublishError::InvalidProjectName(project_name.to_string()));
        }
        if !is_safe_segment(version_name) {
            return Err(PublishError::InvalidVersionName(version_name.to_string()));
        }

        let project: Lookup<Project> = self.store.find_project(project_name).await?.into();

        let (family, version): (Lookup<VersionFamily>, Lookup<Version>) = match &project {
            Lookup::Found(p) => (
                self.store.find_family(p.id, family_name).await?.into(),
                self.store.find_version(p.id, version_name).await?.into(),
            ),
            Lookup::Missing => (Lookup::Missing, Lookup::Missing),
        };

        let (family_released, version_released) = if family.is_missing() || version.is_missing()
        {
            let manifest = self
                .manifest
                .fetch()
                .await
                .map_err(PublishError::ManifestUnavailable)?;
            (
                release_time(&manifest, &family, family_name)?,
                release_time(&manifest, &version, version_name)?,
            )
        } else {
            (None, None)
        };

        let project = match project {
            Lookup::Found(p) => p,
            Lookup::Missing => {
                let mut project = Project::new(project_name, display_name);
                project.repository = repository.map(str::to_string);
                let stored = self.store.insert_project(project).await?;
                if stored.was_created() {
                    tracing::info!(project = project_name, "Created project");
                }
                stored.into_inner()
            }
        };

        let family = match family {
            Lookup::Found(f) => f,
            Lookup::Missing => {
                let stored = self
                    .store
                    .insert_family(VersionFamily::new(project.id, family_name, family_released))
                    .await?;
                if stored.was_created() {
                    tracing::info!(
                        project = project_name,
                        family = family_name,
                        "Created version family"
                    );
                }
                stored.into_inner()
            }
        };

        let version = match version {
            Lookup::Found(v) => v,
            Lookup::Missing => {
                let stored = self
                    .store
                    .insert_version(Version::new(&family, version_name, version_released))
                    .await?;
                if stored.was_created() {
                    tracing::info!(
                        project = project_name,
                        version = version_name,
                        "Created version"
                    );
                }
                stored.into_inner()
            }
        };

        Ok(Hierarchy {
            project,
            family,
            version,
        })
    }
}

fn release_time<T>(
    manifest: &VersionManifest,
    lookup: &Lookup<T>,
    name: &str,
) -> Result<Option<DateTime<Utc>>, PublishError> {
    match lookup {
        Lookup::Found(_) => Ok(None),
        Lookup::Missing => manifest
            .entry(name)
            .map(|entry| Some(entry.release_time))
            .ok_or_else(|| PublishError::ManifestEntryNotFound(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCatalogStore;
    use crate::testutils::mount_manifest;
    use chrono::TimeZone;
    use wiremock::MockServer;

    async fn materializer(server: &MockServer) -> (Arc<MemoryCatalogStore>, HierarchyMaterializer) {
        let store = Arc::new(MemoryCatalogStore::new());
        let manifest = ManifestClient::new(format!("{}/manifest.json", server.uri()));
        (store.clone(), HierarchyMaterializer::new(store, manifest))
    }

    #[tokio::test]
    async fn test_creates_missing_levels_with_one_manifest_fetch() {
        let mock_server = MockServer::start().await;
        mount_manifest(&mock_server, 1).await;
        let (store, materializer) = materializer(&mock_server).await;

        let hierarchy = materializer
            .materialize("paper", "Paper", None, "1.21", "1.21.4")
            .await
            .unwrap();

        assert_eq!(hierarchy.project.display_name, "Paper");
        assert_eq!(hierarchy.project.repository, None);
        assert_eq!(
            hierarchy.family.released,
            Some(Utc.with_ymd_and_hms(2024, 6, 13, 8, 24, 3).unwrap())
        );
        assert_eq!(
            hierarchy.version.released,
            Some(Utc.with_ymd_and_hms(2024, 12, 3, 10, 12, 57).unwrap())
        );
        assert_eq!(hierarchy.version.family, hierarchy.family.id);
        assert_eq!(
            store.find_version(hierarchy.project.id, "1.21.4").await.unwrap(),
            Some(hierarchy.version)
        );
    }

    #[tokio::test]
    async fn test_existing_hierarchy_skips_manifest() {
        let mock_server = MockServer::start().await;
        mount_manifest(&mock_server, 1).await;
        let (_store, materializer) = materializer(&mock_server).await;

        let first = materializer
            .materialize("paper", "Paper", None, "1.21", "1.21.4")
            .await
            .unwrap();
        // Served from the store; the mock would fail verification on a second fetch.
        let second = materializer
            .materialize("paper", "Renamed", None, "1.21", "1.21.4")
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_new_version_in_existing_family() {
        let mock_server = MockServer::start().await;
        mount_manifest(&mock_server, 2).await;
        let (_store, materializer) = materializer(&mock_server).await;

        let first = materializer
            .materialize("paper", "Paper", None, "1.21", "1.21.3")
            .await
            .unwrap();
        let second = materializer
            .materialize("paper", "Paper", None, "1.21", "1.21.4")
            .await
            .unwrap();

        assert_eq!(first.family, second.family);
        assert_ne!(first.version.id, second.version.id);
    }

    #[tokio::test]
    async fn test_unknown_manifest_entry_creates_nothing() {
        let mock_server = MockServer::start().await;
        mount_manifest(&mock_server, 2).await;
        let (store, materializer) = materializer(&mock_server).await;

        let err = materializer
            .materialize("paper", "Paper", None, "1.21", "9.99")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::ManifestEntryNotFound(ref id) if id == "9.99"));

        let err = materializer
            .materialize("paper", "Paper", None, "custom", "1.21.4")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::ManifestEntryNotFound(ref id) if id == "custom"));

        assert_eq!(store.find_project("paper").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_names_unusable_as_paths() {
        let mock_server = MockServer::start().await;
        mount_manifest(&mock_server, 0).await;
        let (store, materializer) = materializer(&mock_server).await;

        for name in ["../../escaped", "Paper", "", "a/b"] {
            let err = materializer
                .materialize(name, "Paper", None, "1.21", "1.21.4")
                .await
                .unwrap_err();
            assert!(matches!(err, PublishError::InvalidProjectName(ref n) if n == name));
        }

        let err = materializer
            .materialize("paper", "Paper", None, "1.21", "../1.21.4")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::InvalidVersionName(_)));

        assert_eq!(store.find_project("paper").await.unwrap(), None);
        assert_eq!(store.find_project("../../escaped").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_manifest_unavailable() {
        // Nothing is mounted, so every request gets a 404.
        let mock_server = MockServer::start().await;
        let (store, materializer) = materializer(&mock_server).await;

        let err = materializer
            .materialize("paper", "Paper", None, "1.21", "1.21.4")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::ManifestUnavailable(_)));
        assert_eq!(store.find_project("paper").await.unwrap(), None);
    }
}
