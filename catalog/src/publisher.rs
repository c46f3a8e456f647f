use crate::changelog::ChangelogClient;
use crate::counter;
use crate::errors::PublishError;
use crate::hierarchy::HierarchyMaterializer;
use crate::metrics_defs::{BUILD_PUBLISH_DUPLICATE, BUILD_PUBLISHED};
use crate::store::CatalogStore;
use crate::types::{Build, Channel, Download};
use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// One artifact attached to a build report.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DownloadData {
    /// Logical key of the download within the build, e.g. `application`.
    pub id: String,
    pub name: String,
    pub sha256: String,
}

/// Everything a build system reports when a new build is available.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BuildReport {
    pub project: String,
    pub project_name: String,
    /// `owner/name` of the source repository, recorded when the project is
    /// first created.
    #[serde(default)]
    pub repository: Option<String>,
    pub family: String,
    pub version: String,
    pub build: u32,
    pub commit: String,
    #[serde(default)]
    pub channel: Option<Channel>,
    pub downloads: Vec<DownloadData>,
}

pub struct BuildPublisher {
    store: Arc<dyn CatalogStore>,
    hierarchy: HierarchyMaterializer,
    changelog: ChangelogClient,
}

impl BuildPublisher {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        hierarchy: HierarchyMaterializer,
        changelog: ChangelogClient,
    ) -> Self {
        BuildPublisher {
            store,
            hierarchy,
            changelog,
        }
    }

    /// Records a reported build. Publishing a build number that already exists
    /// for the version returns the stored build untouched.
    pub async fn publish(&self, report: BuildReport) -> Result<Build, PublishError> {
        let downloads = collect_downloads(report.downloads)?;

        let hierarchy = self
            .hierarchy
            .materialize(
                &report.project,
                &report.project_name,
                report.repository.as_deref(),
                &report.family,
                &report.version,
            )
            .await?;
        let project = hierarchy.project;
        let version = hierarchy.version;

        if let Some(existing) = self
            .store
            .find_build(project.id, version.id, report.build)
            .await?
        {
            tracing::info!(
                project = %project.name,
                version = %version.name,
                build = report.build,
                "Build already published"
            );
            counter!(BUILD_PUBLISH_DUPLICATE).increment(1);
            return Ok(existing);
        }

        // Changes are diffed from the first commit recorded on the previous
        // build, which is the newest commit it shipped.
        let previous_commit = self
            .store
            .previous_build(project.id, version.id, report.build)
            .await?
            .and_then(|previous| previous.changes.into_iter().next())
            .map(|change| change.commit);

        let changes = self
            .changelog
            .derive_changes(
                project.repository.as_deref(),
                previous_commit.as_deref(),
                &report.commit,
            )
            .await
            .map_err(PublishError::BuildPublicationFailed)?;

        let build = Build {
            id: Uuid::new_v4(),
            project: project.id,
            version: version.id,
            number: report.build,
            time: Utc::now(),
            changes,
            downloads,
            channel: report.channel.unwrap_or_default(),
            promoted: None,
        };

        let stored = self.store.insert_build(build).await?;
        if stored.was_created() {
            tracing::info!(
                project = %project.name,
                version = %version.name,
                build = report.build,
                "Published build"
            );
            counter!(BUILD_PUBLISHED).increment(1);
        } else {
            counter!(BUILD_PUBLISH_DUPLICATE).increment(1);
        }

        Ok(stored.into_inner())
    }
}

fn collect_downloads(
    downloads: Vec<DownloadData>,
) -> Result<BTreeMap<String, Download>, PublishError> {
    let mut map = BTreeMap::new();
    for data in downloads {
        let download = Download {
            name: data.name,
            sha256: data.sha256,
        };
        if !download.has_valid_name() {
            return Err(PublishError::InvalidDownloadName(download.name));
        }
        if map.contains_key(&data.id) {
            return Err(PublishError::DuplicateDownloadKey(data.id));
        }
        map.insert(data.id, download);
    }
    Ok(map)
}
