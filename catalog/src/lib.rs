pub mod artifacts;
pub mod changelog;
pub mod config;
pub mod errors;
pub mod hierarchy;
pub mod lookup;
pub mod manifest;
pub mod metrics_defs;
pub mod publisher;
pub mod snapshot;
pub mod store;
pub mod types;

#[cfg(test)]
mod testutils;

use artifacts::{ArtifactError, ArtifactResolver, ResolvedArtifact};
use changelog::{ChangelogClient, ChangelogError};
use config::{Config, StoreType, ValidationError};
use errors::{LookupError, PublishError};
use hierarchy::HierarchyMaterializer;
use lookup::DownloadTarget;
use manifest::ManifestClient;
use publisher::{BuildPublisher, BuildReport};
use snapshot::FilesystemCatalogStore;
use std::sync::Arc;
use store::{CatalogStore, MemoryCatalogStore, StoreError};
use types::Build;

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),
    #[error("could not open store: {0}")]
    Store(#[from] StoreError),
    #[error("could not create changelog client: {0}")]
    Changelog(#[from] ChangelogError),
    #[error("could not create HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

pub fn get_store(store_type: &StoreType) -> Result<Arc<dyn CatalogStore>, StoreError> {
    match store_type {
        StoreType::Memory => Ok(Arc::new(MemoryCatalogStore::new())),
        StoreType::Filesystem {
            base_dir,
            filename,
            compression,
        } => Ok(Arc::new(FilesystemCatalogStore::open(
            base_dir,
            filename,
            *compression,
        )?)),
    }
}

/// Build catalog: publication, lookups and artifact resolution over a
/// single store.
pub struct Catalog {
    store: Arc<dyn CatalogStore>,
    publisher: BuildPublisher,
    resolver: ArtifactResolver,
}

impl Catalog {
    pub fn new(config: &Config) -> Result<Self, CatalogError> {
        config.validate()?;
        let store = get_store(&config.store)?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: &Config, store: Arc<dyn CatalogStore>) -> Result<Self, CatalogError> {
        let manifest = ManifestClient::new(config.manifest.url.clone());
        let changelog = ChangelogClient::new(
            &config.changelog.api_url,
            config.changelog.token.as_deref(),
        )?;
        let hierarchy = HierarchyMaterializer::new(store.clone(), manifest);
        let publisher = BuildPublisher::new(store.clone(), hierarchy, changelog);
        let resolver = ArtifactResolver::new(&config.storage)?;

        Ok(Catalog {
            store,
            publisher,
            resolver,
        })
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    pub async fn publish(&self, report: BuildReport) -> Result<Build, PublishError> {
        self.publisher.publish(report).await
    }

    pub async fn find_download(
        &self,
        project: &str,
        version: &str,
        build: u32,
        file: &str,
    ) -> Result<DownloadTarget, LookupError> {
        lookup::find_download(self.store.as_ref(), project, version, build, file).await
    }

    pub async fn resolve(&self, target: &DownloadTarget) -> Result<ResolvedArtifact, ArtifactError> {
        self.resolver
            .resolve(&target.project, &target.version, &target.build, &target.download)
            .await
    }

    pub async fn promote(
        &self,
        project: &str,
        version: &str,
        build: u32,
        promoted: bool,
    ) -> Result<Build, LookupError> {
        lookup::promote(self.store.as_ref(), project, version, build, promoted).await
    }
}
