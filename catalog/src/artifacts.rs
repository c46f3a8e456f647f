//! Resolves download bytes through an ordered list of storage sources,
//! keeping a local cache copy of whatever was fetched.
//!
//! Cache layout is `cache/<project>/<version>/<build>/<file>`, and LOCAL
//! sources are expected to use the same layout under their own root.
use crate::config::{Source, SourceType, StorageConfig};
use crate::counter;
use crate::metrics_defs::{
    ARTIFACT_CACHE_HIT, ARTIFACT_CACHE_MISS, ARTIFACT_SOURCE_FAILURE, ARTIFACT_UNAVAILABLE,
};
use crate::types::{Build, Download, Project, Version, is_safe_segment};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use url::Url;
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("no regular file at {}", .0.display())]
    NotFound(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("request failed: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("{url} returned status {status}")]
    Status { url: Url, status: StatusCode },
}

/// A single source that could not provide the artifact.
#[derive(Debug)]
pub struct SourceFailure {
    pub source_name: String,
    pub error: SourceError,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source_name, self.error)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ArtifactError {
    /// Every configured source failed, one entry per source in order.
    #[error("could not resolve download from any source [{}]", join(.failures))]
    Unavailable { failures: Vec<SourceFailure> },

    #[error("unsafe download file name: {0:?}")]
    InvalidFileName(String),

    #[error("unsafe project or version name: {0:?}")]
    InvalidPathSegment(String),

    #[error("cache I/O error: {0}")]
    Io(#[from] io::Error),
}

fn join(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Identifies one artifact of one build.
#[derive(Clone, Debug, PartialEq)]
struct ArtifactKey<'a> {
    project: &'a str,
    version: &'a str,
    build: u32,
    file: &'a str,
}

impl ArtifactKey<'_> {
    fn relative_path(&self) -> PathBuf {
        Path::new(self.project)
            .join(self.version)
            .join(self.build.to_string())
            .join(self.file)
    }
}

/// Expands a REMOTE source into the artifact URL. `{project}`, `{version}`,
/// `{build}` and `{file}` are substituted; a template without placeholders
/// is a base URL that the four segments are appended to.
fn remote_url(template: &str, key: &ArtifactKey<'_>) -> Result<Url, url::ParseError> {
    let expanded = if template.contains('{') {
        template
            .replace("{project}", key.project)
            .replace("{version}", key.version)
            .replace("{build}", &key.build.to_string())
            .replace("{file}", key.file)
    } else {
        format!(
            "{}/{}/{}/{}/{}",
            template.trim_end_matches('/'),
            key.project,
            key.version,
            key.build,
            key.file
        )
    };
    Url::parse(&expanded)
}

/// Checks that a REMOTE template expands into a valid URL.
pub(crate) fn check_template(template: &str) -> Result<(), url::ParseError> {
    let key = ArtifactKey {
        project: "project",
        version: "version",
        build: 1,
        file: "file",
    };
    remote_url(template, &key).map(|_| ())
}

/// A cached artifact ready to be served.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedArtifact {
    pub path: PathBuf,
    /// Modification time of the cache copy, not of the source it came from.
    pub last_modified: DateTime<Utc>,
    pub len: u64,
}

impl ResolvedArtifact {
    async fn from_cache(path: PathBuf) -> io::Result<Self> {
        let metadata = tokio::fs::metadata(&path).await?;
        Ok(ResolvedArtifact {
            last_modified: DateTime::<Utc>::from(metadata.modified()?),
            len: metadata.len(),
            path,
        })
    }

    pub async fn open(&self) -> io::Result<tokio::fs::File> {
        tokio::fs::File::open(&self.path).await
    }

    pub async fn read(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

async fn is_regular_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Sibling of `dest` that a fetch writes into before it is renamed over
/// `dest`, so a half-written file is never visible under the final name.
fn temp_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.{}.part", Uuid::new_v4().simple()))
}

pub struct ArtifactResolver {
    cache: PathBuf,
    sources: Vec<Source>,
    client: reqwest::Client,
}

impl ArtifactResolver {
    pub fn new(config: &StorageConfig) -> Result<Self, reqwest::Error> {
        if config.accept_invalid_hostnames {
            tracing::warn!("Hostname verification is disabled for remote artifact sources");
        }
        let client = reqwest::Client::builder()
            .danger_accept_invalid_hostnames(config.accept_invalid_hostnames)
            .build()?;

        Ok(ArtifactResolver {
            cache: config.cache.clone(),
            sources: config.sources.clone(),
            client,
        })
    }

    pub async fn resolve(
        &self,
        project: &Project,
        version: &Version,
        build: &Build,
        download: &Download,
    ) -> Result<ResolvedArtifact, ArtifactError> {
        if !download.has_valid_name() {
            return Err(ArtifactError::InvalidFileName(download.name.clone()));
        }
        for segment in [&project.name, &version.name] {
            if !is_safe_segment(segment) {
                return Err(ArtifactError::InvalidPathSegment(segment.clone()));
            }
        }

        let key = ArtifactKey {
            project: &project.name,
            version: &version.name,
            build: build.number,
            file: &download.name,
        };
        let relative = key.relative_path();
        let cached = self.cache.join(&relative);

        if is_regular_file(&cached).await {
            counter!(ARTIFACT_CACHE_HIT).increment(1);
            return Ok(ResolvedArtifact::from_cache(cached).await?);
        }
        counter!(ARTIFACT_CACHE_MISS).increment(1);

        if let Some(parent) = cached.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut failures = Vec::new();
        for source in &self.sources {
            let result = match &source.r#type {
                SourceType::Local { path } => {
                    copy_local(&Path::new(path).join(&relative), &cached).await
                }
                SourceType::Remote { url } => self.fetch_remote(url, &key, &cached).await,
            };

            match result {
                Ok(bytes) => {
                    tracing::info!(
                        file = key.file,
                        source = %source.name,
                        bytes,
                        "Cached resource"
                    );
                    return Ok(ResolvedArtifact::from_cache(cached).await?);
                }
                Err(error) => {
                    tracing::warn!(
                        file = key.file,
                        source = %source.name,
                        error = %error,
                        "Artifact source failed"
                    );
                    counter!(ARTIFACT_SOURCE_FAILURE, "source" => source.name.clone())
                        .increment(1);
                    failures.push(SourceFailure {
                        source_name: source.name.clone(),
                        error,
                    });
                }
            }
        }

        counter!(ARTIFACT_UNAVAILABLE).increment(1);
        Err(ArtifactError::Unavailable { failures })
    }

    async fn fetch_remote(
        &self,
        template: &str,
        key: &ArtifactKey<'_>,
        dest: &Path,
    ) -> Result<u64, SourceError> {
        let url = remote_url(template, key)?;
        let mut response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(SourceError::Status {
                url,
                status: response.status(),
            });
        }

        let tmp = temp_path(dest);
        let result: Result<u64, SourceError> = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            let mut written = 0u64;
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, dest).await?;
            Ok(written)
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }
}

async fn copy_local(src: &Path, dest: &Path) -> Result<u64, SourceError> {
    if !is_regular_file(src).await {
        return Err(SourceError::NotFound(src.to_path_buf()));
    }

    let tmp = temp_path(dest);
    let result = async {
        let copied = tokio::fs::copy(src, &tmp).await?;
        tokio::fs::rename(&tmp, dest).await?;
        Ok::<_, io::Error>(copied)
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    Ok(result?)
}
