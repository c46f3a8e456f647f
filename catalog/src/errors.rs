use crate::artifacts::ArtifactError;
use crate::changelog::ChangelogError;
use crate::manifest::ManifestError;
use crate::store::StoreError;
use thiserror::Error;

/// Coarse classification a serving layer uses to pick a response status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    Upstream,
    Internal,
}

/// Errors that can occur while publishing a build
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("version manifest is unavailable: {0}")]
    ManifestUnavailable(#[source] ManifestError),

    #[error("version '{0}' not found in manifest")]
    ManifestEntryNotFound(String),

    #[error("build publication failed: {0}")]
    BuildPublicationFailed(#[source] ChangelogError),

    #[error("invalid project name: {0:?}")]
    InvalidProjectName(String),

    #[error("invalid version name: {0:?}")]
    InvalidVersionName(String),

    #[error("invalid download file name: {0:?}")]
    InvalidDownloadName(String),

    #[error("download key reported more than once: {0}")]
    DuplicateDownloadKey(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl PublishError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PublishError::ManifestEntryNotFound(_) => ErrorKind::NotFound,
            PublishError::InvalidProjectName(_)
            | PublishError::InvalidVersionName(_)
            | PublishError::InvalidDownloadName(_)
            | PublishError::DuplicateDownloadKey(_) => ErrorKind::InvalidInput,
            PublishError::ManifestUnavailable(_) | PublishError::BuildPublicationFailed(_) => {
                ErrorKind::Upstream
            }
            PublishError::Store(_) => ErrorKind::Internal,
        }
    }
}

/// Errors from the single-step catalog lookups that precede serving a download
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("project not found")]
    ProjectNotFound,

    #[error("version not found")]
    VersionNotFound,

    #[error("build not found")]
    BuildNotFound,

    #[error("download not found")]
    DownloadNotFound,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl LookupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LookupError::Store(_) => ErrorKind::Internal,
            _ => ErrorKind::NotFound,
        }
    }
}

impl ArtifactError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArtifactError::Unavailable { .. } => ErrorKind::Upstream,
            ArtifactError::InvalidFileName(_) | ArtifactError::InvalidPathSegment(_) => {
                ErrorKind::InvalidInput
            }
            ArtifactError::Io(_) => ErrorKind::Internal,
        }
    }
}
