use crate::changelog::DEFAULT_API_URL;
use crate::manifest::DEFAULT_MANIFEST_URL;
use crate::snapshot::Compression;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Empty source name")]
    EmptySourceName,

    #[error("Duplicate source name: {0}")]
    DuplicateSource(String),

    #[error("Source {0} points at the cache directory")]
    CacheIsSource(String),

    #[error("Source {0} has an invalid URL template")]
    InvalidSourceUrl(String),
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StoreType {
    Memory,
    Filesystem {
        base_dir: String,
        filename: String,
        #[serde(default)]
        compression: Compression,
    },
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct ManifestConfig {
    pub url: String,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        ManifestConfig {
            url: DEFAULT_MANIFEST_URL.into(),
        }
    }
}

/// Access to the source-control hosting API used for changelogs.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct ChangelogConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub token: Option<String>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        ChangelogConfig {
            api_url: default_api_url(),
            token: None,
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum SourceType {
    /// URL template, see [`crate::artifacts`] for placeholders.
    Remote { url: String },
    /// Directory laid out as `<project>/<version>/<build>/<file>`.
    Local { path: String },
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Source {
    pub name: String,
    #[serde(flatten)]
    pub r#type: SourceType,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct StorageConfig {
    /// Where resolved artifacts are cached. Must not be one of the sources.
    pub cache: PathBuf,
    /// Tried in order until one of them provides the artifact.
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Skip TLS hostname verification for remote sources. Only meant for
    /// private mirrors with certificates that do not match their hostname.
    #[serde(default)]
    pub accept_invalid_hostnames: bool,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    pub store: StoreType,
    #[serde(default)]
    pub manifest: ManifestConfig,
    #[serde(default)]
    pub changelog: ChangelogConfig,
    pub storage: StorageConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut names = HashSet::new();
        for source in &self.storage.sources {
            if source.name.is_empty() {
                return Err(ValidationError::EmptySourceName);
            }
            if !names.insert(&source.name) {
                return Err(ValidationError::DuplicateSource(source.name.clone()));
            }

            match &source.r#type {
                SourceType::Local { path } => {
                    if Path::new(path) == self.storage.cache {
                        return Err(ValidationError::CacheIsSource(source.name.clone()));
                    }
                }
                SourceType::Remote { url } => {
                    if crate::artifacts::check_template(url).is_err() {
                        return Err(ValidationError::InvalidSourceUrl(source.name.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
store:
  type: filesystem
  base_dir: /var/lib/archivist
  filename: catalog.bin
changelog:
  token: ghp_example
storage:
  cache: /var/cache/archivist
  accept_invalid_hostnames: true
  sources:
    - name: cdn
      type: remote
      url: https://cdn.example.com/{project}/{version}/{build}/{file}
    - name: local
      type: local
      path: /srv/downloads
"#;

    #[test]
    fn test_parse() {
        let config: Config = serde_yaml::from_str(CONFIG).unwrap();
        config.validate().unwrap();

        assert_eq!(
            config.store,
            StoreType::Filesystem {
                base_dir: "/var/lib/archivist".into(),
                filename: "catalog.bin".into(),
                compression: Compression::Zstd1,
            }
        );
        assert_eq!(config.manifest, ManifestConfig::default());
        assert_eq!(config.changelog.api_url, "https://api.github.com");
        assert_eq!(config.changelog.token.as_deref(), Some("ghp_example"));
        assert!(config.storage.accept_invalid_hostnames);
        assert_eq!(
            config.storage.sources[1],
            Source {
                name: "local".into(),
                r#type: SourceType::Local {
                    path: "/srv/downloads".into()
                },
            }
        );
    }

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str(
            r#"
store: {type: memory}
storage: {cache: /tmp/cache}
"#,
        )
        .unwrap();
        assert_eq!(config.store, StoreType::Memory);
        assert!(config.storage.sources.is_empty());
        assert!(!config.storage.accept_invalid_hostnames);
        config.validate().unwrap();
    }

    #[test]
    fn test_validation() {
        let base: Config = serde_yaml::from_str(CONFIG).unwrap();

        let mut config = base.clone();
        config.storage.sources[1].name = "cdn".into();
        assert_eq!(
            config.validate(),
            Err(ValidationError::DuplicateSource("cdn".into()))
        );

        let mut config = base.clone();
        config.storage.sources[0].name = "".into();
        assert_eq!(config.validate(), Err(ValidationError::EmptySourceName));

        let mut config = base.clone();
        config.storage.sources[1].r#type = SourceType::Local {
            path: "/var/cache/archivist".into(),
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::CacheIsSource("local".into()))
        );

        let mut config = base;
        config.storage.sources[0].r#type = SourceType::Remote {
            url: "cdn/{file}".into(),
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidSourceUrl("cdn".into()))
        );
    }

    #[test]
    fn test_deserialization_errors() {
        // Unknown source type
        assert!(
            serde_yaml::from_str::<Source>("{name: s3, type: s3, bucket: artifacts}").is_err()
        );
        // Missing cache
        assert!(serde_yaml::from_str::<Config>("{store: {type: memory}, storage: {}}").is_err());
    }
}
