use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type ProjectId = Uuid;
pub type FamilyId = Uuid;
pub type VersionId = Uuid;
pub type BuildId = Uuid;

/// Whether `name` is usable as a single path segment: `[a-zA-Z0-9._-]+`,
/// excluding `.` and `..`.
pub fn is_safe_segment(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    /// Lowercase identifier, unique across the catalog.
    pub name: String,
    pub display_name: String,
    /// Source-control repository in `owner/name` form.
    pub repository: Option<String>,
}

impl Project {
    /// Project identifiers are lowercase: `[a-z0-9-]+`.
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    }

    pub fn new<N, D>(name: N, display_name: D) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Project {
            id: Uuid::new_v4(),
            name: name.into(),
            display_name: display_name.into(),
            repository: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionFamily {
    pub id: FamilyId,
    pub project: ProjectId,
    pub name: String,
    pub released: Option<DateTime<Utc>>,
}

impl VersionFamily {
    pub fn new(project: ProjectId, name: &str, released: Option<DateTime<Utc>>) -> Self {
        VersionFamily {
            id: Uuid::new_v4(),
            project,
            name: name.to_string(),
            released,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub project: ProjectId,
    pub family: FamilyId,
    pub name: String,
    pub released: Option<DateTime<Utc>>,
}

impl Version {
    pub fn new(family: &VersionFamily, name: &str, released: Option<DateTime<Utc>>) -> Self {
        Version {
            id: Uuid::new_v4(),
            project: family.project,
            family: family.id,
            name: name.to_string(),
            released,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Default,
    Experimental,
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Channel::Default),
            "experimental" => Ok(Channel::Experimental),
            other => Err(format!("unknown channel '{other}'")),
        }
    }
}

/// A single commit recorded against a build. Never mutated once stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub commit: String,
    pub summary: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Download {
    pub name: String,
    pub sha256: String,
}

impl Download {
    /// File names end up as a path segment in the artifact cache and as an
    /// attachment filename, so only `[a-zA-Z0-9._-]+` is accepted.
    pub fn has_valid_name(&self) -> bool {
        is_safe_segment(&self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub id: BuildId,
    pub project: ProjectId,
    pub version: VersionId,
    pub number: u32,
    pub time: DateTime<Utc>,
    pub changes: Vec<Change>,
    pub downloads: BTreeMap<String, Download>,
    pub channel: Channel,
    pub promoted: Option<bool>,
}

impl Build {
    pub fn is_promoted(&self) -> bool {
        self.promoted.unwrap_or(false)
    }

    pub fn download_named(&self, file_name: &str) -> Option<&Download> {
        self.downloads.values().find(|d| d.name == file_name)
    }
}
