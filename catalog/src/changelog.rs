use crate::types::Change;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(thiserror::Error, Debug)]
pub enum ChangelogError {
    #[error("compare request failed: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("compare request for {repository} returned status {status}")]
    Status {
        repository: String,
        status: reqwest::StatusCode,
    },
    #[error("invalid repository identifier: {0}")]
    InvalidRepository(String),
    #[error("invalid access token")]
    InvalidToken,
    #[error("invalid API base URL: {0}")]
    InvalidApiUrl(String),
}

#[derive(Deserialize)]
struct CompareCommitDetail {
    message: String,
}

#[derive(Deserialize)]
struct CompareCommit {
    sha: String,
    commit: CompareCommitDetail,
}

#[derive(Deserialize)]
struct CompareResponse {
    commits: Vec<CompareCommit>,
}

impl From<CompareCommit> for Change {
    fn from(commit: CompareCommit) -> Self {
        let message = commit.commit.message;
        let summary = match message.find('\n') {
            Some(index) => message[..index].to_string(),
            None => message.clone(),
        };
        Change {
            commit: commit.sha,
            summary,
            message,
        }
    }
}

fn is_repository_part(part: &str) -> bool {
    !part.is_empty() && !part.contains('/') && part != "." && part != ".."
}

/// Derives build changelogs from the source-control hosting API.
#[derive(Clone)]
pub struct ChangelogClient {
    client: reqwest::Client,
    api_url: Url,
}

impl ChangelogClient {
    pub fn new(api_url: &str, token: Option<&str>) -> Result<Self, ChangelogError> {
        let api_url = Url::parse(api_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ChangelogError::InvalidApiUrl(api_url.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("catalog/", env!("CARGO_PKG_VERSION"))),
        );
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ChangelogError::InvalidToken)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(ChangelogClient { client, api_url })
    }

    /// Lists the commits after `from` up to and including `to`.
    ///
    /// Without a repository or a starting commit there is nothing to compare
    /// against, and an empty changelog is returned without any request.
    pub async fn derive_changes(
        &self,
        repository: Option<&str>,
        from: Option<&str>,
        to: &str,
    ) -> Result<Vec<Change>, ChangelogError> {
        let (Some(repository), Some(from)) = (repository, from) else {
            return Ok(Vec::new());
        };

        let Some((owner, name)) = repository
            .split_once('/')
            .filter(|(owner, name)| is_repository_part(owner) && is_repository_part(name))
        else {
            return Err(ChangelogError::InvalidRepository(repository.to_string()));
        };

        let url = self.compare_url(owner, name, from, to)?;
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ChangelogError::Status {
                repository: repository.to_string(),
                status: response.status(),
            });
        }

        let compare = response.json::<CompareResponse>().await?;
        let changes: Vec<Change> = compare.commits.into_iter().map(Change::from).collect();

        tracing::debug!(
            repository,
            from,
            to,
            commits = changes.len(),
            "Derived changelog"
        );

        Ok(changes)
    }

    /// `{api}/repos/{owner}/{name}/compare/{from}...{to}`, with every segment
    /// percent-encoded so refs containing `/`, `?` or `#` stay in the path.
    fn compare_url(
        &self,
        owner: &str,
        name: &str,
        from: &str,
        to: &str,
    ) -> Result<Url, ChangelogError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| ChangelogError::InvalidApiUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(["repos", owner, name, "compare", &format!("{from}...{to}")]);
        Ok(url)
    }
}
