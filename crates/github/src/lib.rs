pub mod aggregate;
pub mod error;
pub mod filter;
pub mod schema;

use std::{future::Future, sync::Arc};

use anyhow::{Context, Result};
use buildboard_core::{
    config::GitHubConfig,
    models::{CommitDetails, CommitInfo},
    util::{is_valid_ref, is_valid_repo_name},
};
use futures_util::{StreamExt, future::join_all, stream};
use octocrab::{Octocrab, service::middleware::retry::RetryConfig};
use serde::de::IgnoredAny;

pub use crate::error::FetchError;
use crate::schema::{ArtifactListResponse, CommitResponse, ReleaseResponse, RepositoryResponse};

const REPOS_PER_PAGE: u8 = 100;

/// Read-only GitHub client scoped to one account.
pub struct GitHub {
    pub client: Octocrab,
    account: String,
    descriptors: Vec<String>,
    artifact_limit: u8,
    release_limit: u8,
    concurrency: Option<usize>,
}

#[derive(serde::Serialize)]
struct PageParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    per_page: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
}

impl GitHub {
    pub fn new(config: &GitHubConfig) -> Result<Arc<Self>> {
        let client = Octocrab::builder()
            .personal_token(config.token.clone())
            .base_uri(config.api_url.as_str())
            .context("Invalid GitHub API URL")?
            .add_retry_config(RetryConfig::None)
            .build()
            .context("Failed to create GitHub client")?;
        Ok(Arc::new(Self {
            client,
            account: config.account.clone(),
            descriptors: config.descriptors.clone(),
            artifact_limit: config.artifact_limit,
            release_limit: config.release_limit,
            concurrency: config.concurrency.filter(|&n| n > 0),
        }))
    }

    /// Log which user the token belongs to.
    pub async fn verify(&self) -> Result<()> {
        let profile = self.client.current().user().await.context("Failed to fetch current user")?;
        tracing::info!("Logged in as {}, listing repositories of {}", profile.login, self.account);
        Ok(())
    }

    pub fn account(&self) -> &str { &self.account }

    pub fn descriptors(&self) -> &[String] { &self.descriptors }

    pub fn concurrency(&self) -> Option<usize> { self.concurrency }

    /// `/repos/{account}/{repo}{suffix}`. Names that are not a single path segment are
    /// reported as not found without a request.
    fn repo_route(&self, repo: &str, suffix: &str) -> Result<String, FetchError> {
        if !is_valid_repo_name(repo) {
            tracing::debug!("Rejecting repository name {:?}", repo);
            return Err(FetchError::NotFound);
        }
        Ok(format!("/repos/{}/{}{}", self.account, repo, suffix))
    }

    pub async fn list_repositories(&self) -> Result<Vec<RepositoryResponse>, FetchError> {
        let route = format!("/users/{}/repos", self.account);
        let mut repositories = Vec::new();
        let mut page = 1;
        loop {
            let items: Vec<RepositoryResponse> = self
                .client
                .get(&route, Some(&PageParams { per_page: Some(REPOS_PER_PAGE), page: Some(page) }))
                .await?;
            let count = items.len();
            repositories.extend(items);
            if count < REPOS_PER_PAGE as usize {
                break;
            }
            page += 1;
        }
        tracing::debug!("Found {} repositories for {}", repositories.len(), self.account);
        Ok(repositories)
    }

    /// `Ok(true)` on a 2xx response, `Ok(false)` on any other GitHub status.
    /// `Err` only when no response was received.
    pub async fn check_file(&self, repo: &str, path: &str) -> Result<bool, FetchError> {
        let route = match self.repo_route(repo, &format!("/contents/{path}")) {
            Ok(route) => route,
            Err(_) => return Ok(false),
        };
        match self.client.get::<IgnoredAny, _, ()>(&route, None).await.map_err(FetchError::from) {
            Ok(_) => Ok(true),
            Err(FetchError::NotFound) => Ok(false),
            Err(FetchError::Status { status, message }) => {
                tracing::warn!("Check of {}/{} returned {}: {}", repo, path, status, message);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Like [`Self::check_file`], but a failed check counts as absent.
    pub async fn file_exists(&self, repo: &str, path: &str) -> bool {
        match self.check_file(repo, path).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!("Failed to check {}/{}: {}", repo, path, e);
                false
            }
        }
    }

    pub async fn get_repository(&self, repo: &str) -> Result<RepositoryResponse, FetchError> {
        let route = self.repo_route(repo, "")?;
        Ok(self.client.get(&route, None::<&()>).await?)
    }

    pub async fn list_artifacts(
        &self,
        repo: &str,
    ) -> Result<Vec<schema::ArtifactResponse>, FetchError> {
        let route = self.repo_route(repo, "/actions/artifacts")?;
        let response: ArtifactListResponse = self
            .client
            .get(&route, Some(&PageParams { per_page: Some(self.artifact_limit), page: None }))
            .await?;
        Ok(response.artifacts)
    }

    pub async fn list_releases(&self, repo: &str) -> Result<Vec<ReleaseResponse>, FetchError> {
        let route = self.repo_route(repo, "/releases")?;
        Ok(self
            .client
            .get(&route, Some(&PageParams { per_page: Some(self.release_limit), page: None }))
            .await?)
    }

    /// `Ok(None)` when the commit does not exist (404, or 422 for an unknown ref).
    pub async fn get_commit_details(
        &self,
        repo: &str,
        sha: &str,
    ) -> Result<Option<CommitDetails>, FetchError> {
        if !is_valid_ref(sha) {
            return Ok(None);
        }
        let route = match self.repo_route(repo, &format!("/commits/{sha}")) {
            Ok(route) => route,
            Err(_) => return Ok(None),
        };
        match self.client.get::<CommitResponse, _, ()>(&route, None).await.map_err(FetchError::from)
        {
            Ok(commit) => Ok(Some(commit.into())),
            Err(FetchError::NotFound) => Ok(None),
            Err(FetchError::Status { status, .. })
                if status == http::StatusCode::UNPROCESSABLE_ENTITY =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Best-effort commit summary attached to artifacts.
    pub async fn get_commit(&self, repo: &str, sha: &str) -> Option<CommitInfo> {
        match self.get_commit_details(repo, sha).await {
            Ok(Some(details)) => Some(details.into()),
            Ok(None) => {
                tracing::debug!("Commit {} not found in {}", sha, repo);
                None
            }
            Err(e) => {
                tracing::warn!("Failed to fetch commit {} in {}: {}", sha, repo, e);
                None
            }
        }
    }
}

/// Run `f` for every item and collect the outputs in input order. Every future runs at
/// once unless `limit` caps how many are in flight.
pub(crate) async fn fan_out<I, F, Fut>(limit: Option<usize>, items: I, f: F) -> Vec<Fut::Output>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future,
{
    match limit {
        None => join_all(items.into_iter().map(f)).await,
        Some(limit) => stream::iter(items).map(f).buffered(limit).collect().await,
    }
}
