use futures_util::future::join_all;

use crate::{FetchError, GitHub, fan_out};

/// Whether any of the configured build descriptors exists in the repository.
/// All descriptors are checked concurrently.
pub async fn is_buildable(github: &GitHub, repo: &str) -> bool {
    let checks = github.descriptors().iter().map(|path| github.file_exists(repo, path));
    join_all(checks).await.into_iter().any(|exists| exists)
}

/// Keep the repositories that contain a build descriptor, in input order.
/// Repositories are checked concurrently.
pub async fn filter_buildable_repos(
    github: &GitHub,
    names: impl IntoIterator<Item = String>,
) -> Vec<String> {
    let checked = fan_out(github.concurrency(), names, |name| async move {
        is_buildable(github, &name).await.then_some(name)
    })
    .await;
    checked.into_iter().flatten().collect()
}

/// Names of the account's non-archived repositories that contain a build descriptor.
pub async fn relevant_repositories(github: &GitHub) -> Result<Vec<String>, FetchError> {
    let repositories = github.list_repositories().await?;
    let names = repositories.into_iter().filter(|r| !r.archived).map(|r| r.name);
    let buildable = filter_buildable_repos(github, names).await;
    tracing::debug!("{} buildable repositories for {}", buildable.len(), github.account());
    Ok(buildable)
}
