use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use buildboard_core::{
    AppError,
    models::{Artifact, CommitDetails, Plugin, PluginUpdate},
    util::{is_valid_ref, is_valid_repo_name},
};
use buildboard_github::{
    GitHub,
    aggregate::{build_plugin, collect_plugins},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Default, Deserialize)]
pub struct PluginQuery {
    /// Case-insensitive filter on name and description.
    #[serde(default)]
    q: Option<String>,
}

pub async fn list_plugins(
    State(github): State<Arc<GitHub>>,
    Query(query): Query<PluginQuery>,
) -> Result<Json<Vec<Plugin>>, AppError> {
    let mut plugins = collect_plugins(&github).await.context("Failed to fetch plugins")?;
    if let Some(q) = query.q.as_deref().filter(|q| !q.trim().is_empty()) {
        plugins.retain(|plugin| plugin.matches(q));
    }
    Ok(Json(plugins))
}

/// Polled by clients, so responses must never be cached.
pub async fn get_updates(State(github): State<Arc<GitHub>>) -> Result<Response, AppError> {
    let plugins = collect_plugins(&github).await.context("Failed to fetch updates")?;
    let update = PluginUpdate { plugins, timestamp: OffsetDateTime::now_utc() };
    Ok((
        [(header::CACHE_CONTROL, "no-store, must-revalidate"), (header::PRAGMA, "no-cache")],
        Json(update),
    )
        .into_response())
}

pub async fn get_plugin(
    State(github): State<Arc<GitHub>>,
    Path(repo): Path<String>,
) -> Result<Json<Plugin>, AppError> {
    if !is_valid_repo_name(&repo) {
        return Err(AppError::Status(StatusCode::NOT_FOUND));
    }
    let plugin = build_plugin(&github, &repo).await.ok_or(AppError::Status(StatusCode::NOT_FOUND))?;
    Ok(Json(plugin))
}

#[derive(Debug, Serialize)]
pub struct CommitView {
    plugin: Plugin,
    artifact: Artifact,
    commit: CommitDetails,
}

pub async fn get_commit(
    State(github): State<Arc<GitHub>>,
    Path((repo, sha)): Path<(String, String)>,
) -> Result<Json<CommitView>, AppError> {
    if !is_valid_repo_name(&repo) || !is_valid_ref(&sha) {
        return Err(AppError::Status(StatusCode::NOT_FOUND));
    }
    let plugin = build_plugin(&github, &repo).await.ok_or(AppError::Status(StatusCode::NOT_FOUND))?;
    let artifact = plugin
        .artifacts_for_commit(&sha)
        .next()
        .cloned()
        .ok_or(AppError::Status(StatusCode::NOT_FOUND))?;
    let commit = github
        .get_commit_details(&repo, &artifact.workflow_run.head_sha)
        .await
        .context("Failed to fetch commit")?
        .ok_or(AppError::Status(StatusCode::NOT_FOUND))?;
    Ok(Json(CommitView { plugin, artifact, commit }))
}
