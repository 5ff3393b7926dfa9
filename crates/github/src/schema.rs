//! Shapes of the GitHub REST responses the dashboard reads.
//!
//! Only the fields that are consumed are declared. Fields GitHub may omit or null are
//! optional so that a partial record still parses; required fields make the whole
//! response fail to parse instead of propagating empty values.

use buildboard_core::models::{CommitAuthor, CommitDetails, CommitFile, CommitStats};
use serde::Deserialize;
use time::OffsetDateTime;

/// `GET /users/{account}/repos`, `GET /repos/{owner}/{repo}`
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryResponse {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

/// `GET /repos/{owner}/{repo}/actions/artifacts`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtifactListResponse {
    #[serde(default)]
    pub artifacts: Vec<ArtifactResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactResponse {
    pub name: String,
    #[serde(default)]
    pub size_in_bytes: u64,
    #[serde(default)]
    pub archive_download_url: Option<String>,
    #[serde(default)]
    pub expired: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub workflow_run: Option<ArtifactWorkflowRun>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtifactWorkflowRun {
    #[serde(default)]
    pub head_branch: Option<String>,
    #[serde(default)]
    pub head_sha: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
}

/// `GET /repos/{owner}/{repo}/releases`
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseResponse {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub target_commitish: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub assets: Vec<ReleaseAssetResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAssetResponse {
    #[serde(default)]
    pub name: Option<String>,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

/// `GET /repos/{owner}/{repo}/commits/{ref}`
#[derive(Debug, Clone, Deserialize)]
pub struct CommitResponse {
    pub sha: String,
    #[serde(default)]
    pub html_url: Option<String>,
    pub commit: GitCommit,
    #[serde(default)]
    pub stats: Option<CommitStatsResponse>,
    #[serde(default)]
    pub files: Vec<CommitFileResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitCommit {
    pub message: String,
    #[serde(default)]
    pub author: Option<GitAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitAuthor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CommitStatsResponse {
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitFileResponse {
    pub filename: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    pub status: String,
    #[serde(default)]
    pub patch: Option<String>,
    #[serde(default)]
    pub blob_url: Option<String>,
}

impl From<CommitResponse> for CommitDetails {
    fn from(value: CommitResponse) -> Self {
        Self {
            sha: value.sha,
            message: value.commit.message,
            author: value.commit.author.map(|a| CommitAuthor {
                name: a.name,
                email: a.email,
                date: a.date,
            }),
            html_url: value.html_url,
            stats: value
                .stats
                .map(|s| CommitStats {
                    additions: s.additions,
                    deletions: s.deletions,
                    total: s.total,
                })
                .unwrap_or_default(),
            files: value
                .files
                .into_iter()
                .map(|f| CommitFile {
                    filename: f.filename,
                    additions: f.additions,
                    deletions: f.deletions,
                    status: f.status,
                    patch: f.patch,
                    blob_url: f.blob_url,
                })
                .collect(),
        }
    }
}
