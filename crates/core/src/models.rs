use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const DEFAULT_DESCRIPTION: &str = "No description available";

/// One repository that produces builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    pub name: String,
    pub repo_name: String,
    pub description: String,
    pub artifacts: Vec<Artifact>,
}

impl Plugin {
    /// Case-insensitive substring match on name and description.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        query.is_empty()
            || self.name.to_lowercase().contains(&query)
            || self.description.to_lowercase().contains(&query)
    }

    /// Artifacts built from the given commit. Accepts abbreviated SHAs.
    pub fn artifacts_for_commit<'a>(&'a self, sha: &'a str) -> impl Iterator<Item = &'a Artifact> {
        self.artifacts.iter().filter(move |a| {
            !sha.is_empty() && a.workflow_run.head_sha.starts_with(sha)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Workflow,
    Release,
}

/// A downloadable build: either a workflow artifact or a release asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub name: String,
    /// Proxy path, see [`crate::util::download_path`].
    pub download_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Size in bytes.
    pub size: u64,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub expires_at: Option<OffsetDateTime>,
    pub workflow_run: WorkflowRunInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_info: Option<CommitInfo>,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_info: Option<ReleaseInfo>,
}

impl Artifact {
    /// Releases are always kept; workflow artifacts only when their run succeeded
    /// (or reported no conclusion).
    pub fn is_retained(&self) -> bool {
        match self.kind {
            ArtifactKind::Release => true,
            ArtifactKind::Workflow => {
                matches!(self.workflow_run.conclusion.as_deref(), None | Some("success"))
            }
        }
    }
}

/// Newest first. Stable, so equal timestamps keep their relative order.
pub fn sort_artifacts(artifacts: &mut [Artifact]) {
    artifacts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunInfo {
    pub head_sha: String,
    pub head_branch: String,
    pub conclusion: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    pub tag_name: String,
    pub name: Option<String>,
    pub body: Option<String>,
    pub html_url: Option<String>,
    pub prerelease: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub message: String,
    pub stats: CommitStats,
    pub files: Vec<CommitFile>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStats {
    pub additions: u64,
    pub deletions: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitFile {
    pub filename: String,
    pub additions: u64,
    pub deletions: u64,
    /// `added`, `modified`, `removed`, `renamed`, ...
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitAuthor {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub date: Option<OffsetDateTime>,
}

/// Everything shown on the per-commit page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitDetails {
    pub sha: String,
    pub message: String,
    pub author: Option<CommitAuthor>,
    pub html_url: Option<String>,
    pub stats: CommitStats,
    pub files: Vec<CommitFile>,
}

impl From<CommitDetails> for CommitInfo {
    fn from(value: CommitDetails) -> Self {
        Self {
            message: value.message,
            stats: value.stats,
            files: value
                .files
                .into_iter()
                .map(|f| CommitFile { patch: None, blob_url: None, ..f })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginUpdate {
    pub plugins: Vec<Plugin>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn artifact(name: &str, created_at: OffsetDateTime, kind: ArtifactKind) -> Artifact {
        Artifact {
            name: name.to_string(),
            download_url: format!("/api/download?url=x&name={name}"),
            created_at,
            size: 1,
            expires_at: None,
            workflow_run: WorkflowRunInfo {
                head_sha: "0123456789abcdef".to_string(),
                head_branch: "main".to_string(),
                conclusion: Some("success".to_string()),
                created_at,
            },
            commit_info: None,
            kind,
            release_info: None,
        }
    }

    #[test]
    fn sort_is_descending_and_stable() {
        let mut artifacts = vec![
            artifact("a", datetime!(2024-01-01 0:00 UTC), ArtifactKind::Workflow),
            artifact("b", datetime!(2024-03-01 0:00 UTC), ArtifactKind::Release),
            artifact("c", datetime!(2024-01-01 0:00 UTC), ArtifactKind::Workflow),
            artifact("d", datetime!(2024-02-01 0:00 UTC), ArtifactKind::Workflow),
        ];
        sort_artifacts(&mut artifacts);
        let names = artifacts.iter().map(|a| a.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["b", "d", "a", "c"]);
        assert!(artifacts.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[test]
    fn retention_rule() {
        let now = datetime!(2024-01-01 0:00 UTC);
        let mut failed = artifact("failed", now, ArtifactKind::Workflow);
        failed.workflow_run.conclusion = Some("failure".to_string());
        assert!(!failed.is_retained());

        let mut unknown = artifact("unknown", now, ArtifactKind::Workflow);
        unknown.workflow_run.conclusion = None;
        assert!(unknown.is_retained());

        let mut release = artifact("release", now, ArtifactKind::Release);
        release.workflow_run.conclusion = Some("failure".to_string());
        assert!(release.is_retained());
    }

    #[test]
    fn serializes_camel_case_with_type_tag() {
        let value = serde_json::to_value(artifact(
            "build",
            datetime!(2024-05-06 7:08:09 UTC),
            ArtifactKind::Release,
        ))
        .unwrap();
        assert_eq!(value["type"], "release");
        assert_eq!(value["createdAt"], "2024-05-06T07:08:09Z");
        assert!(value["expiresAt"].is_null());
        assert_eq!(value["workflowRun"]["headSha"], "0123456789abcdef");
        assert!(value.get("commitInfo").is_none());
    }

    #[test]
    fn search_and_commit_lookup() {
        let plugin = Plugin {
            name: "EconomyPlus".to_string(),
            repo_name: "EconomyPlus".to_string(),
            description: "Adds a bank to Paper servers".to_string(),
            artifacts: vec![artifact("b", datetime!(2024-01-01 0:00 UTC), ArtifactKind::Workflow)],
        };
        assert!(plugin.matches("economy"));
        assert!(plugin.matches("PAPER"));
        assert!(plugin.matches("  "));
        assert!(!plugin.matches("velocity"));
        assert_eq!(plugin.artifacts_for_commit("0123456").count(), 1);
        assert_eq!(plugin.artifacts_for_commit("fff").count(), 0);
        assert_eq!(plugin.artifacts_for_commit("").count(), 0);
    }
}
