use http::StatusCode;
use octocrab::GitHubError;

/// Failure of a read against the GitHub API.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("not found")]
    NotFound,
    #[error("GitHub returned {status}: {message}")]
    Status { status: StatusCode, message: String },
    /// The request did not produce a GitHub response (network, TLS, unparseable body).
    #[error(transparent)]
    Transport(octocrab::Error),
}

impl FetchError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::NotFound => Some(StatusCode::NOT_FOUND),
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }
}

impl From<octocrab::Error> for FetchError {
    fn from(err: octocrab::Error) -> Self {
        match err {
            octocrab::Error::GitHub { source, .. } => {
                let GitHubError { status_code, message, .. } = *source;
                if status_code == StatusCode::NOT_FOUND {
                    Self::NotFound
                } else {
                    Self::Status { status: status_code, message }
                }
            }
            err => Self::Transport(err),
        }
    }
}
