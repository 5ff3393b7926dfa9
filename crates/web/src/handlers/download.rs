use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use buildboard_core::{
    config::{Config, GitHubConfig},
    util::filename_from_url,
};
use serde::Deserialize;
use url::Url;

/// Hosts that serve GitHub artifact and release downloads.
const GITHUB_HOSTS: &[&str] = &[
    "github.com",
    "api.github.com",
    "objects.githubusercontent.com",
    "github-releases.githubusercontent.com",
    "codeload.github.com",
];

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Whether the server token may be sent to `url`.
fn is_allowed(config: &GitHubConfig, url: &Url) -> bool {
    if url.origin() == config.api_url.origin() {
        return true;
    }
    if url.scheme() != "https" {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    GITHUB_HOSTS.contains(&host) || config.download_hosts.iter().any(|h| h == host)
}

fn content_disposition(name: &str) -> HeaderValue {
    let name = name.replace(['"', '\\'], "").replace(|c: char| c.is_control(), "");
    HeaderValue::from_str(&format!("attachment; filename=\"{name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Stream an artifact through the server so the client never needs the token.
pub async fn download(
    State(config): State<Arc<Config>>,
    State(http): State<reqwest::Client>,
    Query(query): Query<DownloadQuery>,
) -> Response {
    let Some(raw_url) = query.url.filter(|u| !u.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing URL parameter").into_response();
    };
    let url = match Url::parse(&raw_url) {
        Ok(url) if is_allowed(&config.github, &url) => url,
        Ok(url) => {
            tracing::warn!("Refusing download from host {:?}", url.host_str());
            return (StatusCode::BAD_REQUEST, "Invalid URL parameter").into_response();
        }
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid URL parameter").into_response(),
    };
    let name = query
        .name
        .filter(|n| !n.is_empty())
        .or_else(|| filename_from_url(&raw_url))
        .unwrap_or_else(|| "artifact".to_string());

    let upstream = match http
        .get(url)
        .bearer_auth(&config.github.token)
        .header(header::ACCEPT, "application/vnd.github.v3+json")
        .send()
        .await
    {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::error!("Download error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to download artifact")
                .into_response();
        }
    };
    let status = upstream.status();
    if !status.is_success() {
        tracing::warn!("Upstream returned {} for {}", status, name);
        let reason = status.canonical_reason().unwrap_or("Unknown error");
        return (status, format!("Failed to download artifact: {reason}")).into_response();
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        upstream
            .headers()
            .get(header::CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        upstream
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .cloned()
            .unwrap_or_else(|| content_disposition(&name)),
    );
    if let Some(length) = upstream.content_length() {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    (headers, Body::from_stream(upstream.bytes_stream())).into_response()
}
