use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json,
    body::Bytes,
    extract::{FromRef, FromRequest, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use buildboard_core::{ErrorBody, config::Config, util::short_sha};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::OffsetDateTime;

const SIGNATURE_HEADER: &str = "x-vercel-signature";

/// Raw body of a deployment webhook whose signature has been verified.
#[must_use]
pub struct VercelEvent {
    pub body: Bytes,
}

impl<S> FromRequest<S> for VercelEvent
where
    Arc<Config>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        fn unauthorized(reason: &str) -> Response {
            tracing::warn!("Rejected deployment webhook: {reason}");
            (StatusCode::UNAUTHORIZED, Json(ErrorBody { error: "Invalid signature" }))
                .into_response()
        }
        let config = <Arc<Config>>::from_ref(state);
        let Some(webhook) = &config.webhook else {
            return Err(unauthorized("no webhook config"));
        };
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| unauthorized("signature missing"))?;
        let signature = hex::decode(signature).map_err(|_| unauthorized("signature malformed"))?;
        let body = Bytes::from_request(req, state).await.map_err(|e| {
            tracing::warn!("Failed to read webhook body: {e}");
            (StatusCode::BAD_REQUEST, Json(ErrorBody { error: "Invalid body" })).into_response()
        })?;
        let mut mac = Hmac::<Sha256>::new_from_slice(webhook.secret.as_bytes())
            .map_err(|_| unauthorized("invalid secret"))?;
        mac.update(&body);
        mac.verify_slice(&signature).map_err(|_| unauthorized("signature mismatch"))?;
        Ok(Self { body })
    }
}

#[derive(Debug, Deserialize)]
pub struct DeploymentEvent {
    /// `deployment.succeeded`, `deployment.failed`, `deployment.ready`, ...
    #[serde(rename = "type")]
    pub kind: String,
    pub deployment: Deployment,
}

#[derive(Debug, Deserialize)]
pub struct Deployment {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub meta: DeploymentMeta,
    pub creator: DeploymentCreator,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentMeta {
    pub github_commit_ref: Option<String>,
    pub github_commit_sha: Option<String>,
    pub github_commit_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeploymentCreator {
    pub username: String,
}

#[derive(Debug, Serialize)]
struct DiscordMessage {
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    color: u32,
    fields: Vec<EmbedField>,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    footer: EmbedFooter,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: &'static str,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct EmbedFooter {
    text: String,
}

fn status_style(kind: &str) -> (&'static str, u32) {
    match kind {
        "deployment.succeeded" => ("\u{2705}", 0x00ff00),
        "deployment.failed" => ("\u{274c}", 0xff0000),
        "deployment.ready" => ("\u{1f680}", 0x0099ff),
        _ => ("\u{1f4e6}", 0x808080),
    }
}

fn field(name: &'static str, value: String, inline: bool) -> EmbedField {
    EmbedField { name, value, inline }
}

fn non_empty(value: Option<String>) -> Option<String> { value.filter(|v| !v.trim().is_empty()) }

fn build_embed(event: DeploymentEvent, repository: Option<&str>, now: OffsetDateTime) -> Embed {
    let (emoji, color) = status_style(&event.kind);
    let state = event.kind.split_once('.').map_or(event.kind.as_str(), |(_, s)| s).to_uppercase();
    let Deployment { name, url, meta, creator } = event.deployment;
    let commit = match (non_empty(meta.github_commit_sha), repository) {
        (Some(sha), Some(repository)) => {
            format!("[`{}`](https://github.com/{repository}/commit/{sha})", short_sha(&sha))
        }
        (Some(sha), None) => format!("`{}`", short_sha(&sha)),
        (None, _) => "Unknown".to_string(),
    };
    Embed {
        title: format!("{emoji} Deployment {state}"),
        color,
        fields: vec![
            field("Environment", name, true),
            field(
                "Branch",
                non_empty(meta.github_commit_ref).unwrap_or_else(|| "Unknown".to_string()),
                true,
            ),
            field("Commit", commit, true),
            field(
                "Commit Message",
                non_empty(meta.github_commit_message)
                    .unwrap_or_else(|| "No message provided".to_string()),
                false,
            ),
            field("Deployment URL", url, false),
        ],
        timestamp: now,
        footer: EmbedFooter { text: format!("Deployed by {}", creator.username) },
    }
}

async fn relay(config: &Config, http: &reqwest::Client, body: &[u8]) -> Result<()> {
    let webhook = config.webhook.as_ref().context("Webhook not configured")?;
    let event: DeploymentEvent =
        serde_json::from_slice(body).context("Failed to parse deployment event")?;
    tracing::info!("Received {} for {}", event.kind, event.deployment.name);
    let message = DiscordMessage {
        embeds: vec![build_embed(event, webhook.repository.as_deref(), OffsetDateTime::now_utc())],
    };
    http.post(webhook.discord_url.clone())
        .json(&message)
        .send()
        .await
        .map_err(reqwest::Error::without_url)
        .context("Failed to reach Discord")?
        .error_for_status()
        .map_err(reqwest::Error::without_url)
        .context("Discord rejected the message")?;
    Ok(())
}

/// Relay a signed deployment webhook to Discord as an embed.
pub async fn discord(
    State(config): State<Arc<Config>>,
    State(http): State<reqwest::Client>,
    VercelEvent { body }: VercelEvent,
) -> Response {
    match relay(&config, &http, &body).await {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => {
            tracing::error!("Webhook error: {:?}", e);
            let body = ErrorBody { error: "Failed to process webhook" };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}
