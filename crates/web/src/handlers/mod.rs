use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

mod download;
mod plugins;
mod webhook;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/plugins", get(plugins::list_plugins))
        .route("/api/plugins/{repo}", get(plugins::get_plugin))
        .route("/api/plugins/{repo}/commits/{sha}", get(plugins::get_commit))
        .route("/api/updates", get(plugins::get_updates))
        .route("/api/download", get(download::download))
        .route("/api/webhook/discord", post(webhook::discord))
}

async fn health() -> &'static str { "ok" }
