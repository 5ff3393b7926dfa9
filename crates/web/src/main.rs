mod handlers;

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    Router, ServiceExt,
    extract::{ConnectInfo, FromRef},
    http::{Method, Request, StatusCode, header},
};
use buildboard_core::config::Config;
use buildboard_github::GitHub;
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    ServiceBuilderExt,
    cors::{self, CorsLayer},
    normalize_path::NormalizePath,
    timeout::TimeoutLayer,
    trace::{DefaultOnResponse, MakeSpan, TraceLayer},
};
use tracing::{Level, Span};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::handlers::build_router;

const CONFIG_ENV: &str = "BUILDBOARD_CONFIG";

#[derive(Clone, FromRef)]
pub struct AppState {
    config: Arc<Config>,
    github: Arc<GitHub>,
    http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let github = GitHub::new(&config.github)?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("buildboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { config: Arc::new(config), github, http })
    }
}

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    if let Err(e) = run().await {
        tracing::error!("{:?}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.yml".to_string());
    let config = Config::load(&config_path)?;
    tracing::debug!("Loaded config {:?}", config);
    let state = AppState::new(config)?;
    if let Err(e) = state.github.verify().await {
        tracing::warn!("Failed to verify GitHub token: {:?}", e);
    }

    let port = state.config.server.port;
    let app = app(state);
    let service = ServiceExt::<axum::extract::Request>::into_make_service_with_connect_info::<
        SocketAddr,
    >(app);
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = TcpListener::bind(addr).await.context("Failed to bind listener")?;
    tracing::info!("Web server: Listening on {}", addr);

    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server error")?;
    tracing::info!("Shut down gracefully");
    Ok(())
}

/// The router with its middleware. Trailing slashes are trimmed before routing, so the
/// layer wraps the router instead of being added with `Router::layer`.
fn app(state: AppState) -> NormalizePath<Router> {
    let sensitive_headers: Arc<[_]> = vec![header::AUTHORIZATION, header::COOKIE].into();
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let middleware = ServiceBuilder::new()
        .sensitive_request_headers(sensitive_headers.clone())
        .sensitive_response_headers(sensitive_headers)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(RequestSpan { level: Level::INFO })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
        .layer(CorsLayer::new().allow_methods([Method::GET]).allow_origin(cors::Any))
        .compression();
    NormalizePath::trim_trailing_slash(build_router().with_state(state).layer(middleware))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => {},
            _ = terminate => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Request span with the client address (behind Cloudflare, `CF-Connecting-IP`).
#[derive(Debug, Clone)]
pub struct RequestSpan {
    level: Level,
}

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let ip = match request.headers().get("CF-Connecting-IP") {
            Some(v) => str::from_utf8(v.as_bytes()).ok().and_then(|s| IpAddr::from_str(s).ok()),
            None => request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(socket_addr)| socket_addr.ip()),
        };
        let ip = ip.unwrap_or(IpAddr::from([0, 0, 0, 0]));
        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("[unknown]");
        macro_rules! make_span {
            ($level:expr) => {
                tracing::span!(
                    $level,
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    ip = %ip,
                    user_agent = %user_agent,
                )
            }
        }
        match self.level {
            Level::ERROR => make_span!(Level::ERROR),
            Level::WARN => make_span!(Level::WARN),
            Level::INFO => make_span!(Level::INFO),
            Level::DEBUG => make_span!(Level::DEBUG),
            Level::TRACE => make_span!(Level::TRACE),
        }
    }
}


#[cfg(test)]
mod tests {
    use wiremock::MockServer;

    use crate::test_util::{config, get};

    #[tokio::test]
    async fn health() {
        let server = MockServer::start().await;
        let response = get(config(&server), "/health").await;
        assert_eq!(response.status, 200);
        assert_eq!(response.text(), "ok");
    }

    #[tokio::test]
    async fn trailing_slash_is_trimmed() {
        let server = MockServer::start().await;
        let response = get(config(&server), "/health/").await;
        assert_eq!(response.status, 200);
        assert_eq!(response.text(), "ok");

        let response = get(config(&server), "/api/download/?url=").await;
        assert_eq!(response.status, 400);
        assert_eq!(response.text(), "Missing URL parameter");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let server = MockServer::start().await;
        let response = get(config(&server), "/api/nope").await;
        assert_eq!(response.status, 404);
    }
}
