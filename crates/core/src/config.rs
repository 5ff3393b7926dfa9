use std::{fmt, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub github: GitHubConfig,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port(), request_timeout_secs: default_request_timeout() }
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct GitHubConfig {
    #[serde(default)]
    pub token: String,
    /// Account whose repositories are listed.
    #[serde(default)]
    pub account: String,
    #[serde(default = "default_api_url")]
    pub api_url: Url,
    /// Build descriptor files; a repository is shown if any of them exists.
    #[serde(default = "default_descriptors")]
    pub descriptors: Vec<String>,
    #[serde(default = "default_artifact_limit")]
    pub artifact_limit: u8,
    #[serde(default = "default_release_limit")]
    pub release_limit: u8,
    /// Optional cap on repositories checked or aggregated at once. Unset means all at once.
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Extra hosts the download proxy may forward credentials to.
    #[serde(default)]
    pub download_hosts: Vec<String>,
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &"[redacted]")
            .field("account", &self.account)
            .field("api_url", &self.api_url.as_str())
            .field("descriptors", &self.descriptors)
            .field("artifact_limit", &self.artifact_limit)
            .field("release_limit", &self.release_limit)
            .field("concurrency", &self.concurrency)
            .field("download_hosts", &self.download_hosts)
            .finish()
    }
}

impl GitHubConfig {
    pub fn new(token: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            account: account.into(),
            api_url: default_api_url(),
            descriptors: default_descriptors(),
            artifact_limit: default_artifact_limit(),
            release_limit: default_release_limit(),
            concurrency: None,
            download_hosts: vec![],
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    /// Shared secret used to sign deployment webhooks.
    pub secret: String,
    pub discord_url: Url,
    /// `owner/repo` used to link commits in Discord messages.
    #[serde(default)]
    pub repository: Option<String>,
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("secret", &"[redacted]")
            .field("discord_url", &"[redacted]")
            .field("repository", &self.repository)
            .finish()
    }
}

fn default_port() -> u16 { 3000 }

fn default_request_timeout() -> u64 { 120 }

fn default_api_url() -> Url { Url::parse("https://api.github.com").expect("valid URL") }

fn default_descriptors() -> Vec<String> {
    vec!["pom.xml".to_string(), "build.gradle".to_string(), "build.gradle.kts".to_string()]
}

fn default_artifact_limit() -> u8 { 10 }

fn default_release_limit() -> u8 { 5 }

impl Config {
    /// Load the YAML config file and apply `GITHUB_TOKEN` / `GITHUB_USERNAME` overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = BufReader::new(
            File::open(path)
                .with_context(|| format!("Failed to open config file {}", path.display()))?,
        );
        let mut config: Config = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(source: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(source).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(token) = get("GITHUB_TOKEN").filter(|v| !v.is_empty()) {
            self.github.token = token;
        }
        if let Some(account) = get("GITHUB_USERNAME").filter(|v| !v.is_empty()) {
            self.github.account = account;
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.github.token.is_empty(), "github.token (or GITHUB_TOKEN) is required");
        ensure!(!self.github.account.is_empty(), "github.account (or GITHUB_USERNAME) is required");
        ensure!(!self.github.descriptors.is_empty(), "github.descriptors must not be empty");
        ensure!(self.github.concurrency != Some(0), "github.concurrency must be at least 1");
        Ok(())
    }
}
