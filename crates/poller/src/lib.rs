//! Keeps a live copy of the plugin list by polling the server's update endpoint.
//!
//! A [`Poller`] owns the published [`Snapshot`] and performs single refreshes; a
//! [`PollerTask`] drives it from an interval timer and from external triggers such as
//! a view regaining focus. Dropping the task stops both.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use buildboard_core::models::{Plugin, PluginUpdate};
use reqwest::header::{CACHE_CONTROL, HeaderValue, PRAGMA};
use time::OffsetDateTime;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use url::Url;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Where refreshed plugin lists come from.
#[async_trait]
pub trait UpdateSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<PluginUpdate>;
}

/// Fetches `/api/updates` from a running server.
pub struct HttpSource {
    client: reqwest::Client,
    url: Url,
}

impl HttpSource {
    /// `base_url` may carry a path prefix when the server sits behind a reverse proxy.
    pub fn new(base_url: &Url) -> Result<Self> {
        let mut base = base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let url = base.join("api/updates").context("Invalid server URL")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url { &self.url }
}

#[async_trait]
impl UpdateSource for HttpSource {
    async fn fetch(&self) -> Result<PluginUpdate> {
        let response = self
            .client
            .get(self.url.clone())
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .header(PRAGMA, HeaderValue::from_static("no-cache"))
            .send()
            .await
            .context("Failed to reach update endpoint")?
            .error_for_status()
            .context("Update endpoint returned an error")?;
        response.json::<PluginUpdate>().await.context("Failed to parse update")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Mount,
    Interval,
    Visibility,
    Focus,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Fetching,
    /// Idle, but the last refresh failed. `Snapshot::error` holds the reason.
    Failed,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub plugins: Arc<Vec<Plugin>>,
    /// Server timestamp of the last successful refresh.
    pub last_updated: Option<OffsetDateTime>,
    pub error: Option<String>,
    pub state: PollState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated,
    Failed,
    /// Another refresh was already running.
    Skipped,
}

pub struct Poller<S> {
    source: S,
    snapshot: watch::Sender<Snapshot>,
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

impl<S: UpdateSource> Poller<S> {
    pub fn new(source: S, initial: Vec<Plugin>) -> Arc<Self> {
        let (snapshot, _) = watch::channel(Snapshot {
            plugins: Arc::new(initial),
            last_updated: None,
            error: None,
            state: PollState::Idle,
        });
        Arc::new(Self { source, snapshot, in_flight: AtomicBool::new(false) })
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> { self.snapshot.subscribe() }

    pub fn snapshot(&self) -> Snapshot { self.snapshot.borrow().clone() }

    /// Perform one refresh unless one is already running.
    pub async fn refresh(&self, trigger: Trigger) -> RefreshOutcome {
        if self.in_flight.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err()
        {
            tracing::debug!(?trigger, "Refresh already in flight, skipping");
            return RefreshOutcome::Skipped;
        }
        let in_flight = InFlight(&self.in_flight);
        tracing::debug!(?trigger, "Refreshing plugins");
        self.snapshot.send_modify(|s| s.state = PollState::Fetching);
        let result = self.source.fetch().await;
        let outcome = match &result {
            Ok(update) => {
                tracing::debug!("Refreshed {} plugins", update.plugins.len());
                RefreshOutcome::Updated
            }
            Err(e) => {
                tracing::warn!("Failed to refresh plugins: {:?}", e);
                RefreshOutcome::Failed
            }
        };
        self.snapshot.send_modify(move |s| {
            match result {
                Ok(update) => {
                    s.plugins = Arc::new(update.plugins);
                    s.last_updated = Some(update.timestamp);
                    s.error = None;
                    s.state = PollState::Idle;
                }
                Err(e) => {
                    s.error = Some(format!("{e:#}"));
                    s.state = PollState::Failed;
                }
            }
            // Released while the channel is locked, so a subsequent refresh always
            // publishes after this one.
            drop(in_flight);
        });
        outcome
    }

    /// Start polling. The first tick fires immediately as [`Trigger::Mount`].
    pub fn spawn(self: &Arc<Self>, interval: Duration) -> PollerTask {
        let (triggers, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(self.clone(), interval, receiver));
        PollerTask { triggers, handle }
    }
}

async fn run<S: UpdateSource>(
    poller: Arc<Poller<S>>,
    interval: Duration,
    mut triggers: mpsc::UnboundedReceiver<Trigger>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut mounted = false;
    loop {
        let trigger = tokio::select! {
            _ = ticker.tick() => {
                if mounted {
                    Trigger::Interval
                } else {
                    mounted = true;
                    Trigger::Mount
                }
            }
            Some(trigger) = triggers.recv() => trigger,
        };
        // Refreshes run on their own task so that triggers arriving meanwhile hit the
        // in-flight guard instead of queueing.
        let poller = poller.clone();
        tokio::spawn(async move {
            poller.refresh(trigger).await;
        });
    }
}

/// Handle to a running poll loop. Dropping it stops the timer and trigger listener;
/// a refresh already running is left to finish.
pub struct PollerTask {
    triggers: mpsc::UnboundedSender<Trigger>,
    handle: JoinHandle<()>,
}

impl PollerTask {
    /// Request a refresh, e.g. when the view becomes visible again.
    pub fn trigger(&self, trigger: Trigger) -> bool { self.triggers.send(trigger).is_ok() }

    /// Stop polling. Equivalent to dropping the handle.
    pub fn shutdown(self) {}
}

impl Drop for PollerTask {
    fn drop(&mut self) { self.handle.abort(); }
}
