use std::time::Duration;

use anyhow::Result;
use argp::FromArgs;
use buildboard_core::util::{short_sha, size};
use buildboard_poller::{DEFAULT_INTERVAL, HttpSource, PollState, Poller, Snapshot, Trigger};
use time::format_description::well_known::Rfc3339;
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

use crate::util::parse_url;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Poll a dashboard server and print the latest builds. Press enter to refresh.
#[argp(subcommand, name = "watch")]
pub struct Args {
    #[argp(option, short = 'u', from_str_fn(parse_url))]
    /// base URL of the dashboard server
    url: Url,
    #[argp(option, short = 'i', default = "DEFAULT_INTERVAL.as_secs()")]
    /// seconds between refreshes
    interval: u64,
}

pub async fn run(args: Args) -> Result<()> {
    let source = HttpSource::new(&args.url)?;
    tracing::info!("Watching {}", source.url());
    let poller = Poller::new(source, vec![]);
    let mut snapshots = poller.subscribe();
    let task = poller.spawn(Duration::from_secs(args.interval.max(1)));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                for line in summarize(&snapshot) {
                    println!("{line}");
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(_)) => {
                    task.trigger(Trigger::Focus);
                }
                Ok(None) | Err(_) => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    task.shutdown();
    Ok(())
}

/// Lines printed for a published snapshot. Nothing while a fetch is running.
fn summarize(snapshot: &Snapshot) -> Vec<String> {
    match snapshot.state {
        PollState::Fetching => vec![],
        PollState::Failed => {
            vec![format!("Refresh failed: {}", snapshot.error.as_deref().unwrap_or("unknown error"))]
        }
        PollState::Idle => {
            let updated = snapshot
                .last_updated
                .and_then(|t| t.format(&Rfc3339).ok())
                .unwrap_or_else(|| "never".to_string());
            let artifacts: usize = snapshot.plugins.iter().map(|p| p.artifacts.len()).sum();
            let mut lines = vec![format!(
                "{} plugins, {} builds (updated {})",
                snapshot.plugins.len(),
                artifacts,
                updated
            )];
            for plugin in snapshot.plugins.iter() {
                let line = match plugin.artifacts.first() {
                    Some(latest) => format!(
                        "  {:<24} {} ({}, {} on {})",
                        plugin.name,
                        latest.name,
                        size(latest.size),
                        short_sha(&latest.workflow_run.head_sha),
                        latest.workflow_run.head_branch
                    ),
                    None => format!("  {:<24} no builds", plugin.name),
                };
                lines.push(line);
            }
            lines
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use buildboard_core::models::{Artifact, ArtifactKind, Plugin, WorkflowRunInfo};
    use time::macros::datetime;

    use super::*;

    fn snapshot(state: PollState, plugins: Vec<Plugin>) -> Snapshot {
        Snapshot {
            plugins: Arc::new(plugins),
            last_updated: Some(datetime!(2024-06-01 10:00 UTC)),
            error: None,
            state,
        }
    }

    fn plugin(name: &str, artifacts: Vec<Artifact>) -> Plugin {
        Plugin {
            name: name.to_string(),
            repo_name: name.to_string(),
            description: String::new(),
            artifacts,
        }
    }

    fn artifact() -> Artifact {
        let created_at = datetime!(2024-06-01 09:00 UTC);
        Artifact {
            name: "app-1.0.jar".to_string(),
            download_url: "/api/download?url=x&name=app-1.0.jar".to_string(),
            created_at,
            size: 1_500_000,
            expires_at: None,
            workflow_run: WorkflowRunInfo {
                head_sha: "0123456789abcdef".to_string(),
                head_branch: "v1.0".to_string(),
                conclusion: None,
                created_at,
            },
            commit_info: None,
            kind: ArtifactKind::Release,
            release_info: None,
        }
    }

    #[test]
    fn summary_lists_latest_build() {
        let lines = summarize(&snapshot(PollState::Idle, vec![
            plugin("app", vec![artifact()]),
            plugin("lib", vec![]),
        ]));
        assert_eq!(lines[0], "2 plugins, 1 builds (updated 2024-06-01T10:00:00Z)");
        assert!(lines[1].contains("app-1.0.jar (1.50 MB, 0123456 on v1.0)"));
        assert!(lines[2].ends_with("no builds"));
    }

    #[test]
    fn failed_refresh_reports_error() {
        let mut failed = snapshot(PollState::Failed, vec![plugin("app", vec![])]);
        failed.error = Some("connection refused".to_string());
        assert_eq!(summarize(&failed), ["Refresh failed: connection refused"]);
        assert!(summarize(&snapshot(PollState::Fetching, vec![])).is_empty());
    }

    fn parse(args: &[&str]) -> Result<Args, argp::EarlyExit> {
        Args::from_args(&["buildboard", "watch"], args)
    }

    #[test]
    fn parses_url_and_interval() {
        let args = parse(&["--url", "http://localhost:3000"]).unwrap();
        assert_eq!(args.url.as_str(), "http://localhost:3000/");
        assert_eq!(args.interval, DEFAULT_INTERVAL.as_secs());

        let args = parse(&["-u", "https://host/board/", "-i", "30"]).unwrap();
        assert_eq!(args.url.path(), "/board/");
        assert_eq!(args.interval, 30);
    }

    #[test]
    fn rejects_bad_url() {
        assert!(parse(&["--url", "not a url"]).is_err());
        assert!(parse(&[]).is_err());
    }
}
