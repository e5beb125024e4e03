//! GitHub event ingestion
//!
//! Fetches repository events from the GitHub REST API, normalizes them to
//! the common event schema, and inserts idempotently. The events API has no
//! `since` parameter, so the optional window filter runs client-side on
//! `created_at`.

use crate::error::{PulseError, Result};
use crate::ingest::{store_events, IngestOutcome};
use crate::metrics::parse_event_ts;
use crate::storage::Storage;
use crate::types::{Event, EventSource};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

const GITHUB_API: &str = "https://api.github.com";
const USER_AGENT: &str = "pulse-github-ingest/1.0";

/// GitHub events ingester
pub struct GithubIngestor {
    client: reqwest::Client,
    token: String,
    storage: Arc<dyn Storage>,
}

impl GithubIngestor {
    pub fn new(token: String, storage: Arc<dyn Storage>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            storage,
        }
    }

    /// Fetch, normalize, and store events for a repository.
    pub async fn ingest(
        &self,
        owner: &str,
        repo: &str,
        since_iso: Option<&str>,
    ) -> Result<IngestOutcome> {
        let raw_events = self.fetch_events(owner, repo, since_iso).await?;

        let events: Vec<Event> = raw_events.iter().map(normalize_github_event).collect();
        let (inserted, skipped, _failures) = store_events(self.storage.as_ref(), &events).await;

        info!(
            "GitHub ingest completed for {}/{}: {} inserted, {} skipped",
            owner, repo, inserted, skipped
        );

        Ok(IngestOutcome {
            inserted,
            skipped,
            ..IngestOutcome::default()
        })
    }

    async fn fetch_events(
        &self,
        owner: &str,
        repo: &str,
        since_iso: Option<&str>,
    ) -> Result<Vec<Value>> {
        let url = format!("{}/repos/{}/{}/events", GITHUB_API, owner, repo);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", USER_AGENT)
            .query(&[("per_page", "100")])
            .send()
            .await?
            .error_for_status()?;

        let mut events: Vec<Value> = response.json().await?;

        if let Some(since_iso) = since_iso {
            let since = parse_event_ts(since_iso).ok_or_else(|| {
                PulseError::InvalidRequest(format!("Invalid since_iso timestamp: {}", since_iso))
            })?;

            events.retain(|event| {
                event
                    .get("created_at")
                    .and_then(|ts| ts.as_str())
                    .and_then(parse_event_ts)
                    .map(|dt| dt >= since)
                    .unwrap_or(false)
            });
        }

        info!("Fetched {} GitHub events for {}/{}", events.len(), owner, repo);
        Ok(events)
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn value_to_id(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalize a raw GitHub event into the common schema.
///
/// Push events take the first commit SHA as their ref id; PR and issue
/// events get an action-suffixed type tag so lifecycle stages stay
/// distinguishable.
pub fn normalize_github_event(event: &Value) -> Event {
    let ts = event
        .get("created_at")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let actor = event
        .get("actor")
        .and_then(|a| a.get("login"))
        .and_then(|l| l.as_str())
        .map(str::to_string);
    let mut kind = event
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("unknown")
        .to_string();
    let mut ref_id = value_to_id(event.get("id")).unwrap_or_else(|| "unknown".to_string());

    let payload = event.get("payload").cloned().unwrap_or(Value::Null);
    let repo_name = event
        .get("repo")
        .and_then(|r| r.get("name"))
        .and_then(|n| n.as_str());
    let repo_url = repo_name.map(|name| format!("https://github.com/{}", name));

    let mut title = None;
    let mut url = None;

    match kind.as_str() {
        "PushEvent" => {
            let commits = payload
                .get("commits")
                .and_then(|c| c.as_array())
                .cloned()
                .unwrap_or_default();
            if let Some(first) = commits.first() {
                let message = first
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("No message");
                title = Some(format!("Push: {}", truncate(message, 100)));
                if let Some(sha) = first.get("sha").and_then(|s| s.as_str()) {
                    ref_id = sha.to_string();
                }
                url = repo_name.map(|name| {
                    format!("https://github.com/{}/commits/{}", name, ref_id)
                });
            } else {
                let push_ref = payload
                    .get("ref")
                    .and_then(|r| r.as_str())
                    .unwrap_or("unknown ref");
                title = Some(format!("Push to {}", push_ref));
            }
        }
        "PullRequestEvent" => {
            let pr = payload.get("pull_request").cloned().unwrap_or(Value::Null);
            let action = payload
                .get("action")
                .and_then(|a| a.as_str())
                .unwrap_or("unknown");
            let pr_title = pr.get("title").and_then(|t| t.as_str()).unwrap_or("No title");
            title = Some(format!("PR {}: {}", action, truncate(pr_title, 100)));
            if let Some(id) = value_to_id(pr.get("id")) {
                ref_id = id;
            }
            url = pr
                .get("html_url")
                .and_then(|u| u.as_str())
                .map(str::to_string);
            kind = format!("PullRequestEvent_{}", action);
        }
        "IssuesEvent" => {
            let issue = payload.get("issue").cloned().unwrap_or(Value::Null);
            let action = payload
                .get("action")
                .and_then(|a| a.as_str())
                .unwrap_or("unknown");
            let issue_title = issue
                .get("title")
                .and_then(|t| t.as_str())
                .unwrap_or("No title");
            title = Some(format!("Issue {}: {}", action, truncate(issue_title, 100)));
            if let Some(id) = value_to_id(issue.get("id")) {
                ref_id = id;
            }
            url = issue
                .get("html_url")
                .and_then(|u| u.as_str())
                .map(str::to_string);
            kind = format!("IssuesEvent_{}", action);
        }
        "CreateEvent" | "DeleteEvent" => {
            let verb = if kind == "CreateEvent" { "Created" } else { "Deleted" };
            let ref_type = payload
                .get("ref_type")
                .and_then(|r| r.as_str())
                .unwrap_or("unknown");
            match payload.get("ref").and_then(|r| r.as_str()) {
                Some(created_ref) => {
                    title = Some(format!("{} {}: {}", verb, ref_type, created_ref));
                    ref_id = format!("{}_{}", ref_type, created_ref);
                }
                None => {
                    title = Some(format!("{} {}", verb, ref_type));
                }
            }
            url = repo_url;
        }
        _ => {
            title = Some(format!("{} event", kind));
            url = repo_url;
        }
    }

    Event {
        ts,
        source: EventSource::Github,
        actor,
        kind,
        ref_id,
        title,
        url,
        meta: event.clone(),
    }
}
