//! Linear issue ingestion
//!
//! Fetches issues updated since the stored cursor via the Linear GraphQL
//! API, expands each issue into lifecycle events, and inserts idempotently.
//! The cursor only advances past batches whose inserts all succeeded, so a
//! partial failure is refetched (and deduplicated) on the next run.

use crate::error::{PulseError, Result};
use crate::ingest::{store_events, IngestOutcome};
use crate::storage::Storage;
use crate::types::{Event, EventSource};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

const LINEAR_API: &str = "https://api.linear.app/graphql";

/// Cursor key for the per-team issue watermark
pub const CURSOR_KEY: &str = "linear.updatedAfter";

/// First-run fetch window when no cursor exists
const DEFAULT_CURSOR_HOURS: i64 = 72;

const ISSUES_QUERY: &str = r#"
query Issues($teamId: String!, $updatedAfter: DateTime!, $after: String) {
  issues(
    filter: { team: { id: { eq: $teamId } }, updatedAt: { gt: $updatedAfter } }
    orderBy: updatedAt
    first: 50
    after: $after
  ) {
    pageInfo {
      hasNextPage
      endCursor
    }
    nodes {
      id
      identifier
      title
      url
      createdAt
      updatedAt
      state {
        id
        name
        type
      }
      previousIdentifiers
      branchName
      priority
      assignees {
        nodes {
          id
          name
          displayName
        }
      }
      labels {
        nodes {
          id
          name
        }
      }
    }
  }
}
"#;

/// Linear issues ingester
pub struct LinearIngestor {
    client: reqwest::Client,
    api_key: String,
    team_id: String,
    storage: Arc<dyn Storage>,
}

impl LinearIngestor {
    pub fn new(api_key: String, team_id: String, storage: Arc<dyn Storage>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            team_id,
            storage,
        }
    }

    /// Run one ingest cycle. With `dry_run` set, nothing is inserted and the
    /// cursor stays put; the response carries a small event sample instead.
    pub async fn ingest(&self, dry_run: bool) -> Result<IngestOutcome> {
        let updated_after = self
            .storage
            .get_cursor(CURSOR_KEY, DEFAULT_CURSOR_HOURS)
            .await?;
        info!("Starting Linear ingest from cursor: {}", updated_after);

        let issues = self.fetch_issues(&updated_after).await?;
        self.process_issues(issues, updated_after, dry_run).await
    }

    /// Normalize and store a fetched batch, advancing the cursor only when
    /// every insert succeeded.
    async fn process_issues(
        &self,
        issues: Vec<Value>,
        updated_after: String,
        dry_run: bool,
    ) -> Result<IngestOutcome> {
        if issues.is_empty() {
            return Ok(IngestOutcome {
                inserted: 0,
                skipped: 0,
                cursor: Some(updated_after),
                issues_processed: Some(0),
                ..IngestOutcome::default()
            });
        }

        let mut max_updated_at = updated_after.clone();
        let mut all_events = Vec::new();

        for issue in &issues {
            if let Some(issue_updated) = issue.get("updatedAt").and_then(|v| v.as_str()) {
                if issue_updated > max_updated_at.as_str() {
                    max_updated_at = issue_updated.to_string();
                }
            }
            all_events.extend(normalize_linear_issue(issue));
        }

        if dry_run {
            let sample: Vec<Event> = all_events.iter().take(3).cloned().collect();
            return Ok(IngestOutcome {
                inserted: 0,
                skipped: 0,
                cursor: Some(max_updated_at),
                issues_processed: Some(issues.len() as u64),
                events_generated: Some(all_events.len() as u64),
                sample: Some(sample),
            });
        }

        let (inserted, skipped, failures) =
            store_events(self.storage.as_ref(), &all_events).await;

        // Only advance past durably inserted batches; a partial failure is
        // refetched next run and deduplicated by the idempotent insert.
        let cursor = if failures == 0 {
            self.storage.set_cursor(CURSOR_KEY, &max_updated_at).await?;
            max_updated_at
        } else {
            warn!(
                "{} insert failures; leaving cursor at {}",
                failures, updated_after
            );
            updated_after
        };

        info!(
            "Linear ingest completed: {} inserted, {} skipped",
            inserted, skipped
        );

        Ok(IngestOutcome {
            inserted,
            skipped,
            cursor: Some(cursor),
            issues_processed: Some(issues.len() as u64),
            ..IngestOutcome::default()
        })
    }

    /// Fetch all issues updated after the watermark, following pagination.
    async fn fetch_issues(&self, updated_after: &str) -> Result<Vec<Value>> {
        let mut all_issues = Vec::new();
        let mut after_cursor: Option<String> = None;

        loop {
            let variables = json!({
                "teamId": self.team_id,
                "updatedAfter": updated_after,
                "after": after_cursor,
            });

            let response = self
                .client
                .post(LINEAR_API)
                .header("Authorization", &self.api_key)
                .header("Content-Type", "application/json")
                .json(&json!({"query": ISSUES_QUERY, "variables": variables}))
                .send()
                .await?
                .error_for_status()?;

            let body: Value = response.json().await?;

            if let Some(errors) = body.get("errors") {
                return Err(PulseError::ExternalApi {
                    service: "linear".to_string(),
                    message: errors.to_string(),
                });
            }

            let issues_data = body
                .get("data")
                .and_then(|d| d.get("issues"))
                .cloned()
                .unwrap_or(Value::Null);
            let nodes = issues_data
                .get("nodes")
                .and_then(|n| n.as_array())
                .cloned()
                .unwrap_or_default();
            all_issues.extend(nodes);

            let page_info = issues_data.get("pageInfo").cloned().unwrap_or(Value::Null);
            let has_next = page_info
                .get("hasNextPage")
                .and_then(|h| h.as_bool())
                .unwrap_or(false);
            if !has_next {
                break;
            }
            after_cursor = page_info
                .get("endCursor")
                .and_then(|c| c.as_str())
                .map(str::to_string);
        }

        info!(
            "Fetched {} Linear issues updated after {}",
            all_issues.len(),
            updated_after
        );
        Ok(all_issues)
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn nodes(value: &Value, key: &str) -> Vec<Value> {
    value
        .get(key)
        .and_then(|v| v.get("nodes"))
        .and_then(|n| n.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Expand one Linear issue into normalized lifecycle events.
///
/// Emits ISSUE_CREATED, ISSUE_UPDATED (when the issue has been touched since
/// creation), an inferred ISSUE_STATE_CHANGED, and ISSUE_BLOCKED when the
/// state or a label names a block. The state-change event is a heuristic:
/// without prior-state tracking, any update reads as a transition, so it can
/// false-positive on content-only edits.
pub fn normalize_linear_issue(issue: &Value) -> Vec<Event> {
    let mut events = Vec::new();

    let issue_id = str_field(issue, "id");
    let identifier = str_field(issue, "identifier");
    let title = str_field(issue, "title");
    let url = issue.get("url").and_then(|u| u.as_str()).map(str::to_string);
    let created_at = str_field(issue, "createdAt");
    let updated_at = str_field(issue, "updatedAt");

    let state = issue.get("state").cloned().unwrap_or(Value::Null);
    let state_name = str_field(&state, "name");

    let assignees: Vec<Value> = nodes(issue, "assignees")
        .iter()
        .map(|a| {
            json!({
                "id": a.get("id"),
                "name": a.get("name"),
                "displayName": a.get("displayName"),
            })
        })
        .collect();
    let labels: Vec<Value> = nodes(issue, "labels")
        .iter()
        .map(|l| json!({"id": l.get("id"), "name": l.get("name")}))
        .collect();

    let meta = json!({
        "identifier": identifier,
        "state": state,
        "priority": issue.get("priority"),
        "assignees": assignees,
        "labels": labels,
        "branchName": issue.get("branchName"),
        "previousIdentifiers": issue.get("previousIdentifiers").cloned().unwrap_or(json!([])),
    });

    let display_title = if identifier.is_empty() {
        title.clone()
    } else {
        format!("{} {}", identifier, title)
    };

    let with_event_type = |event_type: &str| -> Value {
        let mut merged = meta.clone();
        merged["event_type"] = json!(event_type);
        merged
    };

    // Linear's API lacks reliable actor attribution, so events stay anonymous
    let make_event = |ts: &str, kind: &str, event_title: String, meta: Value| Event {
        ts: ts.to_string(),
        source: EventSource::Linear,
        actor: None,
        kind: kind.to_string(),
        ref_id: issue_id.clone(),
        title: Some(event_title),
        url: url.clone(),
        meta,
    };

    if !created_at.is_empty() {
        events.push(make_event(
            &created_at,
            "ISSUE_CREATED",
            display_title.clone(),
            with_event_type("created"),
        ));
    }

    let was_updated = !updated_at.is_empty() && updated_at != created_at;

    if was_updated {
        events.push(make_event(
            &updated_at,
            "ISSUE_UPDATED",
            display_title.clone(),
            with_event_type("updated"),
        ));
    }

    // Inferred transition; see the function doc for the caveat
    if was_updated && !state_name.is_empty() {
        events.push(make_event(
            &updated_at,
            "ISSUE_STATE_CHANGED",
            format!("{} state changed to {}", identifier, state_name),
            with_event_type("state_changed"),
        ));
    }

    let is_blocked = state_name.to_lowercase().contains("blocked")
        || labels.iter().any(|label| {
            label
                .get("name")
                .and_then(|n| n.as_str())
                .map(|n| n.to_lowercase().contains("blocked"))
                .unwrap_or(false)
        });

    if is_blocked {
        let ts = if updated_at.is_empty() {
            &created_at
        } else {
            &updated_at
        };
        events.push(make_event(
            ts,
            "ISSUE_BLOCKED",
            format!("{} blocked", identifier),
            with_event_type("blocked"),
        ));
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue_fixture(created: &str, updated: &str, state_name: &str, labels: Vec<&str>) -> Value {
        json!({
            "id": "lin_abc",
            "identifier": "PUL-7",
            "title": "Harden cursor advancement",
            "url": "https://linear.app/team/issue/PUL-7",
            "createdAt": created,
            "updatedAt": updated,
            "state": {"id": "s1", "name": state_name, "type": "started"},
            "priority": 2,
            "branchName": "pul-7-harden",
            "previousIdentifiers": [],
            "assignees": {"nodes": [{"id": "u1", "name": "sam", "displayName": "Sam"}]},
            "labels": {"nodes": labels.iter().map(|l| json!({"id": l, "name": l})).collect::<Vec<_>>()}
        })
    }

    #[test]
    fn test_untouched_issue_emits_only_created() {
        let issue = issue_fixture(
            "2025-06-01T10:00:00Z",
            "2025-06-01T10:00:00Z",
            "Todo",
            vec![],
        );

        let events = normalize_linear_issue(&issue);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "ISSUE_CREATED");
        assert_eq!(events[0].title.as_deref(), Some("PUL-7 Harden cursor advancement"));
        assert_eq!(events[0].ref_id, "lin_abc");
        assert_eq!(events[0].meta["event_type"], "created");
        assert_eq!(events[0].meta["priority"], 2);
    }

    #[test]
    fn test_updated_issue_emits_update_and_inferred_state_change() {
        let issue = issue_fixture(
            "2025-06-01T10:00:00Z",
            "2025-06-02T12:00:00Z",
            "In Progress",
            vec![],
        );

        let events = normalize_linear_issue(&issue);
        let kinds: Vec<&str> = events.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["ISSUE_CREATED", "ISSUE_UPDATED", "ISSUE_STATE_CHANGED"]);

        let state_changed = &events[2];
        assert_eq!(state_changed.ts, "2025-06-02T12:00:00Z");
        assert_eq!(
            state_changed.title.as_deref(),
            Some("PUL-7 state changed to In Progress")
        );
    }

    #[test]
    fn test_blocked_state_emits_blocked_event() {
        let issue = issue_fixture(
            "2025-06-01T10:00:00Z",
            "2025-06-02T12:00:00Z",
            "Blocked",
            vec![],
        );

        let events = normalize_linear_issue(&issue);
        let blocked = events.iter().find(|e| e.kind == "ISSUE_BLOCKED").unwrap();
        assert_eq!(blocked.title.as_deref(), Some("PUL-7 blocked"));
        assert_eq!(blocked.ts, "2025-06-02T12:00:00Z");
    }

    #[test]
    fn test_blocked_label_emits_blocked_event() {
        let issue = issue_fixture(
            "2025-06-01T10:00:00Z",
            "2025-06-01T10:00:00Z",
            "Todo",
            vec!["blocked-on-infra"],
        );

        let events = normalize_linear_issue(&issue);
        assert!(events.iter().any(|e| e.kind == "ISSUE_BLOCKED"));
    }

    #[test]
    fn test_unblocked_issue_has_no_blocked_event() {
        let issue = issue_fixture(
            "2025-06-01T10:00:00Z",
            "2025-06-02T12:00:00Z",
            "Done",
            vec!["bug"],
        );

        let events = normalize_linear_issue(&issue);
        assert!(!events.iter().any(|e| e.kind == "ISSUE_BLOCKED"));
    }

    #[tokio::test]
    async fn test_cursor_advances_only_after_clean_batch() {
        use crate::storage::MockStorage;
        use crate::types::InsertOutcome;
        use std::sync::Arc;

        // Clean batch: cursor moves to the max observed updatedAt
        let mut storage = MockStorage::new();
        storage
            .expect_insert_event()
            .returning(|_| Ok(InsertOutcome::Inserted));
        storage
            .expect_set_cursor()
            .withf(|key, value| key == CURSOR_KEY && value == "2025-06-02T12:00:00Z")
            .times(1)
            .returning(|_, _| Ok(()));

        let ingester = LinearIngestor::new(
            "key".to_string(),
            "team".to_string(),
            Arc::new(storage),
        );
        let issues = vec![issue_fixture(
            "2025-06-01T10:00:00Z",
            "2025-06-02T12:00:00Z",
            "In Progress",
            vec![],
        )];
        let outcome = ingester
            .process_issues(issues, "2025-05-30T00:00:00Z".to_string(), false)
            .await
            .unwrap();

        assert_eq!(outcome.inserted, 3);
        assert_eq!(outcome.cursor.as_deref(), Some("2025-06-02T12:00:00Z"));

        // Failing batch: cursor stays at the starting watermark
        let mut storage = MockStorage::new();
        storage
            .expect_insert_event()
            .returning(|_| Err(crate::error::PulseError::Database("disk full".to_string())));
        storage.expect_set_cursor().times(0);

        let ingester = LinearIngestor::new(
            "key".to_string(),
            "team".to_string(),
            Arc::new(storage),
        );
        let issues = vec![issue_fixture(
            "2025-06-01T10:00:00Z",
            "2025-06-02T12:00:00Z",
            "In Progress",
            vec![],
        )];
        let outcome = ingester
            .process_issues(issues, "2025-05-30T00:00:00Z".to_string(), false)
            .await
            .unwrap();

        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.skipped, 3);
        assert_eq!(outcome.cursor.as_deref(), Some("2025-05-30T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_dry_run_inserts_nothing_and_samples() {
        use crate::storage::MockStorage;
        use std::sync::Arc;

        let mut storage = MockStorage::new();
        storage.expect_insert_event().times(0);
        storage.expect_set_cursor().times(0);

        let ingester = LinearIngestor::new(
            "key".to_string(),
            "team".to_string(),
            Arc::new(storage),
        );
        let issues = vec![
            issue_fixture("2025-06-01T10:00:00Z", "2025-06-02T12:00:00Z", "Blocked", vec![]),
            issue_fixture("2025-06-01T11:00:00Z", "2025-06-01T11:00:00Z", "Todo", vec![]),
        ];
        let outcome = ingester
            .process_issues(issues, "2025-05-30T00:00:00Z".to_string(), true)
            .await
            .unwrap();

        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.issues_processed, Some(2));
        // 4 blocked-issue events + 1 created; sample capped at 3
        assert_eq!(outcome.events_generated, Some(5));
        assert_eq!(outcome.sample.as_ref().unwrap().len(), 3);
        assert_eq!(outcome.cursor.as_deref(), Some("2025-06-02T12:00:00Z"));
    }

    #[test]
    fn test_meta_carries_assignees_and_labels() {
        let issue = issue_fixture(
            "2025-06-01T10:00:00Z",
            "2025-06-01T10:00:00Z",
            "Todo",
            vec!["bug"],
        );

        let events = normalize_linear_issue(&issue);
        let meta = &events[0].meta;
        assert_eq!(meta["assignees"][0]["displayName"], "Sam");
        assert_eq!(meta["labels"][0]["name"], "bug");
        assert_eq!(meta["identifier"], "PUL-7");
        assert_eq!(meta["branchName"], "pul-7-harden");
    }
}
