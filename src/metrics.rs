//! Metrics computation over the event log
//!
//! Pure functions turning a list of normalized events into the rolling
//! 48-hour counters served by `/analyze` and fed into the context builder.

use crate::types::{Event, EventSource, MetricsData};
use chrono::{DateTime, Duration, Utc};

/// Parse an event timestamp leniently.
///
/// Accepts RFC3339 with a `Z` suffix or an explicit offset, and bare
/// datetimes (assumed UTC). Returns `None` for anything unparseable: callers
/// skip such events rather than failing the whole computation.
pub fn parse_event_ts(ts: &str) -> Option<DateTime<Utc>> {
    if ts.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.with_timezone(&Utc));
    }

    // Bare datetime without timezone info: treat as UTC
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S") {
        return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
    }

    None
}

/// Whether a GitHub PR-close event actually merged.
///
/// The `merged` flag lives in the raw payload; an explicit
/// `PullRequestEvent_merged` type also counts.
fn pr_was_merged(event: &Event) -> bool {
    let merged_in_payload = event
        .meta
        .get("payload")
        .and_then(|p| p.get("pull_request"))
        .and_then(|pr| pr.get("merged"))
        .and_then(|m| m.as_bool())
        .unwrap_or(false);

    merged_in_payload || event.kind == "PullRequestEvent_merged"
}

/// Compute metrics from events in the last 48 hours, anchored at now (UTC).
///
/// Events outside the window or with unparseable timestamps are skipped.
/// The Linear-side counters are explicit stubs until the upstream signal
/// exists; they are always emitted as zero rather than omitted.
pub fn compute_48h_metrics(events: &[Event]) -> MetricsData {
    let cutoff = Utc::now() - Duration::hours(48);
    let mut metrics = MetricsData::default();

    for event in events {
        let Some(event_dt) = parse_event_ts(&event.ts) else {
            continue;
        };
        if event_dt < cutoff {
            continue;
        }

        match event.source {
            EventSource::Github => {
                if event.kind == "PullRequestEvent_opened" {
                    metrics.prs_open_48h += 1;
                } else if event.kind == "PullRequestEvent_closed"
                    || event.kind == "PullRequestEvent_merged"
                {
                    if pr_was_merged(event) {
                        metrics.prs_merged_48h += 1;
                    }
                }
            }
            EventSource::Linear => {
                // Ticket counters stay at zero until Linear metrics land
            }
        }
    }

    metrics
}

/// Return the most recent events, newest first, capped at `limit`.
///
/// Events with unparseable timestamps sort as epoch, i.e. last.
pub fn filter_recent_events(mut events: Vec<Event>, limit: usize) -> Vec<Event> {
    let epoch = DateTime::<Utc>::from_timestamp(0, 0).expect("epoch is representable");

    events.sort_by_key(|e| std::cmp::Reverse(parse_event_ts(&e.ts).unwrap_or(epoch)));
    events.truncate(limit);
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(ts: String, source: EventSource, kind: &str, ref_id: &str, meta: serde_json::Value) -> Event {
        Event {
            ts,
            source,
            actor: Some("dev1".to_string()),
            kind: kind.to_string(),
            ref_id: ref_id.to_string(),
            title: Some("test".to_string()),
            url: None,
            meta,
        }
    }

    fn hours_ago(h: i64) -> String {
        (Utc::now() - Duration::hours(h)).to_rfc3339()
    }

    /// Six events spanning the window: opened at -12h, closed+merged at -24h,
    /// opened at -72h (outside), closed-not-merged at -6h, push at -3h,
    /// linear at -1h.
    fn sample_events() -> Vec<Event> {
        vec![
            event(
                hours_ago(12),
                EventSource::Github,
                "PullRequestEvent_opened",
                "pr_123",
                json!({"payload": {"action": "opened", "pull_request": {"id": 123, "merged": false}}}),
            ),
            event(
                hours_ago(24),
                EventSource::Github,
                "PullRequestEvent_closed",
                "pr_124",
                json!({"payload": {"action": "closed", "pull_request": {"id": 124, "merged": true}}}),
            ),
            event(
                hours_ago(72),
                EventSource::Github,
                "PullRequestEvent_opened",
                "pr_100",
                json!({"payload": {"action": "opened", "pull_request": {"id": 100, "merged": false}}}),
            ),
            event(
                hours_ago(6),
                EventSource::Github,
                "PullRequestEvent_closed",
                "pr_125",
                json!({"payload": {"action": "closed", "pull_request": {"id": 125, "merged": false}}}),
            ),
            event(hours_ago(3), EventSource::Github, "PushEvent", "sha_1", json!({})),
            event(hours_ago(1), EventSource::Linear, "ISSUE_UPDATED", "lin_1", json!({})),
        ]
    }

    #[test]
    fn test_48h_metrics_sample_fixture() {
        let metrics = compute_48h_metrics(&sample_events());
        assert_eq!(metrics.prs_open_48h, 1);
        assert_eq!(metrics.prs_merged_48h, 1);
        // Stub counters are present and zero
        assert_eq!(metrics.avg_review_hours_48h, 0.0);
        assert_eq!(metrics.tickets_moved_48h, 0);
        assert_eq!(metrics.tickets_blocked_now, 0);
    }

    #[test]
    fn test_unparseable_timestamps_are_skipped() {
        let mut events = sample_events();
        events.push(event(
            "not-a-timestamp".to_string(),
            EventSource::Github,
            "PullRequestEvent_opened",
            "pr_999",
            json!({}),
        ));
        events.push(event(
            String::new(),
            EventSource::Github,
            "PullRequestEvent_opened",
            "pr_998",
            json!({}),
        ));

        let metrics = compute_48h_metrics(&events);
        assert_eq!(metrics.prs_open_48h, 1);
    }

    #[test]
    fn test_z_suffix_and_offset_both_normalize() {
        let base = Utc::now() - Duration::hours(2);
        let z_form = base.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        assert!(z_form.ends_with('Z'));
        // Same instant expressed at -08:00
        let offset = chrono::FixedOffset::west_opt(8 * 3600).unwrap();
        let offset_form = base.with_timezone(&offset).to_rfc3339();

        let events = vec![
            event(z_form, EventSource::Github, "PullRequestEvent_opened", "pr_1", json!({})),
            event(offset_form, EventSource::Github, "PullRequestEvent_opened", "pr_2", json!({})),
        ];

        let metrics = compute_48h_metrics(&events);
        assert_eq!(metrics.prs_open_48h, 2);
    }

    #[test]
    fn test_explicitly_typed_merge_counts_without_payload() {
        let events = vec![event(
            hours_ago(5),
            EventSource::Github,
            "PullRequestEvent_merged",
            "pr_7",
            json!({}),
        )];
        let metrics = compute_48h_metrics(&events);
        assert_eq!(metrics.prs_merged_48h, 1);
    }

    #[test]
    fn test_filter_recent_events_sorts_and_caps() {
        let events = sample_events();
        let recent = filter_recent_events(events, 3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].ref_id, "lin_1");
        assert_eq!(recent[1].ref_id, "sha_1");
        assert_eq!(recent[2].ref_id, "pr_125");
    }

    #[test]
    fn test_filter_recent_events_invalid_ts_sorts_last() {
        let mut events = sample_events();
        events.push(event(
            "garbage".to_string(),
            EventSource::Github,
            "PushEvent",
            "sha_bad",
            json!({}),
        ));

        let recent = filter_recent_events(events, 10);
        assert_eq!(recent.last().unwrap().ref_id, "sha_bad");
    }

    #[test]
    fn test_parse_event_ts_variants() {
        assert!(parse_event_ts("2025-06-01T10:00:00Z").is_some());
        assert!(parse_event_ts("2025-06-01T10:00:00+00:00").is_some());
        assert!(parse_event_ts("2025-06-01T10:00:00-08:00").is_some());
        assert!(parse_event_ts("2025-06-01T10:00:00").is_some());
        assert!(parse_event_ts("2025-06-01T10:00:00.123").is_some());
        assert!(parse_event_ts("").is_none());
        assert!(parse_event_ts("yesterday").is_none());
    }
}
