//! LibSQL storage backend implementation
//!
//! Persists the event log, ingest cursors, journeys, and recommendations in
//! a single libsql database. Event timestamps are normalized to RFC3339 UTC
//! with a `Z` suffix at insert time when parseable, so lexicographic `ts`
//! comparisons in SQL window queries are chronologically correct; the raw
//! upstream payload stays untouched in `meta`.

use crate::error::{PulseError, Result};
use crate::metrics::parse_event_ts;
use crate::storage::Storage;
use crate::types::{
    CurrentState, DesiredState, Event, EventSource, InsertOutcome, JourneyState,
    RecentRecommendation, RecommendationFeedback, WorkPreferences,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use libsql::{params, Builder, Connection, Database};
use tracing::{debug, info, warn};

/// Issue-lifecycle event types considered by the enriched-issues layer
const ISSUE_EVENT_TYPES: &str = "('ISSUE_CREATED', 'ISSUE_UPDATED', 'ISSUE_STATE_CHANGED')";

/// Split a migration file into individual statements, dropping comment-only
/// lines. The schema has no triggers, so a plain `;` split is sufficient.
fn split_sql_statements(sql: &str) -> Vec<String> {
    sql.lines()
        .filter(|line| !line.trim().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn fmt_cutoff(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// LibSQL storage backend
pub struct LibsqlStorage {
    db: Database,
}

impl LibsqlStorage {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &str) -> Result<Self> {
        info!("Connecting to libsql database at {}", path);
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| PulseError::Database(format!("Failed to open database: {}", e)))?;

        let storage = Self { db };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// In-memory database, for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::new_local(":memory:").await
    }

    /// Open from a database URL string (`:memory:` or a file path).
    pub async fn from_path(database_url: &str) -> Result<Self> {
        Self::new_local(database_url).await
    }

    fn get_conn(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| PulseError::Database(format!("Failed to get connection: {}", e)))
    }

    /// Run schema migrations, tracking applied files so re-runs are no-ops.
    pub async fn run_migrations(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations_applied (
                migration_name TEXT PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )",
            params![],
        )
        .await
        .map_err(|e| PulseError::Migration(format!("Failed to create migrations table: {}", e)))?;

        let migrations: [(&str, &str); 2] = [
            (
                "001_initial_schema.sql",
                include_str!("../../migrations/001_initial_schema.sql"),
            ),
            (
                "002_add_indexes.sql",
                include_str!("../../migrations/002_add_indexes.sql"),
            ),
        ];

        for (name, sql) in migrations {
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM _migrations_applied WHERE migration_name = ?",
                    params![name],
                )
                .await?;
            let already_applied = match rows.next().await? {
                Some(row) => row.get::<i64>(0).unwrap_or(0) > 0,
                None => false,
            };
            if already_applied {
                debug!("Skipping already applied migration: {}", name);
                continue;
            }

            for statement in split_sql_statements(sql) {
                conn.execute(&statement, params![]).await.map_err(|e| {
                    PulseError::Migration(format!("Failed to execute {}: {}", name, e))
                })?;
            }

            conn.execute(
                "INSERT INTO _migrations_applied (migration_name, applied_at) VALUES (?, ?)",
                params![name, Utc::now().timestamp()],
            )
            .await
            .map_err(|e| PulseError::Migration(format!("Failed to record migration: {}", e)))?;

            info!("Applied migration: {}", name);
        }

        Ok(())
    }

    /// Insert or replace a journey row. Journeys are owned by an external
    /// surface; this exists for seeding and tests.
    pub async fn upsert_journey(&self, journey: &JourneyState, is_active: bool) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO user_journey
                (id, desired_state, current_state, preferences, is_active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                desired_state = excluded.desired_state,
                current_state = excluded.current_state,
                preferences = excluded.preferences,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at",
            params![
                journey.id.clone(),
                serde_json::to_string(&journey.desired_state)?,
                serde_json::to_string(&journey.current_state)?,
                serde_json::to_string(&journey.preferences)?,
                is_active as i64,
                journey.created_at.clone(),
                journey.updated_at.clone(),
            ],
        )
        .await?;
        Ok(())
    }

    fn row_to_event(row: &libsql::Row) -> Result<Event> {
        let source_str: String = row.get(1)?;
        let source = EventSource::parse(&source_str)
            .ok_or_else(|| PulseError::Database(format!("Unknown event source: {}", source_str)))?;

        let meta_json: String = row.get(7)?;
        let meta = serde_json::from_str(&meta_json).unwrap_or(serde_json::Value::Null);

        Ok(Event {
            ts: row.get(0)?,
            source,
            actor: row.get(2)?,
            kind: row.get(3)?,
            ref_id: row.get(4)?,
            title: row.get(5)?,
            url: row.get(6)?,
            meta,
        })
    }

    async fn query_events(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Event>> {
        let conn = self.get_conn()?;
        let mut rows = conn.query(sql, params).await?;

        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(Self::row_to_event(&row)?);
        }
        Ok(events)
    }

    fn row_to_journey(row: &libsql::Row) -> Result<JourneyState> {
        let desired_json: String = row.get(1)?;
        let current_json: String = row.get(2)?;
        let preferences_json: String = row.get(3)?;

        let desired_state: DesiredState = serde_json::from_str(&desired_json)?;
        let current_state: CurrentState = serde_json::from_str(&current_json)?;
        let preferences: WorkPreferences = serde_json::from_str(&preferences_json)?;

        Ok(JourneyState {
            id: row.get(0)?,
            desired_state,
            current_state,
            preferences,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

const EVENT_COLUMNS: &str = "ts, source, actor, type, ref_id, title, url, meta";

#[async_trait]
impl Storage for LibsqlStorage {
    async fn insert_event(&self, event: &Event) -> Result<InsertOutcome> {
        let conn = self.get_conn()?;

        // Normalize parseable timestamps so string comparison == time order
        let ts = match parse_event_ts(&event.ts) {
            Some(dt) => fmt_cutoff(dt),
            None => event.ts.clone(),
        };

        let affected = conn
            .execute(
                "INSERT OR IGNORE INTO events (ts, source, actor, type, ref_id, title, url, meta)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    ts,
                    event.source.as_str(),
                    event.actor.clone(),
                    event.kind.clone(),
                    event.ref_id.clone(),
                    event.title.clone(),
                    event.url.clone(),
                    serde_json::to_string(&event.meta)?,
                ],
            )
            .await?;

        Ok(if affected > 0 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Duplicate
        })
    }

    async fn events_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Event>> {
        let sql = format!(
            "SELECT {} FROM events WHERE ts >= ? ORDER BY ts DESC",
            EVENT_COLUMNS
        );
        self.query_events(&sql, params![fmt_cutoff(cutoff)]).await
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<Event>> {
        let sql = format!(
            "SELECT {} FROM events ORDER BY ts DESC LIMIT ?",
            EVENT_COLUMNS
        );
        self.query_events(&sql, params![limit as i64]).await
    }

    async fn latest_issue_events(&self, cutoff: DateTime<Utc>) -> Result<Vec<Event>> {
        // SQLite's bare-column-with-MAX semantics: the non-aggregated
        // columns come from the row that achieves MAX(ts), one per ref_id.
        let sql = format!(
            "SELECT ts, source, actor, type, ref_id, title, url, meta, MAX(ts)
             FROM events
             WHERE source = 'linear' AND type IN {} AND ts >= ?
             GROUP BY ref_id
             ORDER BY ts DESC",
            ISSUE_EVENT_TYPES
        );
        self.query_events(&sql, params![fmt_cutoff(cutoff)]).await
    }

    async fn blocked_issue_events(&self, cutoff: DateTime<Utc>) -> Result<Vec<Event>> {
        let sql = format!(
            "SELECT {} FROM events
             WHERE source = 'linear' AND type = 'ISSUE_BLOCKED' AND ts >= ?
             ORDER BY ts DESC",
            EVENT_COLUMNS
        );
        self.query_events(&sql, params![fmt_cutoff(cutoff)]).await
    }

    async fn open_pr_events(&self, cutoff: DateTime<Utc>) -> Result<Vec<Event>> {
        let sql = format!(
            "SELECT {} FROM events
             WHERE source = 'github' AND type = 'PullRequestEvent_opened' AND ts >= ?
             ORDER BY ts DESC",
            EVENT_COLUMNS
        );
        self.query_events(&sql, params![fmt_cutoff(cutoff)]).await
    }

    async fn count_events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64> {
        let conn = self.get_conn()?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM events WHERE ts >= ? AND ts < ?",
                params![fmt_cutoff(start), fmt_cutoff(end)],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? as u64),
            None => Ok(0),
        }
    }

    async fn event_counts_by_hour(&self, cutoff: DateTime<Utc>) -> Result<Vec<(u32, u64)>> {
        let conn = self.get_conn()?;
        // Normalized ts is 'YYYY-MM-DDTHH:MM:SSZ'; hour is chars 12-13
        let mut rows = conn
            .query(
                "SELECT CAST(substr(ts, 12, 2) AS INTEGER) AS hour, COUNT(*) AS n
                 FROM events
                 WHERE ts >= ?
                 GROUP BY hour
                 ORDER BY n DESC",
                params![fmt_cutoff(cutoff)],
            )
            .await?;

        let mut buckets = Vec::new();
        while let Some(row) = rows.next().await? {
            let hour: i64 = row.get(0)?;
            let count: i64 = row.get(1)?;
            buckets.push((hour as u32, count as u64));
        }
        Ok(buckets)
    }

    async fn get_cursor(&self, key: &str, default_hours_ago: i64) -> Result<String> {
        let default_value =
            || (Utc::now() - Duration::hours(default_hours_ago)).to_rfc3339();

        let conn = match self.get_conn() {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Failed to read cursor {}: {}", key, e);
                return Ok(default_value());
            }
        };

        match conn
            .query("SELECT value FROM ingest_cursors WHERE key = ?", params![key])
            .await
        {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => Ok(row.get::<String>(0)?),
                Ok(None) => Ok(default_value()),
                Err(e) => {
                    warn!("Failed to read cursor {}: {}", key, e);
                    Ok(default_value())
                }
            },
            Err(e) => {
                warn!("Failed to read cursor {}: {}", key, e);
                Ok(default_value())
            }
        }
    }

    async fn set_cursor(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO ingest_cursors (key, value, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )
        .await?;
        info!("Updated cursor {} to {}", key, value);
        Ok(())
    }

    async fn journey_by_id(&self, id: &str) -> Result<Option<JourneyState>> {
        let conn = self.get_conn()?;
        let mut rows = conn
            .query(
                "SELECT id, desired_state, current_state, preferences, created_at, updated_at
                 FROM user_journey WHERE id = ?",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_journey(&row)?)),
            None => Ok(None),
        }
    }

    async fn active_journey(&self) -> Result<Option<JourneyState>> {
        let conn = self.get_conn()?;
        let mut rows = conn
            .query(
                "SELECT id, desired_state, current_state, preferences, created_at, updated_at
                 FROM user_journey
                 WHERE is_active = 1
                 ORDER BY created_at DESC
                 LIMIT 1",
                params![],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_journey(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_recommendation(
        &self,
        journey_id: Option<String>,
        context_id: &str,
        context_snapshot: &serde_json::Value,
        recommendation: &serde_json::Value,
    ) -> Result<String> {
        let conn = self.get_conn()?;
        let id = uuid::Uuid::new_v4().to_string();

        conn.execute(
            "INSERT INTO priority_recommendations
                (id, journey_id, context_id, context_snapshot, recommendations, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                id.clone(),
                journey_id,
                context_id,
                serde_json::to_string(context_snapshot)?,
                serde_json::to_string(recommendation)?,
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;

        Ok(id)
    }

    async fn update_feedback(
        &self,
        context_id: &str,
        feedback: &RecommendationFeedback,
    ) -> Result<Option<String>> {
        let conn = self.get_conn()?;
        let mut rows = conn
            .query(
                "UPDATE priority_recommendations
                 SET action_taken = ?,
                     outcome = ?,
                     feedback_score = ?,
                     time_to_complete_minutes = ?,
                     completed_at = ?
                 WHERE context_id = ?
                 RETURNING id",
                params![
                    feedback.action_taken.clone(),
                    feedback.outcome.clone(),
                    feedback.feedback_score,
                    feedback.time_to_complete_minutes,
                    Utc::now().to_rfc3339(),
                    context_id,
                ],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    async fn recent_recommendations(&self, limit: usize) -> Result<Vec<RecentRecommendation>> {
        let conn = self.get_conn()?;
        let mut rows = conn
            .query(
                "SELECT id, created_at, recommendations, action_taken, outcome, feedback_score
                 FROM priority_recommendations
                 ORDER BY created_at DESC
                 LIMIT ?",
                params![limit as i64],
            )
            .await?;

        let mut recs = Vec::new();
        while let Some(row) = rows.next().await? {
            let recommendations_json: String = row.get(2)?;
            let recommendations =
                serde_json::from_str(&recommendations_json).unwrap_or(serde_json::Value::Null);

            recs.push(RecentRecommendation {
                id: row.get(0)?,
                created_at: row.get(1)?,
                recommendations,
                action_taken: row.get(3)?,
                outcome: row.get(4)?,
                feedback_score: row.get(5)?,
            });
        }
        Ok(recs)
    }

    async fn health_check(&self) -> Result<()> {
        let conn = self.get_conn()?;
        conn.query("SELECT 1", params![])
            .await
            .map_err(|e| PulseError::Database(format!("Health check failed: {}", e)))?;
        Ok(())
    }
}
