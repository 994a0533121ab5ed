//! Storage layer for recorded mining sessions.
//!
//! Provides an append-only history of [`SessionSummary`] values using
//! `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond precision
//! (e.g., `3310-05-02T18:05:00.000Z`), so lexicographic ordering matches
//! chronological ordering.
//!
//! ## Summary Storage
//!
//! The `summary` column stores the full [`SessionSummary`] as JSON. The other
//! columns duplicate the fields needed for listing and ordering. A session is
//! identified by its `(start_time, end_time)` pair; recording the same session
//! twice is a no-op.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use ma_core::SessionSummary;
use rusqlite::{Connection, params};
use thiserror::Error;
use uuid::Uuid;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored summary could not be encoded or decoded.
    #[error("invalid summary JSON for session {session_id}: {source}")]
    SummaryJson {
        session_id: String,
        #[source]
        source: serde_json::Error,
    },
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for session {session_id}: {timestamp}")]
    TimestampParse {
        session_id: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A stored session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    pub recorded_at: DateTime<Utc>,
    /// Journal file the session was replayed from, if known.
    pub source: Option<String>,
    pub summary: SessionSummary,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- sessions: one row per finished mining session
            -- summary: JSON-encoded SessionSummary
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                recorded_at TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                duration_seconds INTEGER NOT NULL,
                location TEXT,
                system TEXT,
                total_tons INTEGER NOT NULL,
                tons_per_hour REAL,
                source TEXT,
                summary TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_span ON sessions(start_time, end_time);
            CREATE INDEX IF NOT EXISTS idx_sessions_system ON sessions(system);
            ",
        )?;
        Ok(())
    }

    /// Stores a session summary.
    ///
    /// Returns the new record, or `None` if a session with the same start and
    /// end was already stored.
    pub fn insert_session(
        &mut self,
        summary: &SessionSummary,
        source: Option<&str>,
    ) -> Result<Option<SessionRecord>, DbError> {
        let id = Uuid::new_v4().to_string();
        let recorded_at = Utc::now();
        let json = serde_json::to_string(summary).map_err(|source| DbError::SummaryJson {
            session_id: id.clone(),
            source,
        })?;

        let inserted = self.conn.execute(
            "
            INSERT OR IGNORE INTO sessions
                (id, recorded_at, start_time, end_time, duration_seconds, location, system,
                 total_tons, tons_per_hour, source, summary)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
            params![
                id,
                format_timestamp(recorded_at),
                format_timestamp(summary.start),
                format_timestamp(summary.end),
                summary.duration_seconds,
                summary.location,
                summary.system,
                summary.total_tons,
                summary.tons_per_hour,
                source,
                json,
            ],
        )?;

        if inserted == 0 {
            tracing::debug!(start = %summary.start, "session already recorded");
            return Ok(None);
        }
        tracing::debug!(%id, tons = summary.total_tons, "recorded mining session");
        Ok(Some(SessionRecord {
            id,
            recorded_at,
            source: source.map(ToString::to_string),
            summary: summary.clone(),
        }))
    }

    /// Lists all sessions ordered by start time then ID.
    pub fn list_sessions(&self) -> Result<Vec<SessionRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, recorded_at, source, summary
            FROM sessions
            ORDER BY start_time ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, recorded_at, source, summary) = row?;
            let recorded_at = parse_timestamp(&recorded_at, &id)?;
            let summary = serde_json::from_str(&summary).map_err(|source| DbError::SummaryJson {
                session_id: id.clone(),
                source,
            })?;
            sessions.push(SessionRecord {
                id,
                recorded_at,
                source,
                summary,
            });
        }
        Ok(sessions)
    }

    /// Number of stored sessions.
    pub fn session_count(&self) -> Result<usize, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn parse_timestamp(timestamp: &str, session_id: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            session_id: session_id.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{Duration, TimeZone};
    use ma_core::SessionState;

    use super::*;

    fn summary_at(start_offset: i64, tons: i64) -> SessionSummary {
        let start = Utc.with_ymd_and_hms(3310, 5, 2, 18, 0, 0).unwrap()
            + Duration::seconds(start_offset);
        let mut state = SessionState::default();
        state.mining_start = Some(start);
        state.mining_end = Some(start + Duration::seconds(1800));
        state.current_system = Some("Borann".to_string());
        state.cargo_totals.insert("platinum".to_string(), tons);
        state.cargo_additions.insert("platinum".to_string(), tons);
        SessionSummary::capture(&mut state, start)
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_has_session_columns() {
        let db = Database::open_in_memory().expect("open in-memory db");
        let mut stmt = db.conn.prepare("PRAGMA table_info(sessions)").unwrap();
        let columns: HashSet<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        for expected in ["id", "start_time", "end_time", "total_tons", "summary"] {
            assert!(columns.contains(expected), "missing column {expected}");
        }
    }

    #[test]
    fn insert_and_list_round_trip() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let later = summary_at(7200, 12);
        let earlier = summary_at(0, 30);

        let record = db
            .insert_session(&later, Some("Journal.3310-05-02T180000.01.log"))
            .expect("insert")
            .expect("new session");
        db.insert_session(&earlier, None).expect("insert");

        let sessions = db.list_sessions().expect("list sessions");
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].summary, earlier);
        assert_eq!(sessions[1].id, record.id);
        assert_eq!(
            sessions[1].source.as_deref(),
            Some("Journal.3310-05-02T180000.01.log")
        );
        assert_eq!(sessions[1].summary.total_tons, 12);
    }

    #[test]
    fn stored_session_keeps_timeline() {
        use ma_core::{SessionEvent, SessionEventKind};

        let mut db = Database::open_in_memory().expect("open in-memory db");
        let base = summary_at(0, 5);
        let summary = base.clone().with_events(vec![SessionEvent {
            timestamp: base.start,
            kind: SessionEventKind::LaunchDrone {
                drone: "prospector".to_string(),
            },
        }]);
        db.insert_session(&summary, None).expect("insert");

        let sessions = db.list_sessions().expect("list sessions");
        assert_eq!(sessions[0].summary.events, summary.events);
    }

    #[test]
    fn recording_same_session_twice_is_ignored() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let summary = summary_at(0, 5);

        assert!(db.insert_session(&summary, None).unwrap().is_some());
        assert!(db.insert_session(&summary, None).unwrap().is_none());
        assert_eq!(db.session_count().unwrap(), 1);
    }

    #[test]
    fn database_persists_on_disk() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("sessions.db");
        {
            let mut db = Database::open(&path).unwrap();
            db.insert_session(&summary_at(0, 8), None).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.session_count().unwrap(), 1);
    }

    #[test]
    fn corrupt_summary_is_reported() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let record = db
            .insert_session(&summary_at(0, 1), None)
            .unwrap()
            .unwrap();
        db.conn
            .execute("UPDATE sessions SET summary = 'nope'", [])
            .unwrap();

        let err = db.list_sessions().unwrap_err();
        assert!(
            matches!(err, DbError::SummaryJson { ref session_id, .. } if *session_id == record.id)
        );
    }
}
