//! SQLite-based session history and statistics.
//!
//! Provides persistent storage for:
//! - Finished study sessions (completed or exited early)
//! - Study statistics (daily and all-time) for the dashboard

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::data_dir;

/// How a recorded session finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOutcome {
    /// Reached the study target.
    Completed,
    /// Exited mid-session (a snapshot was taken).
    Exited,
}

impl SessionOutcome {
    fn as_str(self) -> &'static str {
        match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::Exited => "exited",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub outcome: String,
    /// Configured study target in seconds.
    pub study_secs: u64,
    /// Study seconds actually accumulated.
    pub elapsed_secs: u64,
    pub pages_read: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Stats {
    pub total_sessions: u64,
    pub completed_sessions: u64,
    pub total_study_min: u64,
    pub total_pages: u64,
    pub today_sessions: u64,
    pub today_study_min: u64,
}

/// SQLite database for session history.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/studyroom/studyroom.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let path = data_dir()?.join("studyroom.db");
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open a database at an explicit path (tests, alternate profiles).
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: std::path::PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                outcome      TEXT NOT NULL,
                study_secs   INTEGER NOT NULL,
                elapsed_secs INTEGER NOT NULL,
                pages_read   INTEGER NOT NULL DEFAULT 0,
                started_at   TEXT NOT NULL,
                ended_at     TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_ended_at ON sessions(ended_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_outcome ON sessions(outcome);",
        )?;
        Ok(())
    }

    /// Record a finished session.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn record_session(
        &self,
        outcome: SessionOutcome,
        study_secs: u64,
        elapsed_secs: u64,
        pages_read: u32,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO sessions (outcome, study_secs, elapsed_secs, pages_read, started_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                outcome.as_str(),
                study_secs,
                elapsed_secs,
                pages_read,
                started_at.to_rfc3339(),
                ended_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent sessions, newest first.
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, outcome, study_secs, elapsed_secs, pages_read, started_at, ended_at
             FROM sessions ORDER BY ended_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(SessionRecord {
                id: row.get(0)?,
                outcome: row.get(1)?,
                study_secs: row.get(2)?,
                elapsed_secs: row.get(3)?,
                pages_read: row.get(4)?,
                started_at: parse_utc(row.get::<_, String>(5)?),
                ended_at: parse_utc(row.get::<_, String>(6)?),
            })
        })?;
        rows.collect()
    }

    pub fn stats_today(&self) -> Result<Stats, rusqlite::Error> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        self.stats_since(Some(format!("{today}T00:00:00+00:00")))
    }

    pub fn stats_all(&self) -> Result<Stats, rusqlite::Error> {
        let mut stats = self.stats_since(None)?;

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let today_stats = self.stats_since(Some(format!("{today}T00:00:00+00:00")))?;
        stats.today_sessions = today_stats.today_sessions;
        stats.today_study_min = today_stats.today_study_min;
        Ok(stats)
    }

    fn stats_since(&self, since: Option<String>) -> Result<Stats, rusqlite::Error> {
        let (sql, args): (&str, Vec<String>) = match &since {
            Some(bound) => (
                "SELECT outcome, COUNT(*), COALESCE(SUM(elapsed_secs), 0), COALESCE(SUM(pages_read), 0)
                 FROM sessions WHERE ended_at >= ?1 GROUP BY outcome",
                vec![bound.clone()],
            ),
            None => (
                "SELECT outcome, COUNT(*), COALESCE(SUM(elapsed_secs), 0), COALESCE(SUM(pages_read), 0)
                 FROM sessions GROUP BY outcome",
                Vec::new(),
            ),
        };

        let mut stmt = self.conn.prepare(sql)?;
        let mut stats = Stats::default();
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, u64>(2)?,
                row.get::<_, u64>(3)?,
            ))
        })?;

        for row in rows {
            let (outcome, count, secs, pages) = row?;
            stats.total_sessions += count;
            stats.total_study_min += secs / 60;
            stats.total_pages += pages;
            if outcome == "completed" {
                stats.completed_sessions += count;
            }
            if since.is_some() {
                stats.today_sessions += count;
                stats.today_study_min += secs / 60;
            }
        }
        Ok(stats)
    }
}

fn parse_utc(value: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
