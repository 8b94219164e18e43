use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;
use models::*;

/// Ordered-set storage engine the leaderboard delegates to.
///
/// Each call is atomic on its own; there are no multi-call transactions.
#[async_trait]
pub trait SortedSet: Send + Sync {
    /// Add `delta` to the score of `member` in the set `key`.
    async fn incr(
        &self,
        key: &str,
        member: &str,
        delta: f64,
        mode: IncrMode,
    ) -> Result<IncrOutcome>;

    /// Members in descending score order, skipping `offset` and returning at most `limit`.
    async fn rev_range(&self, key: &str, offset: usize, limit: usize) -> Result<Vec<ScoredMember>>;
}

/// Thread-safe SQLite connection (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }

    fn incr_blocking(
        &self,
        key: &str,
        member: &str,
        delta: f64,
        mode: IncrMode,
    ) -> Result<IncrOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let current: Option<f64> = tx
            .query_row(
                "SELECT score FROM sorted_set_members WHERE set_key=?1 AND member=?2",
                params![key, member],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match (current, mode) {
            (None, IncrMode::ExistingOnly) => IncrOutcome::Missing,
            (None, IncrMode::Upsert) => {
                tx.execute(
                    "INSERT INTO sorted_set_members (set_key, member, score) VALUES (?1,?2,?3)",
                    params![key, member, delta],
                )?;
                IncrOutcome::Created { score: delta }
            }
            (Some(score), _) => {
                let score = score + delta;
                if score.is_nan() {
                    bail!("resulting score is not a number");
                }
                tx.execute(
                    "UPDATE sorted_set_members SET score=?1 WHERE set_key=?2 AND member=?3",
                    params![score, key, member],
                )?;
                IncrOutcome::Updated { score }
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn rev_range_blocking(
        &self,
        key: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ScoredMember>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT member, score FROM sorted_set_members
             WHERE set_key=?1
             ORDER BY score DESC, member DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let members = stmt
            .query_map(params![key, limit, offset], map_scored_member)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(members)
    }
}

#[async_trait]
impl SortedSet for Database {
    async fn incr(
        &self,
        key: &str,
        member: &str,
        delta: f64,
        mode: IncrMode,
    ) -> Result<IncrOutcome> {
        self.incr_blocking(key, member, delta, mode)
    }

    async fn rev_range(&self, key: &str, offset: usize, limit: usize) -> Result<Vec<ScoredMember>> {
        self.rev_range_blocking(key, offset, limit)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn map_scored_member(row: &rusqlite::Row) -> rusqlite::Result<ScoredMember> {
    Ok(ScoredMember {
        member: row.get(0)?,
        score: row.get(1)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sorted_set_members (
    set_key TEXT NOT NULL,
    member  TEXT NOT NULL,
    score   REAL NOT NULL,
    PRIMARY KEY (set_key, member)
);

CREATE INDEX IF NOT EXISTS idx_sorted_set_rank
    ON sorted_set_members(set_key, score DESC, member DESC);
"#;
