//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database.
//! The engine calls store methods — it never executes SQL directly.
//!
//! The store is a durability aid, not a transaction boundary: the
//! in-memory collections stay authoritative, and the engine treats a
//! failed save as logged-but-non-fatal.

use crate::error::EngineResult;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

pub const KIND_ACCOUNTS: &str = "accounts";
pub const KIND_ORDERS: &str = "orders";
pub const KIND_PRODUCTS: &str = "products";

pub struct SnapshotStore {
    conn: Connection,
}

impl SnapshotStore {
    /// Open (or create) the engine database at `path`.
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Apply the schema.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS snapshot (
                 kind     TEXT PRIMARY KEY,
                 body     TEXT NOT NULL,
                 saved_at TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS event_log (
                 id          INTEGER PRIMARY KEY AUTOINCREMENT,
                 event_type  TEXT NOT NULL,
                 payload     TEXT NOT NULL,
                 recorded_at TEXT NOT NULL
             );",
        )?;
        Ok(())
    }

    // ── Snapshot ───────────────────────────────────────────────

    /// Upsert the JSON snapshot of one entity collection.
    pub fn save_snapshot(
        &self,
        kind: &str,
        body: &str,
        saved_at: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO snapshot (kind, body, saved_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(kind) DO UPDATE SET body = ?2, saved_at = ?3",
            params![kind, body, saved_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn load_snapshot(&self, kind: &str) -> EngineResult<Option<String>> {
        let body = self
            .conn
            .query_row(
                "SELECT body FROM snapshot WHERE kind = ?1",
                params![kind],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(body)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(
        &self,
        event_type: &str,
        payload: &str,
        recorded_at: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (event_type, payload, recorded_at) VALUES (?1, ?2, ?3)",
            params![event_type, payload, recorded_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn event_count(&self, event_type: &str) -> EngineResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
            params![event_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn events_of_type(&self, event_type: &str) -> EngineResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM event_log WHERE event_type = ?1 ORDER BY id ASC",
        )?;
        let payloads = stmt
            .query_map(params![event_type], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(payloads)
    }
}
