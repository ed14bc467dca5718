//! Database connection and query operations.

use crate::{migrations, QueuedHit, SessionProperties, StateEntry, StoreResult};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, trace};

/// Database wrapper with query methods.
///
/// The connection is serialized behind a mutex so the store can be shared
/// between the hit processor task and response callbacks.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open a database at the given path, running migrations if needed.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode and performance optimizations
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("lock poisoned")
    }

    // ==========================================
    // Queued hits
    // ==========================================

    /// Append a hit to the tail of the queue. Durable before returning.
    pub fn enqueue_hit(&self, uid: &str, payload: &[u8]) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO queued_hits (uid, created_at, payload) VALUES (?1, ?2, ?3)",
            params![uid, now, payload],
        )?;
        debug!(uid, bytes = payload.len(), "Enqueued hit");
        Ok(())
    }

    /// Return the hit at the head of the queue without removing it.
    pub fn peek_hit(&self) -> StoreResult<Option<QueuedHit>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, uid, created_at, payload FROM queued_hits ORDER BY id ASC LIMIT 1",
        )?;

        let result = stmt.query_row([], |row| {
            Ok(QueuedHit {
                id: row.get(0)?,
                uid: row.get(1)?,
                created_at: parse_datetime(row.get::<_, String>(2)?),
                payload: row.get(3)?,
            })
        });

        match result {
            Ok(hit) => Ok(Some(hit)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a hit by uid. Returns true when a row was deleted.
    pub fn remove_hit(&self, uid: &str) -> StoreResult<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM queued_hits WHERE uid = ?1", params![uid])?;
        Ok(removed > 0)
    }

    /// Remove every queued hit. Returns the number of rows deleted.
    pub fn clear_hits(&self) -> StoreResult<usize> {
        let removed = self.conn().execute("DELETE FROM queued_hits", [])?;
        if removed > 0 {
            debug!(count = removed, "Cleared hit queue");
        }
        Ok(removed)
    }

    /// Number of hits currently queued.
    pub fn hit_count(&self) -> StoreResult<usize> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM queued_hits", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ==========================================
    // Client state entries
    // ==========================================

    /// Save entries, merging by key. An entry with `max_age_seconds <= 0`
    /// deletes its key instead of being stored.
    pub fn save_state_entries(&self, entries: &[StateEntry]) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let conn = self.conn();
        for entry in entries {
            if entry.max_age_seconds <= 0 {
                conn.execute(
                    "DELETE FROM state_entries WHERE key = ?1",
                    params![entry.key],
                )?;
                trace!(key = %entry.key, "Deleted state entry (non-positive max age)");
                continue;
            }

            let expires_at = now + Duration::seconds(entry.max_age_seconds);
            conn.execute(
                "INSERT INTO state_entries (key, value, max_age_seconds, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     max_age_seconds = excluded.max_age_seconds,
                     expires_at = excluded.expires_at",
                params![
                    entry.key,
                    entry.value,
                    entry.max_age_seconds,
                    expires_at.to_rfc3339()
                ],
            )?;
        }
        Ok(())
    }

    /// Read all unexpired state entries. Expired rows are evicted lazily
    /// here and are never returned.
    pub fn active_state_entries(&self) -> StoreResult<Vec<StateEntry>> {
        let now = Utc::now();
        let conn = self.conn();

        let mut stmt = conn.prepare(
            "SELECT key, value, max_age_seconds, expires_at FROM state_entries ORDER BY key ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StateEntry {
                key: row.get(0)?,
                value: row.get(1)?,
                max_age_seconds: row.get(2)?,
                expires_at: Some(parse_datetime(row.get::<_, String>(3)?)),
            })
        })?;

        let mut active = Vec::new();
        let mut expired: Vec<String> = Vec::new();
        for row in rows {
            let entry = row?;
            if entry.is_expired(now) {
                expired.push(entry.key);
            } else {
                active.push(entry);
            }
        }

        for key in &expired {
            conn.execute("DELETE FROM state_entries WHERE key = ?1", params![key])?;
        }
        if !expired.is_empty() {
            trace!(count = expired.len(), "Evicted expired state entries");
        }

        Ok(active)
    }

    /// Remove all state entries. Safe to call when nothing is stored.
    pub fn clear_state_entries(&self) -> StoreResult<()> {
        self.conn().execute("DELETE FROM state_entries", [])?;
        Ok(())
    }

    // ==========================================
    // Session properties
    // ==========================================

    /// Load the persisted session properties, defaulting when unset.
    pub fn session_properties(&self) -> StoreResult<SessionProperties> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT location_hint, hint_expires_at FROM session_properties WHERE id = 1",
        )?;

        let result = stmt.query_row([], |row| {
            Ok(SessionProperties {
                location_hint: row.get(0)?,
                hint_expires_at: row
                    .get::<_, Option<String>>(1)?
                    .map(parse_datetime),
            })
        });

        match result {
            Ok(props) => Ok(props),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(SessionProperties::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the session properties, replacing the previous values.
    pub fn save_session_properties(&self, props: &SessionProperties) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO session_properties (id, location_hint, hint_expires_at)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                 location_hint = excluded.location_hint,
                 hint_expires_at = excluded.hint_expires_at",
            params![
                props.location_hint,
                props.hint_expires_at.map(|t| t.to_rfc3339())
            ],
        )?;
        Ok(())
    }
}

/// Parse an RFC 3339 timestamp, falling back to now on malformed data.
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
