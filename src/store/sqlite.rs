use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};

use super::{Checkpoint, Checkpointer};
use crate::error::{Error, Result};
use crate::turn::Turn;

/// SQLite-backed session store.
///
/// Two tables: `sessions` holds one row per session (pending step, step
/// counter, timestamps) and `turns` holds the ordered history. A save runs
/// in a single transaction so an interrupted process never leaves half a
/// step behind.
///
/// ```rust,no_run
/// use chat_line::store::{Checkpointer, SqliteStore};
///
/// # fn example() -> chat_line::Result<()> {
/// let store = SqliteStore::open("chat_history.sqlite")?;
/// for id in store.list_sessions()? {
///     println!("{id}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| Error::store(format!("open {}: {e}", path.display())))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT    PRIMARY KEY,
                pending    TEXT,
                step       INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS turns (
                session_id TEXT    NOT NULL,
                seq        INTEGER NOT NULL,
                body       TEXT    NOT NULL,
                PRIMARY KEY (session_id, seq)
            );",
        )
        .map_err(|e| Error::store(format!("create tables: {e}")))?;
        tracing::debug!(path = %path.display(), "opened session store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::store(format!("lock: {e}")))
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl Checkpointer for SqliteStore {
    fn list_sessions(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT session_id FROM sessions ORDER BY created_at ASC, rowid ASC")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn load(&self, session_id: &str) -> Result<Option<Checkpoint>> {
        let conn = self.lock()?;
        let head = conn
            .query_row(
                "SELECT pending, step FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        let Some((pending, step)) = head else {
            return Ok(None);
        };

        let mut stmt =
            conn.prepare("SELECT seq, body FROM turns WHERE session_id = ?1 ORDER BY seq ASC")?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut turns = Vec::new();
        for row in rows {
            let (seq, body) = row?;
            let turn: Turn = serde_json::from_str(&body)
                .map_err(|e| Error::store(format!("session {session_id} turn {seq}: {e}")))?;
            turns.push(turn);
        }

        Ok(Some(Checkpoint {
            turns,
            pending,
            step: step as u64,
        }))
    }

    fn save(&self, session_id: &str, checkpoint: &Checkpoint) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let bodies = {
            let mut stmt =
                tx.prepare("SELECT body FROM turns WHERE session_id = ?1 ORDER BY seq ASC")?;
            stmt.query_map(params![session_id], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        let stored = bodies.len();
        if checkpoint.turns.len() < stored {
            return Err(Error::store(format!(
                "session {session_id}: history is append-only ({stored} stored, {} given)",
                checkpoint.turns.len()
            )));
        }
        for (seq, body) in bodies.iter().enumerate() {
            let turn: Turn = serde_json::from_str(body)
                .map_err(|e| Error::store(format!("session {session_id} turn {seq}: {e}")))?;
            if turn != checkpoint.turns[seq] {
                return Err(Error::store(format!(
                    "session {session_id}: history is append-only (turn {seq} differs)"
                )));
            }
        }

        for (seq, turn) in checkpoint.turns.iter().enumerate().skip(stored) {
            let body = serde_json::to_string(turn)
                .map_err(|e| Error::store(format!("serialize turn {seq}: {e}")))?;
            tx.execute(
                "INSERT INTO turns (session_id, seq, body) VALUES (?1, ?2, ?3)",
                params![session_id, seq as i64, body],
            )?;
        }

        tx.execute(
            "INSERT INTO sessions (session_id, pending, step, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(session_id) DO UPDATE SET
                pending = excluded.pending,
                step = excluded.step,
                updated_at = excluded.updated_at",
            params![session_id, checkpoint.pending, checkpoint.step as i64, unix_now()],
        )?;

        tx.commit()?;
        Ok(())
    }
}
