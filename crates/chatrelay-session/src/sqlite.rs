//! SQLite-backed history store.
//!
//! One row per user in `user_history`. Writes are `INSERT OR REPLACE`
//! statements with `synchronous = FULL`, so a committed row survives a crash
//! immediately after the call returns.
//!
//! Databases written by the earlier Python bot share the table name but lack
//! `updated_at` and store history as `User:`/`AI:` delimited text. The column
//! is added on open; delimited history is discarded with a warning and the
//! role is kept.

use crate::session::UserSession;
use crate::store::HistoryStore;
use crate::transcript::Transcript;
use async_trait::async_trait;
use chatrelay_core::{RelayError, RelayResult, UserId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS user_history (
        user_id INTEGER PRIMARY KEY,
        role TEXT NOT NULL,
        history TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
"#;

/// Bring a legacy three-column table up to the current schema.
fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(user_history)")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if !columns.iter().any(|c| c == "updated_at") {
        conn.execute_batch("ALTER TABLE user_history ADD COLUMN updated_at TEXT")?;
        info!("Added updated_at column to legacy user_history table");
    }
    Ok(())
}

/// Decode the `history` column. Anything that is not a JSON array was
/// written by the legacy bot and cannot be split back into turns reliably.
fn decode_history(user_id: UserId, raw: &str) -> RelayResult<Transcript> {
    let trimmed = raw.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('[') {
        return Transcript::from_json(raw);
    }
    warn!(user_id = %user_id, len = raw.len(), "Discarding legacy delimited history");
    Ok(Transcript::new())
}

/// SQLite history store sharing one connection across tasks.
///
/// Statements run on the blocking pool; the connection mutex is held only for
/// the duration of a single statement.
#[derive(Clone)]
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistoryStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> RelayResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| RelayError::Store(format!("Failed to create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path).map_err(sql_err)?;
        Self::init(conn)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> RelayResult<Self> {
        let conn = Connection::open_in_memory().map_err(sql_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> RelayResult<Self> {
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(sql_err)?;
        conn.execute_batch(SCHEMA).map_err(sql_err)?;
        migrate(&conn).map_err(sql_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> RelayResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| RelayError::Store(format!("Store task failed: {e}")))?
        .map_err(sql_err)
    }
}

fn sql_err(e: rusqlite::Error) -> RelayError {
    RelayError::Store(format!("SQLite error: {e}"))
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn get(&self, user_id: UserId) -> RelayResult<Option<UserSession>> {
        let row = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT role, history, updated_at FROM user_history WHERE user_id = ?1",
                    params![user_id.as_i64()],
                    |row| {
                        Ok((
                            row.get::<_, Option<String>>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, Option<String>>(2)?,
                        ))
                    },
                )
                .optional()
            })
            .await?;

        let Some((role, history, updated_at)) = row else {
            return Ok(None);
        };

        // Legacy rows have no timestamp; the epoch marks them as never updated.
        let updated_at = match updated_at {
            Some(ts) => DateTime::parse_from_rfc3339(&ts)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| RelayError::Store(format!("Bad timestamp for user {user_id}: {e}")))?,
            None => DateTime::<Utc>::default(),
        };

        Ok(Some(UserSession {
            user_id,
            role: role.unwrap_or_default(),
            transcript: decode_history(user_id, history.as_deref().unwrap_or_default())?,
            updated_at,
        }))
    }

    async fn put(&self, session: &UserSession) -> RelayResult<()> {
        let user_id = session.user_id.as_i64();
        let role = session.role.clone();
        let history = session.transcript.to_json()?;
        let updated_at = session.updated_at.to_rfc3339();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO user_history (user_id, role, history, updated_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![user_id, role, history, updated_at],
            )
        })
        .await?;
        Ok(())
    }

    async fn clear(&self, user_id: UserId) -> RelayResult<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM user_history WHERE user_id = ?1",
                params![user_id.as_i64()],
            )
        })
        .await?;
        Ok(())
    }
}
