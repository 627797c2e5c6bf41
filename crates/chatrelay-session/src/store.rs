use crate::session::UserSession;
use async_trait::async_trait;
use chatrelay_core::{RelayError, RelayResult, UserId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// Durable per-user session persistence.
///
/// Exactly one record exists per user: `put` replaces whatever was there.
/// Every successful `put`/`clear` is durable when it returns. A missing
/// record is `Ok(None)`, never an error.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load the user's session, if one was stored.
    async fn get(&self, user_id: UserId) -> RelayResult<Option<UserSession>>;
    /// Store `session`, replacing any previous record for the same user.
    async fn put(&self, session: &UserSession) -> RelayResult<()>;
    /// Remove the record; a no-op if it does not exist.
    async fn clear(&self, user_id: UserId) -> RelayResult<()>;
}

fn store_err(context: &str, e: impl std::fmt::Display) -> RelayError {
    RelayError::Store(format!("{context}: {e}"))
}

/// File-based store: one JSON document per user.
///
/// Writes go to a temporary file that is synced and then renamed over the
/// previous document, so a reader never sees a half-written record. The
/// directory is synced after every rename and unlink so the change itself
/// survives a crash.
pub struct FileHistoryStore {
    dir: PathBuf,
}

impl FileHistoryStore {
    /// Open the store rooted at `dir`, creating it if needed.
    pub async fn new(dir: PathBuf) -> RelayResult<Self> {
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| store_err("Failed to create history directory", e))?;
        Ok(Self { dir })
    }

    fn session_path(&self, user_id: UserId) -> PathBuf {
        self.dir.join(format!("{user_id}.json"))
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn get(&self, user_id: UserId) -> RelayResult<Option<UserSession>> {
        let path = self.session_path(user_id);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(store_err("Failed to read session", e)),
        };
        let session: UserSession = serde_json::from_str(&data)
            .map_err(|e| store_err("Failed to parse session", e))?;
        Ok(Some(session))
    }

    async fn put(&self, session: &UserSession) -> RelayResult<()> {
        let path = self.session_path(session.user_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(session)?;

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| store_err("Failed to write session", e))?;
        file.write_all(&json)
            .await
            .map_err(|e| store_err("Failed to write session", e))?;
        file.sync_all()
            .await
            .map_err(|e| store_err("Failed to sync session", e))?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(store_err("Failed to replace session", e));
        }
        sync_directory(&self.dir).await
    }

    async fn clear(&self, user_id: UserId) -> RelayResult<()> {
        match tokio::fs::remove_file(self.session_path(user_id)).await {
            Ok(()) => sync_directory(&self.dir).await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(store_err("Failed to delete session", e)),
        }
    }
}

/// Flush directory metadata so a completed rename or unlink is durable.
#[cfg(unix)]
async fn sync_directory(dir: &Path) -> RelayResult<()> {
    let handle = tokio::fs::File::open(dir)
        .await
        .map_err(|e| store_err("Failed to open history directory for fsync", e))?;
    handle
        .sync_all()
        .await
        .map_err(|e| store_err("Failed to fsync history directory", e))
}

#[cfg(not(unix))]
async fn sync_directory(_dir: &Path) -> RelayResult<()> {
    Ok(())
}

/// Volatile store for tests and throwaway runs.
pub struct InMemoryHistoryStore {
    sessions: RwLock<HashMap<UserId, UserSession>>,
}

impl InMemoryHistoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is stored.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn get(&self, user_id: UserId) -> RelayResult<Option<UserSession>> {
        Ok(self.sessions.read().await.get(&user_id).cloned())
    }

    async fn put(&self, session: &UserSession) -> RelayResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.user_id, session.clone());
        Ok(())
    }

    async fn clear(&self, user_id: UserId) -> RelayResult<()> {
        self.sessions.write().await.remove(&user_id);
        Ok(())
    }
}
