//! # Checkpoint Store
//!
//! Session-keyed persistence for workflow runs. A checkpoint is written after
//! every step so an interrupted or failed run can be resumed from the step
//! that did not complete.
//!
//! Backends implement `StoreBackend`; `CheckpointStore` is the handle the
//! workflow holds.

use crate::error::{self, Result};
use crate::state::WorkflowState;
use crate::step::Step;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

// ═══════════════════════════════════════════════════════════════════════════════
// Checkpoint
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, no step executed yet
    Pending,
    /// A stream is driving the run
    Running,
    /// Terminal reached
    Completed,
    /// A step failed; resumable
    Failed,
    /// Stopped by the caller; resumable
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything persisted for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: String,
    pub state: WorkflowState,
    /// Step to run next
    pub next: Step,
    /// Steps executed so far, Terminal included once reached
    pub history: Vec<Step>,
    pub status: RunStatus,
    pub last_error: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Checkpoint {
    /// A fresh run with a generated session id
    pub fn new(state: WorkflowState) -> Self {
        Self::with_id(Self::generate_id(), state)
    }

    pub fn with_id(session_id: impl Into<String>, state: WorkflowState) -> Self {
        let now = current_timestamp();
        Self {
            session_id: session_id.into(),
            state,
            next: Step::INITIAL,
            history: Vec::new(),
            status: RunStatus::Pending,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Update the modification time
    pub fn touch(&mut self) {
        self.updated_at = current_timestamp();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Backend trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Storage backend for checkpoints
pub trait StoreBackend: Send + Sync {
    /// Insert or replace the checkpoint for its session
    fn put(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Load a checkpoint; `StateNotFound` if the session is unknown
    fn get(&self, session_id: &str) -> Result<Checkpoint>;

    /// All session ids, sorted
    fn list(&self) -> Result<Vec<String>>;

    /// Remove a session; unknown ids are not an error
    fn delete(&self, session_id: &str) -> Result<()>;

    fn exists(&self, session_id: &str) -> bool {
        self.get(session_id).is_ok()
    }

    fn backend_name(&self) -> &'static str;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Memory backend
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory backend (volatile, useful for tests and one-shot runs)
#[derive(Default)]
pub struct MemoryBackend {
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for MemoryBackend {
    fn put(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut checkpoints = self
            .checkpoints
            .write()
            .map_err(|_| error::storage_failed("checkpoint map lock poisoned"))?;
        checkpoints.insert(checkpoint.session_id.clone(), checkpoint.clone());
        Ok(())
    }

    fn get(&self, session_id: &str) -> Result<Checkpoint> {
        let checkpoints = self
            .checkpoints
            .read()
            .map_err(|_| error::storage_failed("checkpoint map lock poisoned"))?;
        checkpoints
            .get(session_id)
            .cloned()
            .ok_or_else(|| error::state_not_found(session_id))
    }

    fn list(&self) -> Result<Vec<String>> {
        let checkpoints = self
            .checkpoints
            .read()
            .map_err(|_| error::storage_failed("checkpoint map lock poisoned"))?;
        let mut ids: Vec<String> = checkpoints.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn delete(&self, session_id: &str) -> Result<()> {
        let mut checkpoints = self
            .checkpoints
            .write()
            .map_err(|_| error::storage_failed("checkpoint map lock poisoned"))?;
        checkpoints.remove(session_id);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// File backend
// ═══════════════════════════════════════════════════════════════════════════════

/// One pretty-printed JSON file per session
///
/// Directory structure:
/// ```text
/// base_path/
///   {session_id}.json
/// ```
pub struct FileBackend {
    base_path: PathBuf,
}

impl FileBackend {
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path).map_err(|e| {
            error::io_error(format!("Failed to create checkpoint dir {}: {}", base_path.display(), e))
        })?;
        Ok(Self { base_path })
    }

    fn checkpoint_path(&self, session_id: &str) -> PathBuf {
        // Sanitize id for use as filename
        let safe_id = session_id.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|', '.'], "_");
        self.base_path.join(format!("{}.json", safe_id))
    }
}

impl StoreBackend for FileBackend {
    fn put(&self, checkpoint: &Checkpoint) -> Result<()> {
        let path = self.checkpoint_path(&checkpoint.session_id);
        let content = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| error::serialization_error(e.to_string()))?;
        std::fs::write(&path, content)
            .map_err(|e| error::io_error(format!("Failed to write {}: {}", path.display(), e)))
    }

    fn get(&self, session_id: &str) -> Result<Checkpoint> {
        let path = self.checkpoint_path(session_id);
        if !path.exists() {
            return Err(error::state_not_found(session_id));
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| error::io_error(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content).map_err(|e| {
            error::serialization_error(format!("Corrupt checkpoint {}: {}", path.display(), e))
        })
    }

    fn list(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.base_path).map_err(|e| {
            error::io_error(format!("Failed to read {}: {}", self.base_path.display(), e))
        })?;

        let mut ids: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn delete(&self, session_id: &str) -> Result<()> {
        let path = self.checkpoint_path(session_id);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| error::io_error(format!("Failed to delete {}: {}", path.display(), e)))?;
        }
        Ok(())
    }

    fn exists(&self, session_id: &str) -> bool {
        self.checkpoint_path(session_id).exists()
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SQLite backend
// ═══════════════════════════════════════════════════════════════════════════════

/// Default database file
pub const DEFAULT_CHECKPOINT_DB: &str = "checkpoints.db";

/// SQLite-backed store. Persistent across process restarts.
///
/// The checkpoint is stored as JSON in `payload`; `status` and `updated_at`
/// are duplicated into columns for inspection with plain SQL.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) the database and ensure the table exists
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            error::storage_failed(format!("Failed to open {}: {}", path.display(), e)).set_source(e)
        })?;
        Self::with_connection(conn)
    }

    /// Database living only as long as this backend
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| error::storage_failed(e.to_string()).set_source(e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                session_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                status TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| error::storage_failed(format!("Failed to create table: {}", e)).set_source(e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| error::storage_failed("sqlite connection lock poisoned"))
    }
}

impl StoreBackend for SqliteBackend {
    fn put(&self, checkpoint: &Checkpoint) -> Result<()> {
        let payload = serde_json::to_string(checkpoint)
            .map_err(|e| error::serialization_error(e.to_string()))?;
        self.conn()?
            .execute(
                r#"
                INSERT OR REPLACE INTO checkpoints (session_id, payload, status, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    checkpoint.session_id,
                    payload,
                    checkpoint.status.as_str(),
                    checkpoint.updated_at as i64
                ],
            )
            .map_err(|e| error::storage_failed(e.to_string()).set_source(e))?;
        Ok(())
    }

    fn get(&self, session_id: &str) -> Result<Checkpoint> {
        let payload: Option<String> = self
            .conn()?
            .query_row(
                "SELECT payload FROM checkpoints WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| error::storage_failed(e.to_string()).set_source(e))?;

        let payload = payload.ok_or_else(|| error::state_not_found(session_id))?;
        serde_json::from_str(&payload).map_err(|e| {
            error::serialization_error(format!("Corrupt checkpoint '{}': {}", session_id, e))
        })
    }

    fn list(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT session_id FROM checkpoints ORDER BY session_id")
            .map_err(|e| error::storage_failed(e.to_string()).set_source(e))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
            .map_err(|e| error::storage_failed(e.to_string()).set_source(e))?;
        Ok(ids)
    }

    fn delete(&self, session_id: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM checkpoints WHERE session_id = ?1", params![session_id])
            .map_err(|e| error::storage_failed(e.to_string()).set_source(e))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store handle
// ═══════════════════════════════════════════════════════════════════════════════

/// Checkpoint store with a pluggable backend
pub struct CheckpointStore {
    backend: Box<dyn StoreBackend>,
}

impl CheckpointStore {
    pub fn with_backend(backend: impl StoreBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    pub fn in_memory() -> Self {
        Self::with_backend(MemoryBackend::new())
    }

    pub fn file(base_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_backend(FileBackend::new(base_path)?))
    }

    pub fn sqlite(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_backend(SqliteBackend::new(path)?))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Persist `checkpoint`, refreshing its modification time
    pub fn save(&self, checkpoint: &mut Checkpoint) -> Result<()> {
        checkpoint.touch();
        self.backend
            .put(checkpoint)
            .map_err(|e| e.with_operation("store::save"))
    }

    pub fn load(&self, session_id: &str) -> Result<Checkpoint> {
        self.backend
            .get(session_id)
            .map_err(|e| e.with_operation("store::load"))
    }

    pub fn list(&self) -> Result<Vec<String>> {
        self.backend.list()
    }

    pub fn delete(&self, session_id: &str) -> Result<()> {
        self.backend.delete(session_id)
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.backend.exists(session_id)
    }
}

fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::state::StateUpdate;

    fn sample(task: &str) -> Checkpoint {
        let mut checkpoint = Checkpoint::new(WorkflowState::new(task, 1));
        checkpoint.state.merge(&StateUpdate::plan("outline")).unwrap();
        checkpoint.history.push(Step::Plan);
        checkpoint.next = Step::ResearchPlan;
        checkpoint
    }

    /// Behavior every backend must share
    fn exercise(backend: &dyn StoreBackend) {
        let a = sample("topic a");
        let mut b = sample("topic b");
        b.status = RunStatus::Failed;
        b.last_error = Some("EndpointUnavailable".into());

        backend.put(&a).unwrap();
        backend.put(&b).unwrap();

        assert_eq!(backend.get(&a.session_id).unwrap(), a);
        assert_eq!(backend.get(&b.session_id).unwrap(), b);
        assert!(backend.exists(&a.session_id));

        let mut expected = vec![a.session_id.clone(), b.session_id.clone()];
        expected.sort();
        assert_eq!(backend.list().unwrap(), expected);

        // Overwrite keeps a single record per session
        let mut a2 = a.clone();
        a2.next = Step::Generate;
        a2.state.merge(&StateUpdate::research(vec!["snippet".into()])).unwrap();
        backend.put(&a2).unwrap();
        assert_eq!(backend.get(&a.session_id).unwrap().state.content, vec!["snippet"]);
        assert_eq!(backend.get(&b.session_id).unwrap().state.content, Vec::<String>::new());
        assert_eq!(backend.list().unwrap().len(), 2);

        backend.delete(&a.session_id).unwrap();
        let err = backend.get(&a.session_id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateNotFound);
        assert!(!backend.exists(&a.session_id));
        backend.delete("never-existed").unwrap();
    }

    #[test]
    fn test_checkpoint_new() {
        let checkpoint = Checkpoint::new(WorkflowState::new("topic", 2));
        assert_eq!(checkpoint.next, Step::Plan);
        assert_eq!(checkpoint.status, RunStatus::Pending);
        assert!(checkpoint.history.is_empty());
        assert_eq!(checkpoint.session_id.len(), 36);
        assert_ne!(Checkpoint::generate_id(), Checkpoint::generate_id());
    }

    #[test]
    fn test_memory_backend() {
        exercise(&MemoryBackend::new());
    }

    #[test]
    fn test_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("sessions")).unwrap();
        exercise(&backend);
        assert_eq!(backend.backend_name(), "file");
    }

    #[test]
    fn test_sqlite_backend() {
        exercise(&SqliteBackend::in_memory().unwrap());
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CHECKPOINT_DB);

        let checkpoint = sample("durable");
        {
            let store = CheckpointStore::sqlite(&path).unwrap();
            let mut checkpoint = checkpoint.clone();
            store.save(&mut checkpoint).unwrap();
        }

        let store = CheckpointStore::sqlite(&path).unwrap();
        assert_eq!(store.backend_name(), "sqlite");
        let loaded = store.load(&checkpoint.session_id).unwrap();
        assert_eq!(loaded.state.task, "durable");
        assert_eq!(loaded.next, Step::ResearchPlan);
    }

    #[test]
    fn test_store_load_missing_has_operation() {
        let store = CheckpointStore::in_memory();
        let err = store.load("nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateNotFound);
        assert_eq!(err.operation(), "store::load");
    }

    #[test]
    fn test_corrupt_file_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let err = backend.get("broken").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SerializationFailed);
    }
}
