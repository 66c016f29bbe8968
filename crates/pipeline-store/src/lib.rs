// crates/pipeline-store/src/lib.rs
// ============================================================================
// Crate: pipeline-store
// Description: Execution Store (C1): durable execution records with
//              compare-and-swap status transitions.
// Purpose: Give the orchestrator one durable source of truth for execution
//          state, backed by SQLite WAL, without requiring callers to touch
//          SQL directly.
// ============================================================================

//! ## Overview
//! [`ExecutionStore`] is the trait the orchestrator depends on;
//! [`SqliteExecutionStore`] is the sole implementation, backed by a
//! `SQLite` database opened in WAL mode. Every method hands its blocking
//! `rusqlite` call to [`tokio::task::spawn_blocking`] so the store never
//! blocks the async runtime driving event handlers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use pipeline_core::execution::Execution;
use pipeline_core::execution::ExecutionRequest;
use pipeline_core::execution::ExecutionStatus;
use pipeline_core::identifiers::ExecutionId;
use pipeline_core::time::Timestamp;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors returned by an [`ExecutionStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// No execution exists with the given identifier.
    #[error("execution {0} not found")]
    NotFound(ExecutionId),
    /// A status transition was attempted on an execution already in a
    /// terminal status.
    #[error("execution {0} is already in a terminal status and cannot transition")]
    AlreadyTerminal(ExecutionId),
    /// The underlying database reported an error.
    #[error("database error: {0}")]
    Database(String),
    /// A blocking database task could not be joined.
    #[error("database task failed: {0}")]
    TaskFailed(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Durable storage for [`Execution`] records.
///
/// # Invariants
/// - `update_status` never overwrites a record already in a terminal
///   status; see [`StoreError::AlreadyTerminal`].
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Creates a new execution row in the `pending` status.
    async fn create(&self, request: ExecutionRequest, requested_at: Timestamp) -> Result<Execution, StoreError>;

    /// Fetches an execution by identifier.
    async fn get(&self, execution_id: &ExecutionId) -> Result<Execution, StoreError>;

    /// Transitions an execution to `status`, recording `at` and, for a
    /// transition to `failed`, `error_message`.
    ///
    /// Returns [`StoreError::AlreadyTerminal`] when the current status is
    /// already terminal.
    async fn update_status(
        &self,
        execution_id: &ExecutionId,
        status: ExecutionStatus,
        at: Timestamp,
        error_message: Option<String>,
    ) -> Result<Execution, StoreError>;

    /// Increments `iteration_count` by one and returns the updated record.
    async fn increment_iteration(&self, execution_id: &ExecutionId) -> Result<Execution, StoreError>;
}

// ============================================================================
// SECTION: SQLite Implementation
// ============================================================================

/// `SQLite`-backed [`ExecutionStore`].
///
/// Holds its connection behind a blocking [`Mutex`] rather than a
/// connection pool: the orchestrator issues one execution-store call at a
/// time per execution, so a single connection is sufficient and keeps the
/// schema and pragma setup in one place.
pub struct SqliteExecutionStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteExecutionStore {
    /// Opens (and, if needed, creates) the database at `path` and applies
    /// the execution schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let connection = Connection::open(path)?;
        connection.pragma_update(None, "journal_mode", "WAL")?;
        apply_schema(&connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    /// Opens an in-memory database, primarily for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory()?;
        apply_schema(&connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    /// Runs `f` against the guarded connection on a blocking thread.
    async fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let guard = connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            f(&guard)
        })
        .await
        .map_err(|err| StoreError::TaskFailed(err.to_string()))?
    }
}

/// Applies the execution table schema, idempotently.
fn apply_schema(connection: &Connection) -> Result<(), StoreError> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS executions (
            execution_id TEXT PRIMARY KEY,
            repository_url TEXT NOT NULL,
            target_branch TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            status TEXT NOT NULL,
            iteration_count INTEGER NOT NULL,
            requested_by TEXT NOT NULL,
            requested_at INTEGER NOT NULL,
            started_at INTEGER,
            completed_at INTEGER,
            error_message TEXT
        );",
    )?;
    Ok(())
}

/// Reads one row into an [`Execution`], given its execution id is the
/// query's only parameter.
fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<Execution> {
    let status: String = row.get("status")?;
    Ok(Execution {
        execution_id: ExecutionId::new(row.get::<_, String>("execution_id")?),
        repository_url: row.get("repository_url")?,
        target_branch: row.get("target_branch")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: status_from_str(&status),
        iteration_count: row.get("iteration_count")?,
        requested_by: row.get("requested_by")?,
        requested_at: Timestamp::from_unix_millis(row.get("requested_at")?),
        started_at: row.get::<_, Option<i64>>("started_at")?.map(Timestamp::from_unix_millis),
        completed_at: row.get::<_, Option<i64>>("completed_at")?.map(Timestamp::from_unix_millis),
        error_message: row.get("error_message")?,
    })
}

/// Serializes a status to its stored string form.
const fn status_to_str(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Pending => "pending",
        ExecutionStatus::Running => "running",
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::Failed => "failed",
        ExecutionStatus::Aborted => "aborted",
    }
}

/// Deserializes a status from its stored string form, defaulting to
/// `pending` for an unrecognized value rather than panicking on read.
fn status_from_str(value: &str) -> ExecutionStatus {
    match value {
        "running" => ExecutionStatus::Running,
        "completed" => ExecutionStatus::Completed,
        "failed" => ExecutionStatus::Failed,
        "aborted" => ExecutionStatus::Aborted,
        _ => ExecutionStatus::Pending,
    }
}

fn fetch_execution(connection: &Connection, execution_id: &ExecutionId) -> Result<Execution, StoreError> {
    connection
        .query_row(
            "SELECT * FROM executions WHERE execution_id = ?1",
            params![execution_id.as_str()],
            row_to_execution,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(execution_id.clone()))
}

#[async_trait]
impl ExecutionStore for SqliteExecutionStore {
    async fn create(&self, request: ExecutionRequest, requested_at: Timestamp) -> Result<Execution, StoreError> {
        let execution = Execution::new(request, requested_at);
        let to_insert = execution.clone();
        self.with_connection(move |connection| {
            connection.execute(
                "INSERT INTO executions (
                    execution_id, repository_url, target_branch, title, description,
                    status, iteration_count, requested_by, requested_at, started_at,
                    completed_at, error_message
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    to_insert.execution_id.as_str(),
                    to_insert.repository_url,
                    to_insert.target_branch,
                    to_insert.title,
                    to_insert.description,
                    status_to_str(to_insert.status),
                    to_insert.iteration_count,
                    to_insert.requested_by,
                    to_insert.requested_at.as_unix_millis(),
                    to_insert.started_at.map(Timestamp::as_unix_millis),
                    to_insert.completed_at.map(Timestamp::as_unix_millis),
                    to_insert.error_message,
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(execution)
    }

    async fn get(&self, execution_id: &ExecutionId) -> Result<Execution, StoreError> {
        let execution_id = execution_id.clone();
        self.with_connection(move |connection| fetch_execution(connection, &execution_id)).await
    }

    async fn update_status(
        &self,
        execution_id: &ExecutionId,
        status: ExecutionStatus,
        at: Timestamp,
        error_message: Option<String>,
    ) -> Result<Execution, StoreError> {
        let execution_id = execution_id.clone();
        self.with_connection(move |connection| {
            let current = fetch_execution(connection, &execution_id)?;
            if current.status.is_terminal() {
                return Err(StoreError::AlreadyTerminal(execution_id));
            }

            let started_at = if current.started_at.is_none() && status == ExecutionStatus::Running {
                Some(at)
            } else {
                current.started_at
            };
            let completed_at = if status.is_terminal() { Some(at) } else { current.completed_at };

            connection.execute(
                "UPDATE executions SET status = ?1, started_at = ?2, completed_at = ?3, error_message = ?4
                 WHERE execution_id = ?5",
                params![
                    status_to_str(status),
                    started_at.map(Timestamp::as_unix_millis),
                    completed_at.map(Timestamp::as_unix_millis),
                    error_message,
                    execution_id.as_str(),
                ],
            )?;
            fetch_execution(connection, &execution_id)
        })
        .await
    }

    async fn increment_iteration(&self, execution_id: &ExecutionId) -> Result<Execution, StoreError> {
        let execution_id = execution_id.clone();
        self.with_connection(move |connection| {
            let current = fetch_execution(connection, &execution_id)?;
            if current.status.is_terminal() {
                return Err(StoreError::AlreadyTerminal(execution_id));
            }
            connection.execute(
                "UPDATE executions SET iteration_count = iteration_count + 1 WHERE execution_id = ?1",
                params![execution_id.as_str()],
            )?;
            fetch_execution(connection, &execution_id)
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions read more clearly than propagating Result")]
mod tests {
    use pipeline_core::identifiers::ExecutionId;

    use super::*;

    fn sample_request() -> ExecutionRequest {
        ExecutionRequest {
            execution_id: ExecutionId::new("e1"),
            repository_url: "https://example.com/acme/widgets.git".to_string(),
            target_branch: "main".to_string(),
            title: "add retry logic".to_string(),
            description: "add retry logic to the upload client".to_string(),
            requested_by: "alice".to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = SqliteExecutionStore::open_in_memory().unwrap();
        let created = store.create(sample_request(), Timestamp::from_unix_millis(0)).await.unwrap();
        let fetched = store.get(&created.execution_id).await.unwrap();
        assert_eq!(created, fetched);
        assert_eq!(fetched.status, ExecutionStatus::Pending);
    }

    #[tokio::test]
    async fn update_status_sets_started_at_on_first_running_transition() {
        let store = SqliteExecutionStore::open_in_memory().unwrap();
        let created = store.create(sample_request(), Timestamp::from_unix_millis(0)).await.unwrap();
        let running = store
            .update_status(&created.execution_id, ExecutionStatus::Running, Timestamp::from_unix_millis(10), None)
            .await
            .unwrap();
        assert_eq!(running.started_at, Some(Timestamp::from_unix_millis(10)));
    }

    #[tokio::test]
    async fn terminal_status_rejects_further_transitions() {
        let store = SqliteExecutionStore::open_in_memory().unwrap();
        let created = store.create(sample_request(), Timestamp::from_unix_millis(0)).await.unwrap();
        store
            .update_status(&created.execution_id, ExecutionStatus::Completed, Timestamp::from_unix_millis(20), None)
            .await
            .unwrap();
        let result = store
            .update_status(&created.execution_id, ExecutionStatus::Failed, Timestamp::from_unix_millis(30), None)
            .await;
        assert!(matches!(result, Err(StoreError::AlreadyTerminal(_))));
    }

    #[tokio::test]
    async fn increment_iteration_increases_count() {
        let store = SqliteExecutionStore::open_in_memory().unwrap();
        let created = store.create(sample_request(), Timestamp::from_unix_millis(0)).await.unwrap();
        let updated = store.increment_iteration(&created.execution_id).await.unwrap();
        assert_eq!(updated.iteration_count, 1);
    }

    #[tokio::test]
    async fn get_missing_execution_returns_not_found() {
        let store = SqliteExecutionStore::open_in_memory().unwrap();
        let result = store.get(&ExecutionId::new("missing")).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
