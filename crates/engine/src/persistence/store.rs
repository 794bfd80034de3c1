//! ExecutionStore trait definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{InvalidTransition, Transition, Workflow, WorkflowExecution, WorkflowLog};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Execution not found
    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    /// The requested state change is not legal from the current state
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Durable storage for workflows, executions and their log rows
///
/// The store is the only state shared between executions and the only
/// state that survives a restart. Implementations must be thread-safe;
/// updates are per-execution and need no cross-execution locking.
#[async_trait]
pub trait ExecutionStore: Send + Sync + 'static {
    // =========================================================================
    // Workflow Definitions
    // =========================================================================

    /// Load a workflow with its steps ordered by sort key
    async fn get_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>, StoreError>;

    /// Active workflows whose trigger label matches
    async fn find_active_workflows(&self, trigger: &str) -> Result<Vec<Workflow>, StoreError>;

    // =========================================================================
    // Executions
    // =========================================================================

    /// Persist a newly created execution
    async fn create_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError>;

    /// Point lookup of an execution
    async fn get_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<WorkflowExecution>, StoreError>;

    /// Apply a state change
    ///
    /// The change is validated against the stored row (see
    /// [`WorkflowExecution::apply`]) and rejected with
    /// [`StoreError::InvalidTransition`] if illegal. Returns the updated
    /// execution.
    async fn transition(
        &self,
        execution_id: Uuid,
        transition: Transition,
    ) -> Result<WorkflowExecution, StoreError>;

    /// Claim paused executions whose `resume_at <= now`
    ///
    /// Claimed executions are flipped to running atomically, so two
    /// schedulers never resume the same execution. At most `limit` rows
    /// are claimed, earliest `resume_at` first.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WorkflowExecution>, StoreError>;

    // =========================================================================
    // Log Rows
    // =========================================================================

    /// Append a log row
    async fn append_log(&self, log: &WorkflowLog) -> Result<(), StoreError>;

    /// Log rows for an execution, oldest first
    async fn list_logs(&self, execution_id: Uuid) -> Result<Vec<WorkflowLog>, StoreError>;
}
