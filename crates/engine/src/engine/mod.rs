//! Execution engine
//!
//! [`ExecutionRunner`] drives workflow executions step by step. It is the
//! only component that writes execution progress; the scheduler hands
//! suspended executions back to it once they are due.

mod runner;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collaborators::CollaboratorError;
use crate::persistence::StoreError;

pub use runner::ExecutionRunner;

/// How a call to [`ExecutionRunner::run`] ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// All steps ran, or a branch short-circuited the run
    Completed,

    /// A step failed; the execution is terminal
    Failed { step_index: usize, error: String },

    /// A delay step suspended the run until `resume_at`
    Suspended { resume_at: DateTime<Utc> },
}

impl RunOutcome {
    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended { .. })
    }
}

/// Errors from engine operations
///
/// Step failures are not errors at this level: they end the execution and
/// are reported as [`RunOutcome::Failed`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("workflow {0} has no steps")]
    EmptyWorkflow(Uuid),

    #[error("contact not found: {0}")]
    ContactNotFound(Uuid),

    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Contact lookup failed
    #[error("contact directory error: {0}")]
    Contacts(#[from] CollaboratorError),
}

impl EngineError {
    /// Whether the error means a referenced record does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::WorkflowNotFound(_)
                | Self::EmptyWorkflow(_)
                | Self::ContactNotFound(_)
                | Self::Store(StoreError::ExecutionNotFound(_))
        )
    }
}
