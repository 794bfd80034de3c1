//! Execution records and their state machine

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Accumulated step outputs, keyed by [`step_key`]
pub type StepOutputs = BTreeMap<String, serde_json::Value>;

/// Context key under which a step's output is stored
pub fn step_key(index: usize) -> String {
    format!("step_{}", index)
}

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Steps are being driven by a runner
    Running,

    /// Suspended at a delay step until `resume_at`
    Paused,

    /// All steps ran, or a branch short-circuited the run
    Completed,

    /// A step raised an error
    Failed,

    /// Stopped while paused; never resumed
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown execution status: {}", other)),
        }
    }
}

/// A state change requested for an execution
///
/// Every store applies transitions through [`WorkflowExecution::apply`], so
/// the legality rules live in one place.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// A step succeeded; persist its output and move on
    Advance {
        next_index: usize,
        context: StepOutputs,
    },

    /// A delay step suspended the run
    Suspend {
        next_index: usize,
        context: StepOutputs,
        resume_at: DateTime<Utc>,
    },

    /// The run finished (end of steps or branch short-circuit)
    Complete { at_index: usize },

    /// A step failed
    Fail { at_index: usize, error: String },

    /// The scheduler picked up a due execution
    Resume,

    /// Stop a paused execution so it is never resumed
    Cancel,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Advance { .. } => "advance",
            Self::Suspend { .. } => "suspend",
            Self::Complete { .. } => "complete",
            Self::Fail { .. } => "fail",
            Self::Resume => "resume",
            Self::Cancel => "cancel",
        }
    }

    /// Status an execution must be in for this transition to apply
    fn required_status(&self) -> ExecutionStatus {
        match self {
            Self::Resume | Self::Cancel => ExecutionStatus::Paused,
            _ => ExecutionStatus::Running,
        }
    }

    fn target_index(&self) -> Option<usize> {
        match self {
            Self::Advance { next_index, .. } | Self::Suspend { next_index, .. } => {
                Some(*next_index)
            }
            Self::Complete { at_index } | Self::Fail { at_index, .. } => Some(*at_index),
            Self::Resume | Self::Cancel => None,
        }
    }
}

/// Rejected state change
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot {transition} execution {execution_id} in status {from}: {reason}")]
pub struct InvalidTransition {
    pub execution_id: Uuid,
    pub from: ExecutionStatus,
    pub transition: &'static str,
    pub reason: String,
}

/// One run of a workflow for one contact
///
/// This is the sole durable record of progress. Invariants maintained by
/// [`apply`](Self::apply):
/// - `current_step_index` never decreases
/// - `resume_at` is set if and only if `status` is `Paused`
/// - terminal executions are never mutated again
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub contact_id: Uuid,
    pub status: ExecutionStatus,
    pub current_step_index: usize,
    pub context: StepOutputs,
    pub resume_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    /// A fresh running execution at step 0
    pub fn new(workflow_id: Uuid, contact_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id,
            contact_id,
            status: ExecutionStatus::Running,
            current_step_index: 0,
            context: StepOutputs::new(),
            resume_at: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Apply a transition, validating it against the current state
    pub fn apply(
        &mut self,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        let required = transition.required_status();
        if self.status != required {
            return Err(self.reject(
                &transition,
                format!("requires status {}", required),
            ));
        }

        if let Some(index) = transition.target_index() {
            if index < self.current_step_index {
                return Err(self.reject(
                    &transition,
                    format!(
                        "step index would move backwards ({} -> {})",
                        self.current_step_index, index
                    ),
                ));
            }
        }

        match transition {
            Transition::Advance {
                next_index,
                context,
            } => {
                self.current_step_index = next_index;
                self.context = context;
            }
            Transition::Suspend {
                next_index,
                context,
                resume_at,
            } => {
                self.status = ExecutionStatus::Paused;
                self.current_step_index = next_index;
                self.context = context;
                self.resume_at = Some(resume_at);
            }
            Transition::Complete { at_index } => {
                self.status = ExecutionStatus::Completed;
                self.current_step_index = at_index;
                self.completed_at = Some(now);
            }
            Transition::Fail { at_index, error } => {
                self.status = ExecutionStatus::Failed;
                self.current_step_index = at_index;
                self.error = Some(error);
                self.completed_at = Some(now);
            }
            Transition::Resume => {
                self.status = ExecutionStatus::Running;
                self.resume_at = None;
            }
            Transition::Cancel => {
                self.status = ExecutionStatus::Cancelled;
                self.resume_at = None;
                self.completed_at = Some(now);
            }
        }

        Ok(())
    }

    /// Whether the scheduler should pick this execution up at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ExecutionStatus::Paused && self.resume_at.is_some_and(|at| at <= now)
    }

    fn reject(&self, transition: &Transition, reason: String) -> InvalidTransition {
        InvalidTransition {
            execution_id: self.id,
            from: self.status,
            transition: transition.name(),
            reason,
        }
    }
}

/// Human-readable projection of an execution
///
/// Appended on every status change. Presentation only; never read back for
/// control flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowLog {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub contact_name: String,
    pub workflow_name: String,
    pub step_label: String,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
}

impl WorkflowLog {
    pub fn new(
        execution_id: Uuid,
        contact_name: impl Into<String>,
        workflow_name: impl Into<String>,
        step_label: impl Into<String>,
        status: ExecutionStatus,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            execution_id,
            contact_name: contact_name.into(),
            workflow_name: workflow_name.into(),
            step_label: step_label.into(),
            status,
            created_at: Utc::now(),
        }
    }
}
