//! Data model for workflows, executions and contacts
//!
//! This module provides:
//! - [`Workflow`] / [`WorkflowStep`] with a validated [`StepConfig`] per step kind
//! - [`WorkflowExecution`], the only durable record of progress
//! - [`Transition`], the closed set of legal execution state changes
//! - [`WorkflowLog`], the human-readable projection of an execution
//! - [`Contact`], the snapshot a run is evaluated against

mod contact;
mod execution;
mod workflow;

pub use contact::Contact;
pub use execution::{
    step_key, ExecutionStatus, InvalidTransition, StepOutputs, Transition, WorkflowExecution,
    WorkflowLog,
};
pub use workflow::{
    BranchConfig, BranchOperator, DelayConfig, GenerateConfig, SendMessageConfig, StepConfig,
    StepKind, Workflow, WorkflowStep,
};
