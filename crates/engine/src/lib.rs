//! # Cadence Workflow Engine
//!
//! Runs CRM automation workflows: ordered steps executed against a single
//! contact, suspended durably at delay steps and resumed across restarts.
//!
//! ## Features
//!
//! - **Durable suspension**: a paused execution is nothing but a row with a
//!   resume time; no in-memory timers survive or are needed
//! - **Step kinds**: messages, delays, branches, generative text and
//!   pass-through calls to external actors and sync targets
//! - **Validated steps**: step configuration is checked when a workflow is
//!   loaded; invalid steps are skipped at run time
//! - **Live progress**: step events fan out to any number of subscribers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ExecutionRunner                         │
//! │  (start / trigger / run / resume / stop)                    │
//! └─────────────────────────────────────────────────────────────┘
//!          │                    │                     │
//!          ▼                    ▼                     ▼
//! ┌─────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │  StepExecutors  │ │  ExecutionStore  │ │    EventSink     │
//! │ (collaborators) │ │ (memory/postgres)│ │ (broadcaster)    │
//! └─────────────────┘ └──────────────────┘ └──────────────────┘
//!                              ▲
//!                              │ claim_due
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ResumeScheduler                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use cadence_engine::prelude::*;
//!
//! let store = Arc::new(InMemoryExecutionStore::new());
//! let workflow = Workflow::new("Welcome", "form_submitted")
//!     .with_step(StepConfig::send_message("Hi {{contact.name}}"))
//!     .with_step(StepConfig::delay("2 Days"))
//!     .with_step(StepConfig::generate("Write a follow-up"));
//!
//! let runner = Arc::new(ExecutionRunner::new(store.clone(), collaborators, events, EngineConfig::default()));
//! let outcome = runner.start(workflow.id, contact.id).await?;
//! assert!(outcome.is_suspended());
//! ```

pub mod collaborators;
pub mod config;
pub mod engine;
pub mod events;
pub mod model;
pub mod persistence;
pub mod scheduler;
pub mod steps;
pub mod template;

/// Prelude for common imports
pub mod prelude {
    pub use crate::collaborators::{
        ActorInvoker, CollaboratorError, Collaborators, ContactDirectory, ExternalSync,
        HttpCollaborator, HttpEndpoints, MessageSender, SentMessage, TextGenerator,
    };
    pub use crate::config::{EngineConfig, SchedulerConfig};
    pub use crate::engine::{EngineError, ExecutionRunner, RunOutcome};
    pub use crate::events::{EventBroadcaster, EventSink, StepEvent, StepEventStatus};
    pub use crate::model::{
        Contact, ExecutionStatus, StepConfig, Workflow, WorkflowExecution, WorkflowLog,
    };
    pub use crate::persistence::{
        ExecutionStore, InMemoryExecutionStore, PostgresExecutionStore, StoreError,
    };
    pub use crate::scheduler::{DispatchedTick, ResumeScheduler, SchedulerError, TickReport};
}

// Re-export key types at crate root
pub use collaborators::{CollaboratorError, Collaborators, HttpCollaborator, HttpEndpoints};
pub use config::{EngineConfig, SchedulerConfig, MAX_CONCURRENT_EXECUTIONS};
pub use engine::{EngineError, ExecutionRunner, RunOutcome};
pub use events::{EventBroadcaster, EventSink, NoopEventSink, StepEvent, StepEventStatus};
pub use model::{
    Contact, ExecutionStatus, StepConfig, Transition, Workflow, WorkflowExecution, WorkflowLog,
};
pub use persistence::{ExecutionStore, InMemoryExecutionStore, PostgresExecutionStore, StoreError};
pub use scheduler::{DispatchedTick, ResumeScheduler, SchedulerError, TickReport};
pub use template::TemplateRenderer;
