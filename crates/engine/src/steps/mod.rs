//! Step executors
//!
//! Each step kind has an executor that turns a step configuration plus the
//! contact snapshot into a [`StepAction`]. Executors never touch the store;
//! the runner persists whatever the action asks for.

mod branch;
mod delay;
mod generate;
mod message;
mod passthrough;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::collaborators::{CollaboratorError, Collaborators};
use crate::model::{Contact, StepConfig, StepOutputs, WorkflowStep};
use crate::template::TemplateRenderer;

pub use branch::evaluate as evaluate_branch;
pub use delay::parse_wait_minutes;
pub use generate::SYSTEM_PROMPT as GENERATE_SYSTEM_PROMPT;

/// What the runner should do after a step
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    /// Store the output and move to the next step
    Continue(serde_json::Value),

    /// Store the output and suspend until `resume_at`
    Suspend {
        output: serde_json::Value,
        resume_at: DateTime<Utc>,
    },

    /// Complete the run here, skipping the remaining steps
    Halt,
}

/// A step failed; terminal for the execution
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("failed to serialize step input: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Inputs available to a step
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub contact: &'a Contact,
    pub outputs: &'a StepOutputs,
    pub now: DateTime<Utc>,
}

/// Dispatches steps to their executors
#[derive(Clone)]
pub struct StepExecutors {
    collaborators: Collaborators,
    renderer: TemplateRenderer,
}

impl StepExecutors {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            renderer: TemplateRenderer::new(),
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Execute one step
    pub async fn execute(
        &self,
        step: &WorkflowStep,
        ctx: StepContext<'_>,
    ) -> Result<StepAction, StepError> {
        let c = &self.collaborators;

        let action = match &step.config {
            StepConfig::SendMessage(config) => StepAction::Continue(
                message::execute(c.messages.as_ref(), &self.renderer, config, ctx.contact)
                    .await?,
            ),
            StepConfig::Delay(config) => delay::execute(config, ctx.now),
            StepConfig::Branch(config) => branch::execute(config, ctx.contact),
            StepConfig::Generate(config) => StepAction::Continue(
                generate::execute(
                    c.generator.as_ref(),
                    &self.renderer,
                    config,
                    ctx.contact,
                    ctx.outputs,
                )
                .await?,
            ),
            StepConfig::InvokeActor(config) => StepAction::Continue(
                passthrough::invoke_actor(c.actors.as_ref(), config, ctx.contact).await?,
            ),
            StepConfig::ExternalSync(config) => StepAction::Continue(
                passthrough::external_sync(c.sync.as_ref(), config, ctx.contact).await?,
            ),
            StepConfig::Invalid { reason, .. } => {
                StepAction::Continue(json!({ "skipped": true, "reason": reason }))
            }
        };

        Ok(action)
    }
}
