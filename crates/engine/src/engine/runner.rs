//! Execution runner
//!
//! The runner is responsible for:
//! - Starting executions from a workflow and a contact
//! - Driving steps in order and persisting progress after each one
//! - Suspending at delay steps and resuming once the scheduler claims them
//! - Stopping paused executions

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn, Instrument};
use uuid::Uuid;

use super::{EngineError, RunOutcome};
use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use crate::events::{EventSink, StepEvent, StepEventStatus};
use crate::model::{
    step_key, Contact, ExecutionStatus, StepConfig, Transition, Workflow, WorkflowExecution,
    WorkflowLog,
};
use crate::persistence::ExecutionStore;
use crate::steps::{StepAction, StepContext, StepExecutors};

/// Label used in log rows once every step has run
const COMPLETED_LABEL: &str = "Completed";

/// Drives workflow executions
///
/// # Example
///
/// ```ignore
/// use cadence_engine::prelude::*;
///
/// let runner = Arc::new(ExecutionRunner::new(store, collaborators, events, EngineConfig::default()));
///
/// // Run until the first delay, failure or the end
/// let outcome = runner.start(workflow_id, contact_id).await?;
///
/// // Or run in the background
/// let execution_id = runner.trigger(workflow_id, contact_id).await?;
/// ```
pub struct ExecutionRunner {
    store: Arc<dyn ExecutionStore>,
    executors: StepExecutors,
    events: Arc<dyn EventSink>,
    permits: Arc<Semaphore>,
    config: EngineConfig,
}

/// Everything needed to run a freshly created execution
struct Prepared {
    workflow: Workflow,
    contact: Contact,
    execution: WorkflowExecution,
}

impl ExecutionRunner {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        collaborators: Collaborators,
        events: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            executors: StepExecutors::new(collaborators),
            events,
            permits: Arc::new(Semaphore::new(
                config
                    .max_concurrent_executions
                    .clamp(1, Semaphore::MAX_PERMITS),
            )),
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Permits shared by triggered and resumed executions
    pub fn permits(&self) -> &Arc<Semaphore> {
        &self.permits
    }

    /// Start an execution and run it until it completes, fails or suspends
    #[instrument(skip(self))]
    pub async fn start(
        &self,
        workflow_id: Uuid,
        contact_id: Uuid,
    ) -> Result<RunOutcome, EngineError> {
        let prepared = self.prepare(workflow_id, contact_id).await?;
        self.run(&prepared.execution, &prepared.workflow, &prepared.contact)
            .await
    }

    /// Start an execution and run it in the background
    ///
    /// Lookups and the execution record are done before returning, so a
    /// missing workflow or contact is still reported to the caller.
    #[instrument(skip(self))]
    pub async fn trigger(
        self: &Arc<Self>,
        workflow_id: Uuid,
        contact_id: Uuid,
    ) -> Result<Uuid, EngineError> {
        let prepared = self.prepare(workflow_id, contact_id).await?;
        let execution_id = prepared.execution.id;

        let runner = Arc::clone(self);
        tokio::spawn(
            async move {
                // Held until the run returns
                let _permit = runner.permits.clone().acquire_owned().await;

                if let Err(e) = runner
                    .run(&prepared.execution, &prepared.workflow, &prepared.contact)
                    .await
                {
                    error!(%execution_id, error = %e, "background run failed");
                }
            }
            .in_current_span(),
        );

        Ok(execution_id)
    }

    /// Start every active workflow listening on `label` for a contact
    ///
    /// Workflows without steps are skipped. Returns the ids of the
    /// executions created.
    #[instrument(skip(self))]
    pub async fn fire_trigger(
        self: &Arc<Self>,
        label: &str,
        contact_id: Uuid,
    ) -> Result<Vec<Uuid>, EngineError> {
        if self.executors.collaborators().contacts.get(contact_id).await?.is_none() {
            return Err(EngineError::ContactNotFound(contact_id));
        }

        let workflows = self.store.find_active_workflows(label).await?;
        let mut started = Vec::with_capacity(workflows.len());

        for workflow in workflows {
            match self.trigger(workflow.id, contact_id).await {
                Ok(execution_id) => started.push(execution_id),
                Err(EngineError::EmptyWorkflow(workflow_id)) => {
                    warn!(%workflow_id, "skipping workflow without steps");
                }
                Err(e) => return Err(e),
            }
        }

        info!(label, %contact_id, started = started.len(), "trigger fired");
        Ok(started)
    }

    /// Drive an execution from its current step
    ///
    /// The execution must be running. Its persisted context and step index
    /// are the starting point; every step's output is persisted before the
    /// next step begins.
    #[instrument(skip_all, fields(execution_id = %execution.id, from_index = execution.current_step_index))]
    pub async fn run(
        &self,
        execution: &WorkflowExecution,
        workflow: &Workflow,
        contact: &Contact,
    ) -> Result<RunOutcome, EngineError> {
        let execution_id = execution.id;
        let steps = &workflow.steps;
        let mut context = execution.context.clone();
        let mut index = execution.current_step_index;

        while let Some(step) = steps.get(index) {
            let step_type = step.step_type();
            self.publish(StepEvent::new(
                execution_id,
                index,
                step_type,
                StepEventStatus::Started,
            ));
            debug!(step_index = index, step_type, "executing step");

            if let StepConfig::Invalid { reason, .. } = &step.config {
                warn!(step_index = index, step_type, %reason, "skipping invalid step");
            }

            let ctx = StepContext {
                contact,
                outputs: &context,
                now: Utc::now(),
            };

            let action = self.executors.execute(step, ctx).await;
            match action {
                Ok(StepAction::Continue(output)) => {
                    context.insert(step_key(index), output);
                    self.store
                        .transition(
                            execution_id,
                            Transition::Advance {
                                next_index: index + 1,
                                context: context.clone(),
                            },
                        )
                        .await?;
                    self.publish(StepEvent::new(
                        execution_id,
                        index,
                        step_type,
                        StepEventStatus::Succeeded,
                    ));
                    index += 1;
                }
                Ok(StepAction::Suspend { output, resume_at }) => {
                    context.insert(step_key(index), output);
                    self.store
                        .transition(
                            execution_id,
                            Transition::Suspend {
                                next_index: index + 1,
                                context,
                                resume_at,
                            },
                        )
                        .await?;
                    self.publish(StepEvent::new(
                        execution_id,
                        index,
                        step_type,
                        StepEventStatus::Waiting,
                    ));
                    self.record(
                        execution_id,
                        contact,
                        workflow,
                        step.label(index),
                        ExecutionStatus::Paused,
                    )
                    .await;

                    info!(step_index = index, %resume_at, "execution suspended");
                    return Ok(RunOutcome::Suspended { resume_at });
                }
                Ok(StepAction::Halt) => {
                    self.store
                        .transition(execution_id, Transition::Complete { at_index: index })
                        .await?;
                    self.publish(StepEvent::new(
                        execution_id,
                        index,
                        step_type,
                        StepEventStatus::RunCompleted,
                    ));
                    self.record(
                        execution_id,
                        contact,
                        workflow,
                        step.label(index),
                        ExecutionStatus::Completed,
                    )
                    .await;

                    info!(step_index = index, "branch condition not met, execution completed");
                    return Ok(RunOutcome::Completed);
                }
                Err(e) => {
                    let message = e.to_string();
                    self.store
                        .transition(
                            execution_id,
                            Transition::Fail {
                                at_index: index,
                                error: message.clone(),
                            },
                        )
                        .await?;
                    self.publish(
                        StepEvent::new(execution_id, index, step_type, StepEventStatus::Failed)
                            .with_error(message.clone()),
                    );
                    self.record(
                        execution_id,
                        contact,
                        workflow,
                        step.label(index),
                        ExecutionStatus::Failed,
                    )
                    .await;

                    error!(step_index = index, step_type, error = %message, "step failed");
                    return Ok(RunOutcome::Failed {
                        step_index: index,
                        error: message,
                    });
                }
            }
        }

        self.complete(execution_id, index, workflow, contact).await?;
        Ok(RunOutcome::Completed)
    }

    /// Continue an execution the scheduler has claimed
    ///
    /// The workflow and contact are reloaded. A contact that no longer
    /// exists, or a step index already past the last step, completes the
    /// execution without running anything. A deleted workflow fails it.
    #[instrument(skip_all, fields(execution_id = %execution.id))]
    pub async fn resume(&self, execution: WorkflowExecution) -> Result<RunOutcome, EngineError> {
        let execution_id = execution.id;
        let index = execution.current_step_index;

        let Some(workflow) = self.store.get_workflow(execution.workflow_id).await? else {
            let message = format!("workflow not found: {}", execution.workflow_id);
            self.store
                .transition(
                    execution_id,
                    Transition::Fail {
                        at_index: index,
                        error: message.clone(),
                    },
                )
                .await?;
            warn!(workflow_id = %execution.workflow_id, "workflow deleted while paused");
            return Ok(RunOutcome::Failed {
                step_index: index,
                error: message,
            });
        };

        let contact = self
            .executors
            .collaborators()
            .contacts
            .get(execution.contact_id)
            .await?;

        let Some(contact) = contact else {
            info!(contact_id = %execution.contact_id, "contact deleted while paused, completing");
            self.store
                .transition(execution_id, Transition::Complete { at_index: index })
                .await?;
            self.publish(StepEvent::new(
                execution_id,
                index,
                "",
                StepEventStatus::RunCompleted,
            ));
            return Ok(RunOutcome::Completed);
        };

        if index >= workflow.steps.len() {
            self.complete(execution_id, index, &workflow, &contact).await?;
            return Ok(RunOutcome::Completed);
        }

        self.record(
            execution_id,
            &contact,
            &workflow,
            workflow.steps[index].label(index),
            ExecutionStatus::Running,
        )
        .await;
        info!(step_index = index, "resuming execution");

        self.run(&execution, &workflow, &contact).await
    }

    /// Stop a paused execution so it is never resumed
    ///
    /// Running executions cannot be stopped mid-step and are rejected with
    /// [`StoreError::InvalidTransition`](crate::persistence::StoreError::InvalidTransition).
    #[instrument(skip(self))]
    pub async fn stop(&self, execution_id: Uuid) -> Result<WorkflowExecution, EngineError> {
        let execution = self
            .store
            .transition(execution_id, Transition::Cancel)
            .await?;

        let workflow_name = self
            .store
            .get_workflow(execution.workflow_id)
            .await?
            .map(|w| w.name)
            .unwrap_or_default();
        let contact_name = match self
            .executors
            .collaborators()
            .contacts
            .get(execution.contact_id)
            .await
        {
            Ok(Some(contact)) => contact.name,
            Ok(None) => String::new(),
            Err(e) => {
                warn!(error = %e, "contact lookup failed while stopping");
                String::new()
            }
        };

        self.append_log(WorkflowLog::new(
            execution_id,
            contact_name,
            workflow_name,
            format!("Stopped at step {}", execution.current_step_index + 1),
            ExecutionStatus::Cancelled,
        ))
        .await;

        info!(%execution_id, "execution stopped");
        Ok(execution)
    }

    /// Load the workflow and contact, then create the execution record
    async fn prepare(&self, workflow_id: Uuid, contact_id: Uuid) -> Result<Prepared, EngineError> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(workflow_id))?;
        if workflow.steps.is_empty() {
            return Err(EngineError::EmptyWorkflow(workflow_id));
        }

        let contact = self
            .executors
            .collaborators()
            .contacts
            .get(contact_id)
            .await?
            .ok_or(EngineError::ContactNotFound(contact_id))?;

        let execution = WorkflowExecution::new(workflow_id, contact_id);
        self.store.create_execution(&execution).await?;
        self.record(
            execution.id,
            &contact,
            &workflow,
            workflow.steps[0].label(0),
            ExecutionStatus::Running,
        )
        .await;

        info!(
            execution_id = %execution.id,
            %workflow_id,
            %contact_id,
            steps = workflow.steps.len(),
            "execution started"
        );

        Ok(Prepared {
            workflow,
            contact,
            execution,
        })
    }

    async fn complete(
        &self,
        execution_id: Uuid,
        index: usize,
        workflow: &Workflow,
        contact: &Contact,
    ) -> Result<(), EngineError> {
        self.store
            .transition(execution_id, Transition::Complete { at_index: index })
            .await?;
        self.publish(StepEvent::new(
            execution_id,
            index,
            "",
            StepEventStatus::RunCompleted,
        ));
        self.record(
            execution_id,
            contact,
            workflow,
            COMPLETED_LABEL,
            ExecutionStatus::Completed,
        )
        .await;

        info!(%execution_id, "execution completed");
        Ok(())
    }

    fn publish(&self, event: StepEvent) {
        self.events.publish(event);
    }

    async fn record(
        &self,
        execution_id: Uuid,
        contact: &Contact,
        workflow: &Workflow,
        step_label: impl Into<String>,
        status: ExecutionStatus,
    ) {
        self.append_log(WorkflowLog::new(
            execution_id,
            contact.name.as_str(),
            workflow.name.as_str(),
            step_label,
            status,
        ))
        .await;
    }

    /// Log rows are presentation only; a failed write never stops a run
    async fn append_log(&self, log: WorkflowLog) {
        if let Err(e) = self.store.append_log(&log).await {
            warn!(execution_id = %log.execution_id, error = %e, "failed to append workflow log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        ActorInvoker, CollaboratorError, ExternalSync, MessageSender, SentMessage, TextGenerator,
    };
    use crate::events::EventBroadcaster;
    use crate::model::StepConfig;
    use crate::persistence::{InMemoryExecutionStore, StoreError};
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl MessageSender for Echo {
        async fn send(
            &self,
            _contact_id: Uuid,
            _channel: &str,
            content: &str,
            _subject: Option<&str>,
        ) -> Result<SentMessage, CollaboratorError> {
            if content.contains("explode") {
                return Err(CollaboratorError::other("mailbox full"));
            }
            Ok(SentMessage {
                id: "m-1".to_string(),
                status: "sent".to_string(),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for Echo {
        async fn generate(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
        ) -> Result<serde_json::Value, CollaboratorError> {
            Ok(json!({}))
        }
    }

    #[async_trait]
    impl ActorInvoker for Echo {
        async fn invoke(
            &self,
            _config: &serde_json::Value,
            _contact: &Contact,
        ) -> Result<serde_json::Value, CollaboratorError> {
            Ok(json!({}))
        }
    }

    #[async_trait]
    impl ExternalSync for Echo {
        async fn sync(
            &self,
            _config: &serde_json::Value,
            _contact: &Contact,
        ) -> Result<serde_json::Value, CollaboratorError> {
            Ok(json!({}))
        }
    }

    fn runner(store: Arc<InMemoryExecutionStore>) -> ExecutionRunner {
        let echo = Arc::new(Echo);
        ExecutionRunner::new(
            store.clone(),
            Collaborators {
                messages: echo.clone(),
                generator: echo.clone(),
                contacts: store,
                actors: echo.clone(),
                sync: echo,
            },
            Arc::new(EventBroadcaster::default()),
            EngineConfig::default(),
        )
    }

    fn seed(store: &InMemoryExecutionStore, workflow: Workflow) -> (Uuid, Uuid) {
        let contact = Contact::new("Ada").with_lead_score(75);
        let ids = (workflow.id, contact.id);
        store.insert_workflow(workflow);
        store.insert_contact(contact);
        ids
    }

    #[tokio::test]
    async fn test_start_runs_all_steps() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let (workflow_id, contact_id) = seed(
            &store,
            Workflow::new("Welcome", "manual")
                .with_step(StepConfig::send_message("Hi"))
                .with_step(StepConfig::send_message("Again")),
        );

        let outcome = runner(store.clone()).start(workflow_id, contact_id).await.unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        let execution = &store.executions_for(workflow_id)[0];
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.current_step_index, 2);
        assert_eq!(execution.context.len(), 2);
        assert!(execution.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_start_missing_workflow_or_contact() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let (workflow_id, _) = seed(
            &store,
            Workflow::new("Welcome", "manual").with_step(StepConfig::send_message("Hi")),
        );
        let runner = runner(store.clone());

        let err = runner.start(Uuid::now_v7(), Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, EngineError::WorkflowNotFound(_)));

        let err = runner.start(workflow_id, Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, EngineError::ContactNotFound(_)));
        assert!(err.is_not_found());
        assert_eq!(store.execution_count(), 0);
    }

    #[tokio::test]
    async fn test_start_empty_workflow() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let (workflow_id, contact_id) = seed(&store, Workflow::new("Empty", "manual"));

        let err = runner(store).start(workflow_id, contact_id).await.unwrap_err();
        assert!(matches!(err, EngineError::EmptyWorkflow(_)));
    }

    #[tokio::test]
    async fn test_step_failure_is_an_outcome() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let (workflow_id, contact_id) = seed(
            &store,
            Workflow::new("Boom", "manual")
                .with_step(StepConfig::send_message("ok"))
                .with_step(StepConfig::send_message("explode"))
                .with_step(StepConfig::send_message("never")),
        );

        let outcome = runner(store.clone()).start(workflow_id, contact_id).await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Failed {
                step_index: 1,
                error: "mailbox full".to_string()
            }
        );
        let execution = &store.executions_for(workflow_id)[0];
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.current_step_index, 1);
        assert_eq!(execution.error.as_deref(), Some("mailbox full"));
    }

    #[tokio::test]
    async fn test_stop_running_execution_is_rejected() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let execution = WorkflowExecution::new(Uuid::now_v7(), Uuid::now_v7());
        store.put_execution(execution.clone());

        let err = runner(store).stop(execution.id).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Store(StoreError::InvalidTransition(_))
        ));
    }
}
