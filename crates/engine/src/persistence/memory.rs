//! In-memory implementation of ExecutionStore for testing

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::store::*;
use crate::collaborators::{CollaboratorError, ContactDirectory};
use crate::model::{Contact, Transition, Workflow, WorkflowExecution, WorkflowLog};

/// In-memory implementation of ExecutionStore
///
/// Provides the same transition semantics as the PostgreSQL store. It also
/// doubles as a [`ContactDirectory`], which keeps engine tests to a single
/// fixture.
///
/// # Example
///
/// ```
/// use cadence_engine::InMemoryExecutionStore;
///
/// let store = InMemoryExecutionStore::new();
/// assert_eq!(store.execution_count(), 0);
/// ```
pub struct InMemoryExecutionStore {
    workflows: RwLock<HashMap<Uuid, Workflow>>,
    executions: RwLock<HashMap<Uuid, WorkflowExecution>>,
    logs: RwLock<Vec<WorkflowLog>>,
    contacts: RwLock<HashMap<Uuid, Contact>>,
}

impl InMemoryExecutionStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
            executions: RwLock::new(HashMap::new()),
            logs: RwLock::new(Vec::new()),
            contacts: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace a workflow definition
    pub fn insert_workflow(&self, workflow: Workflow) {
        self.workflows.write().insert(workflow.id, workflow);
    }

    pub fn remove_workflow(&self, workflow_id: Uuid) {
        self.workflows.write().remove(&workflow_id);
    }

    /// Insert or replace a contact
    pub fn insert_contact(&self, contact: Contact) {
        self.contacts.write().insert(contact.id, contact);
    }

    pub fn remove_contact(&self, contact_id: Uuid) {
        self.contacts.write().remove(&contact_id);
    }

    /// Write an execution row as-is, bypassing transition checks
    ///
    /// Lets tests seed executions in any state, e.g. one left paused by a
    /// process that has since died.
    pub fn put_execution(&self, execution: WorkflowExecution) {
        self.executions.write().insert(execution.id, execution);
    }

    /// Get the number of executions
    pub fn execution_count(&self) -> usize {
        self.executions.read().len()
    }

    /// All executions for a workflow
    pub fn executions_for(&self, workflow_id: Uuid) -> Vec<WorkflowExecution> {
        self.executions
            .read()
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.workflows.write().clear();
        self.executions.write().clear();
        self.logs.write().clear();
        self.contacts.write().clear();
    }
}

impl Default for InMemoryExecutionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn get_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>, StoreError> {
        let mut workflow = self.workflows.read().get(&workflow_id).cloned();
        if let Some(workflow) = workflow.as_mut() {
            workflow.sort_steps();
        }
        Ok(workflow)
    }

    async fn find_active_workflows(&self, trigger: &str) -> Result<Vec<Workflow>, StoreError> {
        let mut matching: Vec<Workflow> = self
            .workflows
            .read()
            .values()
            .filter(|w| w.active && w.trigger == trigger)
            .cloned()
            .collect();

        for workflow in &mut matching {
            workflow.sort_steps();
        }
        matching.sort_by_key(|w| w.id);
        Ok(matching)
    }

    async fn create_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        self.executions
            .write()
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<WorkflowExecution>, StoreError> {
        Ok(self.executions.read().get(&execution_id).cloned())
    }

    async fn transition(
        &self,
        execution_id: Uuid,
        transition: Transition,
    ) -> Result<WorkflowExecution, StoreError> {
        let mut executions = self.executions.write();
        let execution = executions
            .get_mut(&execution_id)
            .ok_or(StoreError::ExecutionNotFound(execution_id))?;

        // Apply to a copy so a rejected transition leaves the row untouched
        let mut updated = execution.clone();
        updated.apply(transition, Utc::now())?;
        *execution = updated.clone();

        Ok(updated)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WorkflowExecution>, StoreError> {
        let mut executions = self.executions.write();

        let mut due: Vec<(DateTime<Utc>, Uuid)> = executions
            .values()
            .filter(|e| e.is_due(now))
            .filter_map(|e| e.resume_at.map(|at| (at, e.id)))
            .collect();
        due.sort();
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, id) in due {
            if let Some(execution) = executions.get_mut(&id) {
                execution.apply(Transition::Resume, now)?;
                claimed.push(execution.clone());
            }
        }

        Ok(claimed)
    }

    async fn append_log(&self, log: &WorkflowLog) -> Result<(), StoreError> {
        self.logs.write().push(log.clone());
        Ok(())
    }

    async fn list_logs(&self, execution_id: Uuid) -> Result<Vec<WorkflowLog>, StoreError> {
        Ok(self
            .logs
            .read()
            .iter()
            .filter(|l| l.execution_id == execution_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ContactDirectory for InMemoryExecutionStore {
    async fn get(&self, contact_id: Uuid) -> Result<Option<Contact>, CollaboratorError> {
        Ok(self.contacts.read().get(&contact_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExecutionStatus, StepConfig, StepOutputs};
    use chrono::Duration;

    fn paused_at(resume_at: DateTime<Utc>) -> WorkflowExecution {
        let mut execution = WorkflowExecution::new(Uuid::now_v7(), Uuid::now_v7());
        execution
            .apply(
                Transition::Suspend {
                    next_index: 1,
                    context: StepOutputs::new(),
                    resume_at,
                },
                Utc::now(),
            )
            .unwrap();
        execution
    }

    #[tokio::test]
    async fn test_create_and_get_execution() {
        let store = InMemoryExecutionStore::new();
        let execution = WorkflowExecution::new(Uuid::now_v7(), Uuid::now_v7());

        store.create_execution(&execution).await.unwrap();

        let loaded = store.get_execution(execution.id).await.unwrap();
        assert_eq!(loaded, Some(execution));
        assert_eq!(store.execution_count(), 1);
    }

    #[tokio::test]
    async fn test_get_workflow_sorts_steps() {
        let store = InMemoryExecutionStore::new();
        let mut workflow = Workflow::new("Nurture", "manual")
            .with_step(StepConfig::send_message("first"))
            .with_step(StepConfig::send_message("second"));
        workflow.steps.reverse();
        let workflow_id = workflow.id;
        store.insert_workflow(workflow);

        let loaded = store.get_workflow(workflow_id).await.unwrap().unwrap();
        assert_eq!(loaded.steps[0].sort_order, 0);
        assert_eq!(loaded.steps[1].sort_order, 1);
    }

    #[tokio::test]
    async fn test_find_active_workflows_filters_trigger_and_active() {
        let store = InMemoryExecutionStore::new();
        let matching = Workflow::new("A", "form_submitted");
        let matching_id = matching.id;
        store.insert_workflow(matching);
        store.insert_workflow(Workflow::new("B", "form_submitted").inactive());
        store.insert_workflow(Workflow::new("C", "tag_added"));

        let found = store.find_active_workflows("form_submitted").await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, matching_id);
    }

    #[tokio::test]
    async fn test_rejected_transition_leaves_row_untouched() {
        let store = InMemoryExecutionStore::new();
        let execution = paused_at(Utc::now() + Duration::hours(1));
        store.put_execution(execution.clone());

        let result = store
            .transition(execution.id, Transition::Complete { at_index: 1 })
            .await;

        assert!(matches!(result, Err(StoreError::InvalidTransition(_))));
        assert_eq!(
            store.get_execution(execution.id).await.unwrap(),
            Some(execution)
        );
    }

    #[tokio::test]
    async fn test_transition_unknown_execution() {
        let store = InMemoryExecutionStore::new();
        let result = store.transition(Uuid::now_v7(), Transition::Resume).await;

        assert!(matches!(result, Err(StoreError::ExecutionNotFound(_))));
    }

    #[tokio::test]
    async fn test_claim_due_only_picks_due_executions() {
        let store = InMemoryExecutionStore::new();
        let now = Utc::now();
        let due = paused_at(now - Duration::minutes(1));
        let future = paused_at(now + Duration::minutes(10));
        store.put_execution(due.clone());
        store.put_execution(future.clone());

        let claimed = store.claim_due(now, 10).await.unwrap();

        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, due.id);
        assert_eq!(claimed[0].status, ExecutionStatus::Running);
        assert!(claimed[0].resume_at.is_none());

        let untouched = store.get_execution(future.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, ExecutionStatus::Paused);

        // Claiming again finds nothing: the due row is running now
        assert!(store.claim_due(now, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_due_respects_limit_and_order() {
        let store = InMemoryExecutionStore::new();
        let now = Utc::now();
        let oldest = paused_at(now - Duration::minutes(30));
        store.put_execution(paused_at(now - Duration::minutes(5)));
        store.put_execution(oldest.clone());
        store.put_execution(paused_at(now - Duration::minutes(10)));

        let claimed = store.claim_due(now, 1).await.unwrap();

        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, oldest.id);
    }

    #[tokio::test]
    async fn test_logs_are_scoped_to_execution() {
        let store = InMemoryExecutionStore::new();
        let execution_id = Uuid::now_v7();
        let log = WorkflowLog::new(
            execution_id,
            "Ada",
            "Welcome",
            "Step 1: send_message",
            ExecutionStatus::Running,
        );
        store.append_log(&log).await.unwrap();
        store
            .append_log(&WorkflowLog::new(
                Uuid::now_v7(),
                "Grace",
                "Welcome",
                "Step 1: send_message",
                ExecutionStatus::Running,
            ))
            .await
            .unwrap();

        assert_eq!(store.list_logs(execution_id).await.unwrap(), vec![log]);
    }

    #[tokio::test]
    async fn test_contact_directory() {
        let store = InMemoryExecutionStore::new();
        let contact = Contact::new("Ada");
        let contact_id = contact.id;
        store.insert_contact(contact.clone());

        assert_eq!(store.get(contact_id).await.unwrap(), Some(contact));

        store.remove_contact(contact_id);
        assert_eq!(store.get(contact_id).await.unwrap(), None);
    }
}
