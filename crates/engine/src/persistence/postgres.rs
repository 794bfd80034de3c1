//! PostgreSQL implementation of ExecutionStore
//!
//! Production persistence using PostgreSQL with:
//! - Row-locked transitions validated by the shared state machine
//! - Due-execution claiming with SKIP LOCKED
//! - Contact lookup from the CRM `contacts` table

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::store::*;
use crate::collaborators::{CollaboratorError, ContactDirectory};
use crate::model::{
    Contact, ExecutionStatus, StepOutputs, Transition, Workflow, WorkflowExecution, WorkflowLog,
    WorkflowStep,
};

const EXECUTION_COLUMNS: &str = "id, workflow_id, contact_id, status, current_step_index, \
     context, resume_at, error, started_at, completed_at";

/// PostgreSQL implementation of ExecutionStore
///
/// # Example
///
/// ```ignore
/// use cadence_engine::PostgresExecutionStore;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://localhost/cadence").await?;
/// let store = PostgresExecutionStore::new(pool);
/// store.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresExecutionStore {
    pool: PgPool,
}

impl PostgresExecutionStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Insert a workflow and its steps
    ///
    /// Workflow editing belongs to the CRM layer; this exists for seeding
    /// and tests.
    #[instrument(skip(self, workflow), fields(workflow_id = %workflow.id))]
    pub async fn insert_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, trigger, active)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(workflow.id)
        .bind(&workflow.name)
        .bind(&workflow.trigger)
        .bind(workflow.active)
        .execute(&mut *tx)
        .await?;

        for step in &workflow.steps {
            let (step_type, config) = step.config.to_stored();
            sqlx::query(
                r#"
                INSERT INTO workflow_steps (id, workflow_id, step_type, config, sort_order)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(step.id)
            .bind(workflow.id)
            .bind(step_type)
            .bind(config)
            .bind(step.sort_order)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Insert a contact (seeding and tests)
    pub async fn insert_contact(&self, contact: &Contact) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO contacts (id, name, email, phone, status, lead_score, tags, custom_fields)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(contact.id)
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(&contact.status)
        .bind(contact.lead_score)
        .bind(&contact.tags)
        .bind(serde_json::Value::Object(contact.custom_fields.clone()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_steps(&self, workflow_id: Uuid) -> Result<Vec<WorkflowStep>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, workflow_id, step_type, config, sort_order
            FROM workflow_steps
            WHERE workflow_id = $1
            ORDER BY sort_order
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let step_type: String = row.get("step_type");
                WorkflowStep::from_stored(
                    row.get("id"),
                    row.get("workflow_id"),
                    &step_type,
                    row.get("config"),
                    row.get("sort_order"),
                )
            })
            .collect())
    }

    async fn workflow_from_row(&self, row: &PgRow) -> Result<Workflow, StoreError> {
        let id: Uuid = row.get("id");
        Ok(Workflow {
            id,
            name: row.get("name"),
            trigger: row.get("trigger"),
            active: row.get("active"),
            steps: self.load_steps(id).await?,
        })
    }

    async fn write_execution(
        &self,
        conn: &mut sqlx::PgConnection,
        execution: &WorkflowExecution,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $2,
                current_step_index = $3,
                context = $4,
                resume_at = $5,
                error = $6,
                completed_at = $7
            WHERE id = $1
            "#,
        )
        .bind(execution.id)
        .bind(execution.status.as_str())
        .bind(execution.current_step_index as i32)
        .bind(serde_json::to_value(&execution.context)?)
        .bind(execution.resume_at)
        .bind(&execution.error)
        .bind(execution.completed_at)
        .execute(conn)
        .await?;
        Ok(())
    }
}

fn execution_from_row(row: &PgRow) -> Result<WorkflowExecution, StoreError> {
    let status: String = row.get("status");
    let context: serde_json::Value = row.get("context");
    let index: i32 = row.get("current_step_index");

    Ok(WorkflowExecution {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        contact_id: row.get("contact_id"),
        status: status
            .parse::<ExecutionStatus>()
            .map_err(StoreError::Serialization)?,
        current_step_index: index.max(0) as usize,
        context: serde_json::from_value::<StepOutputs>(context)?,
        resume_at: row.get("resume_at"),
        error: row.get("error"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
    })
}

#[async_trait]
impl ExecutionStore for PostgresExecutionStore {
    #[instrument(skip(self))]
    async fn get_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>, StoreError> {
        let row = sqlx::query("SELECT id, name, trigger, active FROM workflows WHERE id = $1")
            .bind(workflow_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to load workflow: {}", e);
                StoreError::Database(e.to_string())
            })?;

        match row {
            Some(row) => Ok(Some(self.workflow_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn find_active_workflows(&self, trigger: &str) -> Result<Vec<Workflow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, trigger, active
            FROM workflows
            WHERE trigger = $1 AND active
            ORDER BY id
            "#,
        )
        .bind(trigger)
        .fetch_all(&self.pool)
        .await?;

        let mut workflows = Vec::with_capacity(rows.len());
        for row in &rows {
            workflows.push(self.workflow_from_row(row).await?);
        }
        Ok(workflows)
    }

    #[instrument(skip(self, execution), fields(execution_id = %execution.id))]
    async fn create_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions
                (id, workflow_id, contact_id, status, current_step_index, context,
                 resume_at, error, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(execution.id)
        .bind(execution.workflow_id)
        .bind(execution.contact_id)
        .bind(execution.status.as_str())
        .bind(execution.current_step_index as i32)
        .bind(serde_json::to_value(&execution.context)?)
        .bind(execution.resume_at)
        .bind(&execution.error)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create execution: {}", e);
            StoreError::Database(e.to_string())
        })?;

        debug!(execution_id = %execution.id, "created execution");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<WorkflowExecution>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM workflow_executions WHERE id = $1",
            EXECUTION_COLUMNS
        ))
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(execution_from_row).transpose()
    }

    #[instrument(skip(self, transition), fields(transition = transition.name()))]
    async fn transition(
        &self,
        execution_id: Uuid,
        transition: Transition,
    ) -> Result<WorkflowExecution, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Lock the row so the check and the write see the same state
        let row = sqlx::query(&format!(
            "SELECT {} FROM workflow_executions WHERE id = $1 FOR UPDATE",
            EXECUTION_COLUMNS
        ))
        .bind(execution_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::ExecutionNotFound(execution_id))?;

        let mut execution = execution_from_row(&row)?;
        execution.apply(transition, Utc::now())?;
        self.write_execution(&mut *tx, &execution).await?;
        tx.commit().await?;

        debug!(%execution_id, status = %execution.status, "applied transition");
        Ok(execution)
    }

    #[instrument(skip(self))]
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WorkflowExecution>, StoreError> {
        let rows = sqlx::query(
            r#"
            WITH due AS (
                SELECT id
                FROM workflow_executions
                WHERE status = 'paused'
                  AND resume_at <= $1
                ORDER BY resume_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE workflow_executions e
            SET status = 'running',
                resume_at = NULL
            FROM due
            WHERE e.id = due.id
            RETURNING e.id, e.workflow_id, e.contact_id, e.status, e.current_step_index,
                      e.context, e.resume_at, e.error, e.started_at, e.completed_at
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to claim due executions: {}", e);
            StoreError::Database(e.to_string())
        })?;

        let claimed = rows
            .iter()
            .map(execution_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        if !claimed.is_empty() {
            debug!(count = claimed.len(), "claimed due executions");
        }
        Ok(claimed)
    }

    async fn append_log(&self, log: &WorkflowLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_logs
                (id, execution_id, contact_name, workflow_name, step_label, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(log.id)
        .bind(log.execution_id)
        .bind(&log.contact_name)
        .bind(&log.workflow_name)
        .bind(&log.step_label)
        .bind(log.status.as_str())
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_logs(&self, execution_id: Uuid) -> Result<Vec<WorkflowLog>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, execution_id, contact_name, workflow_name, step_label, status, created_at
            FROM workflow_logs
            WHERE execution_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let status: String = row.get("status");
                Ok(WorkflowLog {
                    id: row.get("id"),
                    execution_id: row.get("execution_id"),
                    contact_name: row.get("contact_name"),
                    workflow_name: row.get("workflow_name"),
                    step_label: row.get("step_label"),
                    status: status
                        .parse::<ExecutionStatus>()
                        .map_err(StoreError::Serialization)?,
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }
}

#[async_trait]
impl ContactDirectory for PostgresExecutionStore {
    async fn get(&self, contact_id: Uuid) -> Result<Option<Contact>, CollaboratorError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, phone, status, lead_score, tags, custom_fields
            FROM contacts
            WHERE id = $1
            "#,
        )
        .bind(contact_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        Ok(row.map(|row| {
            let custom_fields: serde_json::Value = row.get("custom_fields");
            Contact {
                id: row.get("id"),
                name: row.get("name"),
                email: row.get("email"),
                phone: row.get("phone"),
                status: row.get("status"),
                lead_score: row.get("lead_score"),
                tags: row.get("tags"),
                custom_fields: match custom_fields {
                    serde_json::Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                },
            }
        }))
    }
}
