//! PostgreSQL adapter for Caseflow storage.
//!
//! The transactional source-of-truth backend. `commit_transition` runs
//! inside one SQL transaction; the optimistic version guard is a
//! `WHERE version = $n` predicate on the instance update, so a lost race
//! rolls the whole commit back. Template steps and transitions are stored
//! as a JSONB document next to the scalar columns, decoded once here at
//! the store boundary.

use crate::commit::{HistoryAppend, InstanceWrite, TaskClose, TransitionCommit};
use crate::traits::{HistoryStore, InstanceStore, TaskStore, TemplateStore, UserDirectory};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use caseflow_types::{
    AssignedTask, HistoryId, InstanceId, InstanceStatus, Priority, RoleId, StepId, TaskDetails,
    TaskId, TaskStatus, TemplateId, UserId, UserRecord, WorkflowHistory, WorkflowInstance,
    WorkflowStep, WorkflowTemplate, WorkflowTransition,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and initialize the schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS caseflow_templates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                workflow_type TEXT,
                active BOOLEAN NOT NULL,
                created_by TEXT NOT NULL,
                definition JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS caseflow_templates_active_type
                ON caseflow_templates (workflow_type)
                WHERE active AND workflow_type IS NOT NULL
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS caseflow_instances (
                id TEXT PRIMARY KEY,
                template_id TEXT NOT NULL,
                current_step_id TEXT NOT NULL,
                details JSONB NOT NULL,
                details_schema_version INTEGER NOT NULL,
                business_task_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created_by TEXT NOT NULL,
                priority TEXT NOT NULL,
                due_date TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ,
                version BIGINT NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS caseflow_instances_business_task
                ON caseflow_instances (business_task_id)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS caseflow_tasks (
                id TEXT PRIMARY KEY,
                instance_id TEXT NOT NULL,
                step_id TEXT NOT NULL,
                assignee TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS caseflow_tasks_assignee
                ON caseflow_tasks (assignee, status)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS caseflow_history (
                id TEXT PRIMARY KEY,
                instance_id TEXT NOT NULL,
                sequence BIGINT NOT NULL,
                from_step TEXT,
                to_step TEXT NOT NULL,
                action TEXT NOT NULL,
                performed_by TEXT NOT NULL,
                comment TEXT NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL,
                UNIQUE (instance_id, sequence)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS caseflow_users (
                user_id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                roles JSONB NOT NULL,
                active BOOLEAN NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

// ── Serde helpers for enum columns ───────────────────────────────────

fn enum_to_str<T: Serialize>(value: &T) -> StorageResult<String> {
    match serde_json::to_value(value) {
        Ok(Value::String(s)) => Ok(s),
        Ok(other) => Err(StorageError::Serialization(format!(
            "expected string-shaped enum, got {other}"
        ))),
        Err(e) => Err(StorageError::Serialization(e.to_string())),
    }
}

fn enum_from_str<T: DeserializeOwned>(s: &str) -> StorageResult<T> {
    serde_json::from_value(Value::String(s.to_string()))
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

fn backend(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

// ── Row mapping ──────────────────────────────────────────────────────

#[derive(serde::Serialize, serde::Deserialize)]
struct TemplateDefinition {
    steps: Vec<WorkflowStep>,
    transitions: Vec<WorkflowTransition>,
}

fn row_to_template(row: &sqlx::postgres::PgRow) -> StorageResult<WorkflowTemplate> {
    let definition: Value = row.try_get("definition").map_err(backend)?;
    let definition: TemplateDefinition = serde_json::from_value(definition)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(WorkflowTemplate {
        id: TemplateId::new(row.try_get::<String, _>("id").map_err(backend)?),
        name: row.try_get("name").map_err(backend)?,
        description: row.try_get("description").map_err(backend)?,
        workflow_type: row.try_get("workflow_type").map_err(backend)?,
        active: row.try_get("active").map_err(backend)?,
        created_by: UserId::new(row.try_get::<String, _>("created_by").map_err(backend)?),
        steps: definition.steps,
        transitions: definition.transitions,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn row_to_instance(row: &sqlx::postgres::PgRow) -> StorageResult<WorkflowInstance> {
    let details: Value = row.try_get("details").map_err(backend)?;
    let details: TaskDetails = serde_json::from_value(details)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let status: String = row.try_get("status").map_err(backend)?;
    let priority: String = row.try_get("priority").map_err(backend)?;
    let version: i64 = row.try_get("version").map_err(backend)?;
    Ok(WorkflowInstance {
        id: InstanceId::new(row.try_get::<String, _>("id").map_err(backend)?),
        template_id: TemplateId::new(row.try_get::<String, _>("template_id").map_err(backend)?),
        current_step_id: StepId::new(
            row.try_get::<String, _>("current_step_id").map_err(backend)?,
        ),
        details,
        status: enum_from_str::<InstanceStatus>(&status)?,
        created_by: UserId::new(row.try_get::<String, _>("created_by").map_err(backend)?),
        priority: enum_from_str::<Priority>(&priority)?,
        due_date: row.try_get("due_date").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
        completed_at: row.try_get("completed_at").map_err(backend)?,
        version: version as u64,
    })
}

fn row_to_task(row: &sqlx::postgres::PgRow) -> StorageResult<AssignedTask> {
    let status: String = row.try_get("status").map_err(backend)?;
    Ok(AssignedTask {
        id: TaskId::new(row.try_get::<String, _>("id").map_err(backend)?),
        instance_id: InstanceId::new(row.try_get::<String, _>("instance_id").map_err(backend)?),
        step_id: StepId::new(row.try_get::<String, _>("step_id").map_err(backend)?),
        assignee: UserId::new(row.try_get::<String, _>("assignee").map_err(backend)?),
        status: enum_from_str::<TaskStatus>(&status)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        completed_at: row.try_get("completed_at").map_err(backend)?,
    })
}

fn row_to_history(row: &sqlx::postgres::PgRow) -> StorageResult<WorkflowHistory> {
    let sequence: i64 = row.try_get("sequence").map_err(backend)?;
    let from_step: Option<String> = row.try_get("from_step").map_err(backend)?;
    Ok(WorkflowHistory {
        id: HistoryId::new(row.try_get::<String, _>("id").map_err(backend)?),
        instance_id: InstanceId::new(row.try_get::<String, _>("instance_id").map_err(backend)?),
        sequence: sequence as u64,
        from_step: from_step.map(StepId::new),
        to_step: StepId::new(row.try_get::<String, _>("to_step").map_err(backend)?),
        action: row.try_get("action").map_err(backend)?,
        performed_by: UserId::new(row.try_get::<String, _>("performed_by").map_err(backend)?),
        comment: row.try_get("comment").map_err(backend)?,
        recorded_at: row.try_get("recorded_at").map_err(backend)?,
    })
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> StorageResult<UserRecord> {
    let roles: Value = row.try_get("roles").map_err(backend)?;
    let roles: Vec<RoleId> = serde_json::from_value(roles)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(UserRecord {
        user_id: UserId::new(row.try_get::<String, _>("user_id").map_err(backend)?),
        display_name: row.try_get("display_name").map_err(backend)?,
        roles,
        active: row.try_get("active").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

#[async_trait]
impl TemplateStore for PostgresStore {
    async fn create_template(&self, template: WorkflowTemplate) -> StorageResult<()> {
        template
            .validate()
            .map_err(|e| StorageError::InvalidInput(e.to_string()))?;

        let definition = serde_json::to_value(TemplateDefinition {
            steps: template.steps.clone(),
            transitions: template.transitions.clone(),
        })
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO caseflow_templates
                (id, name, description, workflow_type, active, created_by,
                 definition, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&template.id.0)
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.workflow_type)
        .bind(template.active)
        .bind(&template.created_by.0)
        .bind(&definition)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StorageError::Conflict(format!(
                "template {} conflicts with an existing record",
                template.id
            ))),
            Err(e) => Err(backend(e)),
        }
    }

    async fn get_template(&self, id: &TemplateId) -> StorageResult<Option<WorkflowTemplate>> {
        let row = sqlx::query("SELECT * FROM caseflow_templates WHERE id = $1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(row_to_template).transpose()
    }

    async fn get_template_by_name(&self, name: &str) -> StorageResult<Option<WorkflowTemplate>> {
        let row = sqlx::query(
            "SELECT * FROM caseflow_templates WHERE active AND name = $1 LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(row_to_template).transpose()
    }

    async fn get_template_by_type(
        &self,
        workflow_type: &str,
    ) -> StorageResult<Option<WorkflowTemplate>> {
        let row = sqlx::query(
            "SELECT * FROM caseflow_templates WHERE active AND workflow_type = $1 LIMIT 1",
        )
        .bind(workflow_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(row_to_template).transpose()
    }

    async fn list_templates(&self) -> StorageResult<Vec<WorkflowTemplate>> {
        let rows = sqlx::query("SELECT * FROM caseflow_templates ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(row_to_template).collect()
    }

    async fn deactivate_template(&self, id: &TemplateId) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE caseflow_templates SET active = FALSE, updated_at = $1 WHERE id = $2",
        )
        .bind(Utc::now())
        .bind(&id.0)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("template {id} not found")));
        }
        Ok(())
    }

    async fn delete_template(&self, id: &TemplateId) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM caseflow_templates WHERE id = $1")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("template {id} not found")));
        }
        Ok(())
    }
}

#[async_trait]
impl InstanceStore for PostgresStore {
    async fn get_instance(&self, id: &InstanceId) -> StorageResult<Option<WorkflowInstance>> {
        let row = sqlx::query("SELECT * FROM caseflow_instances WHERE id = $1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(row_to_instance).transpose()
    }

    async fn get_instance_by_business_task(
        &self,
        task_id: &str,
    ) -> StorageResult<Option<WorkflowInstance>> {
        let row = sqlx::query(
            "SELECT * FROM caseflow_instances WHERE business_task_id = $1 LIMIT 1",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(row_to_instance).transpose()
    }

    async fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> StorageResult<WorkflowInstance> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let instance_id = match commit.instance {
            InstanceWrite::Create(mut instance) => {
                instance.updated_at = now;
                if instance.is_terminal() && instance.completed_at.is_none() {
                    instance.completed_at = Some(now);
                }
                let details = serde_json::to_value(&instance.details)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                let result = sqlx::query(
                    r#"
                    INSERT INTO caseflow_instances
                        (id, template_id, current_step_id, details,
                         details_schema_version, business_task_id, status,
                         created_by, priority, due_date, created_at,
                         updated_at, completed_at, version)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                            $12, $13, $14)
                    "#,
                )
                .bind(&instance.id.0)
                .bind(&instance.template_id.0)
                .bind(&instance.current_step_id.0)
                .bind(&details)
                .bind(instance.details.schema_version as i32)
                .bind(&instance.details.task_id)
                .bind(enum_to_str(&instance.status)?)
                .bind(&instance.created_by.0)
                .bind(enum_to_str(&instance.priority)?)
                .bind(instance.due_date)
                .bind(instance.created_at)
                .bind(instance.updated_at)
                .bind(instance.completed_at)
                .bind(instance.version as i64)
                .execute(&mut *tx)
                .await;
                match result {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => {
                        return Err(StorageError::Conflict(format!(
                            "instance {} already exists",
                            instance.id
                        )));
                    }
                    Err(e) => return Err(backend(e)),
                }
                instance.id.clone()
            }
            InstanceWrite::Advance {
                instance_id,
                expected_version,
                new_step,
                new_status,
                closes,
            } => {
                let result = sqlx::query(
                    r#"
                    UPDATE caseflow_instances
                    SET current_step_id = $1,
                        status = $2,
                        version = version + 1,
                        updated_at = $3,
                        completed_at = CASE WHEN $4 THEN $3 ELSE completed_at END
                    WHERE id = $5 AND version = $6
                    "#,
                )
                .bind(&new_step.0)
                .bind(enum_to_str(&new_status)?)
                .bind(now)
                .bind(closes)
                .bind(&instance_id.0)
                .bind(expected_version as i64)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;

                if result.rows_affected() == 0 {
                    let exists = sqlx::query("SELECT 1 FROM caseflow_instances WHERE id = $1")
                        .bind(&instance_id.0)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(backend)?;
                    return Err(match exists {
                        Some(_) => StorageError::Conflict(format!(
                            "instance {instance_id} version moved past {expected_version}"
                        )),
                        None => {
                            StorageError::NotFound(format!("instance {instance_id} not found"))
                        }
                    });
                }
                instance_id
            }
        };

        if let Some(close) = commit.close_task {
            let (task_id, status) = match close {
                TaskClose::Complete(id) => (id, TaskStatus::Completed),
                TaskClose::Skip(id) => (id, TaskStatus::Skipped),
            };
            let result = sqlx::query(
                r#"
                UPDATE caseflow_tasks
                SET status = $1, completed_at = $2
                WHERE id = $3 AND status IN ('pending', 'in_progress')
                "#,
            )
            .bind(enum_to_str(&status)?)
            .bind(now)
            .bind(&task_id.0)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
            if result.rows_affected() == 0 {
                return Err(StorageError::InvariantViolation(format!(
                    "task {task_id} is missing or already closed"
                )));
            }
        }

        if let Some(task) = commit.create_task {
            let open: i64 = sqlx::query(
                r#"
                SELECT COUNT(*) AS open FROM caseflow_tasks
                WHERE instance_id = $1 AND status IN ('pending', 'in_progress')
                "#,
            )
            .bind(&task.instance_id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?
            .try_get("open")
            .map_err(backend)?;
            if open > 0 {
                return Err(StorageError::InvariantViolation(format!(
                    "instance {} already has a live task",
                    task.instance_id
                )));
            }

            sqlx::query(
                r#"
                INSERT INTO caseflow_tasks
                    (id, instance_id, step_id, assignee, status, created_at,
                     completed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(&task.id.0)
            .bind(&task.instance_id.0)
            .bind(&task.step_id.0)
            .bind(&task.assignee.0)
            .bind(enum_to_str(&task.status)?)
            .bind(task.created_at)
            .bind(task.completed_at)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        let HistoryAppend {
            instance_id: history_instance,
            from_step,
            to_step,
            action,
            performed_by,
            comment,
        } = commit.history;
        let sequence: i64 = sqlx::query(
            r#"
            SELECT COALESCE(MAX(sequence) + 1, 0) AS next
            FROM caseflow_history WHERE instance_id = $1
            "#,
        )
        .bind(&history_instance.0)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?
        .try_get("next")
        .map_err(backend)?;

        sqlx::query(
            r#"
            INSERT INTO caseflow_history
                (id, instance_id, sequence, from_step, to_step, action,
                 performed_by, comment, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(HistoryId::generate().0)
        .bind(&history_instance.0)
        .bind(sequence)
        .bind(from_step.map(|s| s.0))
        .bind(&to_step.0)
        .bind(&action)
        .bind(&performed_by.0)
        .bind(&comment)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        let row = sqlx::query("SELECT * FROM caseflow_instances WHERE id = $1")
            .bind(&instance_id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;
        let written = row_to_instance(&row)?;

        tx.commit().await.map_err(backend)?;
        Ok(written)
    }
}

#[async_trait]
impl TaskStore for PostgresStore {
    async fn get_task(&self, id: &TaskId) -> StorageResult<Option<AssignedTask>> {
        let row = sqlx::query("SELECT * FROM caseflow_tasks WHERE id = $1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn open_task_for_instance(
        &self,
        instance_id: &InstanceId,
    ) -> StorageResult<Option<AssignedTask>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM caseflow_tasks
            WHERE instance_id = $1 AND status IN ('pending', 'in_progress')
            LIMIT 1
            "#,
        )
        .bind(&instance_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn tasks_for_user(
        &self,
        user: &UserId,
        status: Option<TaskStatus>,
    ) -> StorageResult<Vec<AssignedTask>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    r#"
                    SELECT * FROM caseflow_tasks
                    WHERE assignee = $1 AND status = $2
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(&user.0)
                .bind(enum_to_str(&status)?)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT * FROM caseflow_tasks
                    WHERE assignee = $1
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(&user.0)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(backend)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn count_open_tasks_for_user(&self, user: &UserId) -> StorageResult<usize> {
        let count: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS open FROM caseflow_tasks
            WHERE assignee = $1 AND status IN ('pending', 'in_progress')
            "#,
        )
        .bind(&user.0)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?
        .try_get("open")
        .map_err(backend)?;
        Ok(count as usize)
    }
}

#[async_trait]
impl HistoryStore for PostgresStore {
    async fn history_for_instance(
        &self,
        instance_id: &InstanceId,
    ) -> StorageResult<Vec<WorkflowHistory>> {
        let rows = sqlx::query(
            "SELECT * FROM caseflow_history WHERE instance_id = $1 ORDER BY sequence",
        )
        .bind(&instance_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(row_to_history).collect()
    }

    async fn history_by_performer(&self, user: &UserId) -> StorageResult<Vec<WorkflowHistory>> {
        let rows = sqlx::query(
            "SELECT * FROM caseflow_history WHERE performed_by = $1 ORDER BY recorded_at DESC",
        )
        .bind(&user.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(row_to_history).collect()
    }

    async fn history_by_action(&self, action: &str) -> StorageResult<Vec<WorkflowHistory>> {
        let rows = sqlx::query(
            "SELECT * FROM caseflow_history WHERE action = $1 ORDER BY recorded_at DESC",
        )
        .bind(action)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(row_to_history).collect()
    }
}

#[async_trait]
impl UserDirectory for PostgresStore {
    async fn get_user(&self, id: &UserId) -> StorageResult<Option<UserRecord>> {
        let row = sqlx::query("SELECT * FROM caseflow_users WHERE user_id = $1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn users_with_roles(&self, roles: &[RoleId]) -> StorageResult<Vec<UserRecord>> {
        let role_names = serde_json::to_value(roles)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let rows = sqlx::query(
            r#"
            SELECT * FROM caseflow_users
            WHERE roles ?| (SELECT array_agg(value #>> '{}')
                            FROM jsonb_array_elements($1::jsonb))
            ORDER BY user_id
            "#,
        )
        .bind(&role_names)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(row_to_user).collect()
    }

    async fn upsert_user(&self, user: UserRecord) -> StorageResult<()> {
        let roles = serde_json::to_value(&user.roles)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO caseflow_users
                (user_id, display_name, roles, active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE
            SET display_name = EXCLUDED.display_name,
                roles = EXCLUDED.roles,
                active = EXCLUDED.active
            "#,
        )
        .bind(&user.user_id.0)
        .bind(&user.display_name)
        .bind(&roles)
        .bind(user.active)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}
