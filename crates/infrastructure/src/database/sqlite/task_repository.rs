use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use taskline_core::errors::Result;
use taskline_core::models::{Task, TaskFilter, TaskStatus};
use taskline_core::traits::TaskRepository;

use super::map_constraint;

/// SQLite任务仓储
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task> {
        Ok(Task {
            id: row.try_get("id")?,
            schedule_id: row.try_get("schedule_id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            status: row.try_get("status")?,
            due_to: row.try_get("due_to")?,
            repeat: row.try_get("repeat")?,
            priority: row.try_get("priority")?,
            fixed: row.try_get("fixed")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const TASK_COLUMNS: &str = "id, schedule_id, user_id, name, description, status, due_to, repeat, \
                            priority, fixed, start_time, end_time, created_at, updated_at";

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self, task), fields(task_id = %task.id, task_name = %task.name))]
    async fn create(&self, task: &Task) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, schedule_id, user_id, name, description, status, due_to, repeat,
                               priority, fixed, start_time, end_time, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(&task.id)
        .bind(&task.schedule_id)
        .bind(&task.user_id)
        .bind(&task.name)
        .bind(&task.description)
        .bind(task.status)
        .bind(task.due_to)
        .bind(&task.repeat)
        .bind(task.priority)
        .bind(task.fixed)
        .bind(task.start_time)
        .bind(task.end_time)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_constraint(e, "任务引用的日程不存在"))?;

        debug!("创建任务成功: {}", task.id);
        Ok(())
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn find_one(&self, id: &str) -> Result<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_task(&row)?)),
            None => {
                debug!("查询任务不存在: {}", id);
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, filter))]
    async fn find(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1=1");
        if filter.schedule_id.is_some() {
            sql.push_str(" AND schedule_id = ?");
        }
        if filter.user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY created_at");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }
        if filter.offset.is_some() {
            sql.push_str(" OFFSET ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(schedule_id) = &filter.schedule_id {
            query = query.bind(schedule_id);
        }
        if let Some(user_id) = &filter.user_id {
            query = query.bind(user_id);
        }
        if let Some(status) = filter.status {
            query = query.bind(status);
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit);
        }
        if let Some(offset) = filter.offset {
            query = query.bind(offset);
        }

        let rows = query.fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_task).collect()
    }

    #[instrument(skip(self, task), fields(task_id = %task.id))]
    async fn save(&self, task: &Task) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET schedule_id = $2, user_id = $3, name = $4, description = $5, status = $6,
                due_to = $7, repeat = $8, priority = $9, fixed = $10,
                start_time = $11, end_time = $12, updated_at = $13
            WHERE id = $1
            "#,
        )
        .bind(&task.id)
        .bind(&task.schedule_id)
        .bind(&task.user_id)
        .bind(&task.name)
        .bind(&task.description)
        .bind(task.status)
        .bind(task.due_to)
        .bind(&task.repeat)
        .bind(task.priority)
        .bind(task.fixed)
        .bind(task.start_time)
        .bind(task.end_time)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_constraint(e, "任务引用的日程不存在"))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(task_id = %id, status = %status.as_str()))]
    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET status = $2, updated_at = datetime('now') WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
