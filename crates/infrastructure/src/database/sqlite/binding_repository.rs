use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use taskline_core::errors::Result;
use taskline_core::models::JobBinding;
use taskline_core::traits::JobBindingRepository;

use super::map_constraint;

/// SQLite作业绑定仓储
///
/// `task_jobs`表的外键保证绑定只能指向存在的任务；`(task_id, kind)`
/// 的唯一性由生命周期逻辑维护，不在表结构上强制。
pub struct SqliteJobBindingRepository {
    pool: SqlitePool,
}

impl SqliteJobBindingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_binding(row: &sqlx::sqlite::SqliteRow) -> Result<JobBinding> {
        Ok(JobBinding {
            job_id: row.try_get("job_id")?,
            kind: row.try_get("kind")?,
            task_id: row.try_get("task_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl JobBindingRepository for SqliteJobBindingRepository {
    #[instrument(skip(self, binding), fields(job_id = %binding.job_id, task_id = %binding.task_id))]
    async fn save(&self, binding: &JobBinding) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO task_jobs (job_id, kind, task_id, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&binding.job_id)
        .bind(binding.kind)
        .bind(&binding.task_id)
        .bind(binding.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_constraint(e, "绑定引用的任务不存在"))?;

        debug!("保存作业绑定: {} -> {}", binding.job_id, binding.task_id);
        Ok(())
    }

    #[instrument(skip(self), fields(task_id = %task_id))]
    async fn find_by_task_id(&self, task_id: &str) -> Result<Vec<JobBinding>> {
        let rows = sqlx::query(
            "SELECT job_id, kind, task_id, created_at FROM task_jobs \
             WHERE task_id = $1 ORDER BY kind",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_binding).collect()
    }

    #[instrument(skip(self), fields(job_id = %job_id))]
    async fn find_one(&self, job_id: &str) -> Result<Option<JobBinding>> {
        let row = sqlx::query(
            "SELECT job_id, kind, task_id, created_at FROM task_jobs WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_binding).transpose()
    }

    #[instrument(skip(self), fields(job_id = %job_id))]
    async fn remove(&self, job_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM task_jobs WHERE job_id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::{
        connect_in_memory, SqliteScheduleRepository, SqliteTaskRepository,
    };
    use taskline_core::models::{JobKind, Schedule, Task};
    use taskline_core::traits::{ScheduleRepository, TaskRepository};

    async fn setup() -> (SqliteJobBindingRepository, Task) {
        let pool = connect_in_memory().await.unwrap();
        let schedules = SqliteScheduleRepository::new(pool.clone());
        let tasks = SqliteTaskRepository::new(pool.clone());

        let schedule = Schedule::new("u-1".to_string(), "s".to_string());
        schedules.create(&schedule).await.unwrap();
        let task = Task::new(schedule.id.clone(), "u-1".to_string(), "t".to_string());
        tasks.create(&task).await.unwrap();

        (SqliteJobBindingRepository::new(pool), task)
    }

    #[tokio::test]
    async fn test_save_and_find_by_task() {
        let (repo, task) = setup().await;
        let single = JobBinding::new("j-1".to_string(), JobKind::Single, task.id.clone());
        let cron = JobBinding::new("j-2".to_string(), JobKind::Cron, task.id.clone());
        repo.save(&single).await.unwrap();
        repo.save(&cron).await.unwrap();

        let found = repo.find_by_task_id(&task.id).await.unwrap();
        assert_eq!(found.len(), 2);

        let one = repo.find_one("j-1").await.unwrap().unwrap();
        assert_eq!(one.kind, JobKind::Single);
    }

    #[tokio::test]
    async fn test_foreign_key_violation_is_constraint() {
        let (repo, _) = setup().await;
        let binding = JobBinding::new("j-1".to_string(), JobKind::Single, "ghost".to_string());
        let err = repo.save(&binding).await.unwrap_err();
        assert_eq!(err.kind(), taskline_core::ErrorKind::Constraint);
    }

    #[tokio::test]
    async fn test_remove_reports_hit() {
        let (repo, task) = setup().await;
        let binding = JobBinding::new("j-1".to_string(), JobKind::Single, task.id.clone());
        repo.save(&binding).await.unwrap();

        assert!(repo.remove("j-1").await.unwrap());
        assert!(!repo.remove("j-1").await.unwrap());
        assert!(repo.find_by_task_id(&task.id).await.unwrap().is_empty());
    }
}
