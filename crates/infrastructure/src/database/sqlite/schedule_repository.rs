use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use taskline_core::errors::Result;
use taskline_core::models::Schedule;
use taskline_core::traits::ScheduleRepository;

/// SQLite日程仓储
pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_schedule(row: &sqlx::sqlite::SqliteRow) -> Result<Schedule> {
        Ok(Schedule {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    #[instrument(skip(self, schedule), fields(schedule_id = %schedule.id))]
    async fn create(&self, schedule: &Schedule) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO schedules (id, user_id, name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&schedule.id)
        .bind(&schedule.user_id)
        .bind(&schedule.name)
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .execute(&self.pool)
        .await?;

        debug!("创建日程成功: {}", schedule.id);
        Ok(())
    }

    #[instrument(skip(self), fields(schedule_id = %id))]
    async fn find_one(&self, id: &str) -> Result<Option<Schedule>> {
        let row = sqlx::query(
            "SELECT id, user_id, name, created_at, updated_at FROM schedules WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_schedule).transpose()
    }

    #[instrument(skip(self), fields(schedule_id = %id))]
    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::connect_in_memory;

    #[tokio::test]
    async fn test_create_find_delete() {
        let pool = connect_in_memory().await.unwrap();
        let repo = SqliteScheduleRepository::new(pool);

        let schedule = Schedule::new("u-1".to_string(), "工作".to_string());
        repo.create(&schedule).await.unwrap();

        let found = repo.find_one(&schedule.id).await.unwrap().unwrap();
        assert_eq!(found.name, "工作");

        assert!(repo.delete(&schedule.id).await.unwrap());
        assert!(repo.find_one(&schedule.id).await.unwrap().is_none());
    }
}
