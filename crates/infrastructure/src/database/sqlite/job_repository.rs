use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use taskline_core::errors::Result;
use taskline_core::models::{JobKind, JobPayload, ScheduledJob};
use taskline_core::traits::JobRepository;

/// SQLite作业仓储
///
/// 引擎的持久化存储。一次性作业按`next_fire_time`扫描，周期性作业
/// 整表拉取后由CRON求值决定是否触发。
pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Result<ScheduledJob> {
        let payload_json: String = row.try_get("payload")?;
        let payload: JobPayload = serde_json::from_str(&payload_json)?;

        Ok(ScheduledJob {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            kind: row.try_get("kind")?,
            next_fire_time: row.try_get("next_fire_time")?,
            cron_pattern: row.try_get("cron_pattern")?,
            last_fired_at: row.try_get("last_fired_at")?,
            payload,
            ack_event: row.try_get("ack_event")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

const JOB_COLUMNS: &str =
    "id, name, kind, next_fire_time, cron_pattern, last_fired_at, payload, ack_event, created_at";

#[async_trait]
impl JobRepository for SqliteJobRepository {
    #[instrument(skip(self, job), fields(job_id = %job.id, kind = %job.kind.as_str()))]
    async fn insert(&self, job: &ScheduledJob) -> Result<()> {
        let payload_json = serde_json::to_string(&job.payload)?;

        sqlx::query(
            r#"
            INSERT INTO scheduled_jobs (id, name, kind, next_fire_time, cron_pattern,
                                        last_fired_at, payload, ack_event, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&job.id)
        .bind(&job.name)
        .bind(job.kind)
        .bind(job.next_fire_time)
        .bind(&job.cron_pattern)
        .bind(job.last_fired_at)
        .bind(payload_json)
        .bind(&job.ack_event)
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;

        debug!("插入作业成功: {}", job.id);
        Ok(())
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, kind = %job.kind.as_str()))]
    async fn upsert(&self, job: &ScheduledJob) -> Result<()> {
        let payload_json = serde_json::to_string(&job.payload)?;

        // 替换语义：同键作业的模式与负载原子更新，保留最近触发记录
        sqlx::query(
            r#"
            INSERT INTO scheduled_jobs (id, name, kind, next_fire_time, cron_pattern,
                                        last_fired_at, payload, ack_event, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                next_fire_time = excluded.next_fire_time,
                cron_pattern = excluded.cron_pattern,
                payload = excluded.payload,
                ack_event = excluded.ack_event
            "#,
        )
        .bind(&job.id)
        .bind(&job.name)
        .bind(job.kind)
        .bind(job.next_fire_time)
        .bind(&job.cron_pattern)
        .bind(job.last_fired_at)
        .bind(payload_json)
        .bind(&job.ack_event)
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn find_one(&self, id: &str) -> Result<Option<ScheduledJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scheduled_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn update_next_fire_time(&self, id: &str, when: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scheduled_jobs SET next_fire_time = $2 WHERE id = $1 AND kind = 'SINGLE'",
        )
        .bind(id)
        .bind(when)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn mark_fired(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE scheduled_jobs SET last_fired_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(job_id = %id, kind = %kind.as_str()))]
    async fn remove(&self, id: &str, kind: JobKind) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scheduled_jobs WHERE id = $1 AND kind = $2")
            .bind(id)
            .bind(kind)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn due_singles(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scheduled_jobs \
             WHERE kind = 'SINGLE' AND next_fire_time <= $1 \
             ORDER BY next_fire_time"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_job).collect()
    }

    #[instrument(skip(self))]
    async fn active_crons(&self) -> Result<Vec<ScheduledJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scheduled_jobs WHERE kind = 'CRON' ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_job).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::connect_in_memory;
    use chrono::Duration;

    fn payload() -> JobPayload {
        JobPayload {
            task_id: "t-1".to_string(),
            task_name: "t".to_string(),
            user_id: "u-1".to_string(),
        }
    }

    async fn repo() -> SqliteJobRepository {
        SqliteJobRepository::new(connect_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = repo().await;
        let job = ScheduledJob::single(
            "due:t-1".to_string(),
            Utc::now() + Duration::seconds(5),
            payload(),
            "jobs.due".to_string(),
        );
        repo.insert(&job).await.unwrap();

        let found = repo.find_one(&job.id).await.unwrap().unwrap();
        assert_eq!(found.kind, JobKind::Single);
        assert_eq!(found.payload, job.payload);
        assert_eq!(found.ack_event, "jobs.due");
    }

    #[tokio::test]
    async fn test_due_singles_only_returns_due() {
        let repo = repo().await;
        let now = Utc::now();
        let due = ScheduledJob::single(
            "a".to_string(),
            now - Duration::seconds(1),
            payload(),
            "jobs.due".to_string(),
        );
        let later = ScheduledJob::single(
            "b".to_string(),
            now + Duration::seconds(60),
            payload(),
            "jobs.due".to_string(),
        );
        repo.insert(&due).await.unwrap();
        repo.insert(&later).await.unwrap();

        let found = repo.due_singles(now).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
    }

    #[tokio::test]
    async fn test_upsert_replaces_pattern() {
        let repo = repo().await;
        let job = ScheduledJob::cron(
            "cron:t-1".to_string(),
            "0 0 9 * * *".to_string(),
            "repeat:t-1".to_string(),
            payload(),
            "jobs.repeated".to_string(),
        );
        repo.upsert(&job).await.unwrap();

        let mut replaced = job.clone();
        replaced.cron_pattern = Some("0 0 18 * * *".to_string());
        repo.upsert(&replaced).await.unwrap();

        let found = repo.find_one("cron:t-1").await.unwrap().unwrap();
        assert_eq!(found.cron_pattern.as_deref(), Some("0 0 18 * * *"));

        let crons = repo.active_crons().await.unwrap();
        assert_eq!(crons.len(), 1);
    }

    #[tokio::test]
    async fn test_update_next_fire_time_preserves_payload() {
        let repo = repo().await;
        let job = ScheduledJob::single(
            "due:t-1".to_string(),
            Utc::now() + Duration::seconds(5),
            payload(),
            "jobs.due".to_string(),
        );
        repo.insert(&job).await.unwrap();

        let new_time = Utc::now() + Duration::seconds(10);
        assert!(repo.update_next_fire_time(&job.id, new_time).await.unwrap());

        let found = repo.find_one(&job.id).await.unwrap().unwrap();
        assert_eq!(found.payload, job.payload);
        assert_eq!(found.name, job.name);
        assert_eq!(
            found.next_fire_time.unwrap().timestamp(),
            new_time.timestamp()
        );

        // 不存在的作业不命中
        assert!(!repo.update_next_fire_time("missing", new_time).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_respects_kind() {
        let repo = repo().await;
        let job = ScheduledJob::single(
            "a".to_string(),
            Utc::now(),
            payload(),
            "jobs.due".to_string(),
        );
        repo.insert(&job).await.unwrap();

        assert!(!repo.remove(&job.id, JobKind::Cron).await.unwrap());
        assert!(repo.remove(&job.id, JobKind::Single).await.unwrap());
        assert!(repo.find_one(&job.id).await.unwrap().is_none());
    }
}
