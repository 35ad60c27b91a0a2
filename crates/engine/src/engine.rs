use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument};

use taskline_core::errors::{Result, TasklineError};
use taskline_core::models::{JobKind, JobPayload, ScheduledJob};
use taskline_core::traits::JobRepository;

use crate::cron_utils::CronEvaluator;

/// 作业执行引擎
///
/// 与具体业务无关的持久化延迟/周期执行原语。所有操作落在作业表的
/// 单条语句上，要么完整生效要么无部分状态；触发由独立的调度循环
/// 扫描完成，进程重启后未触发的作业自然恢复。
pub struct JobEngine {
    jobs: Arc<dyn JobRepository>,
}

impl JobEngine {
    pub fn new(jobs: Arc<dyn JobRepository>) -> Self {
        Self { jobs }
    }

    /// 调度一次性作业，返回引擎分配ID的作业
    ///
    /// 执行时间严格早于当前时刻的请求拒绝；等于当前时刻（延迟为0）
    /// 接受，在下一轮扫描立即触发。
    #[instrument(skip(self, payload), fields(name = %name))]
    pub async fn schedule_single(
        &self,
        name: &str,
        execution_date: DateTime<Utc>,
        payload: JobPayload,
        ack_event: &str,
    ) -> Result<ScheduledJob> {
        Self::ensure_not_past(execution_date)?;

        let job = ScheduledJob::single(
            name.to_string(),
            execution_date,
            payload,
            ack_event.to_string(),
        );
        self.jobs.insert(&job).await?;

        info!("一次性作业已调度: {} @ {}", job.id, execution_date);
        Ok(job)
    }

    /// 按键upsert周期性作业
    ///
    /// 同键作业已存在时其模式与负载被原子替换，触发无间隙；边界附近
    /// 的重复触发可以接受（至少一次语义）。
    #[instrument(skip(self, payload), fields(key = %key, pattern = %pattern))]
    pub async fn schedule_cron(
        &self,
        key: &str,
        pattern: &str,
        name: &str,
        payload: JobPayload,
        ack_event: &str,
    ) -> Result<ScheduledJob> {
        CronEvaluator::validate(pattern)?;

        let job = ScheduledJob::cron(
            key.to_string(),
            pattern.to_string(),
            name.to_string(),
            payload,
            ack_event.to_string(),
        );
        self.jobs.upsert(&job).await?;

        info!("周期性作业已调度: {} [{}]", key, pattern);
        Ok(job)
    }

    /// 原子改写一次性作业的触发时间，名称与负载保持不变
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn reschedule_single(
        &self,
        job_id: &str,
        new_execution_date: DateTime<Utc>,
    ) -> Result<ScheduledJob> {
        Self::ensure_not_past(new_execution_date)?;

        let hit = self
            .jobs
            .update_next_fire_time(job_id, new_execution_date)
            .await?;
        if !hit {
            return Err(TasklineError::JobNotFound {
                id: job_id.to_string(),
            });
        }

        let job = self
            .jobs
            .find_one(job_id)
            .await?
            .ok_or_else(|| TasklineError::JobNotFound {
                id: job_id.to_string(),
            })?;

        info!("一次性作业已改期: {} @ {}", job_id, new_execution_date);
        Ok(job)
    }

    /// 撤销一次性作业，不存在时返回JobNotFound
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn unschedule_single(&self, job_id: &str) -> Result<()> {
        if !self.jobs.remove(job_id, JobKind::Single).await? {
            return Err(TasklineError::JobNotFound {
                id: job_id.to_string(),
            });
        }
        info!("一次性作业已撤销: {}", job_id);
        Ok(())
    }

    /// 撤销周期性作业，不存在时返回JobNotFound
    #[instrument(skip(self), fields(key = %key))]
    pub async fn unschedule_cron(&self, key: &str) -> Result<()> {
        if !self.jobs.remove(key, JobKind::Cron).await? {
            return Err(TasklineError::JobNotFound {
                id: key.to_string(),
            });
        }
        info!("周期性作业已撤销: {}", key);
        Ok(())
    }

    /// 按ID查询作业
    pub async fn find_job(&self, job_id: &str) -> Result<Option<ScheduledJob>> {
        self.jobs.find_one(job_id).await
    }

    fn ensure_not_past(execution_date: DateTime<Utc>) -> Result<()> {
        if execution_date < Utc::now() {
            return Err(TasklineError::InvalidSchedule {
                message: format!("执行时间已过: {execution_date}"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use taskline_core::ErrorKind;
    use taskline_infrastructure::{connect_in_memory, SqliteJobRepository};

    fn payload() -> JobPayload {
        JobPayload {
            task_id: "t-1".to_string(),
            task_name: "任务".to_string(),
            user_id: "u-1".to_string(),
        }
    }

    async fn engine() -> JobEngine {
        let pool = connect_in_memory().await.unwrap();
        JobEngine::new(Arc::new(SqliteJobRepository::new(pool)))
    }

    #[tokio::test]
    async fn test_schedule_single_rejects_past_date() {
        let engine = engine().await;
        let err = engine
            .schedule_single(
                "due",
                Utc::now() - Duration::seconds(10),
                payload(),
                "jobs.due",
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_schedule_and_reschedule_single() {
        let engine = engine().await;
        let t1 = Utc::now() + Duration::seconds(5);
        let t2 = Utc::now() + Duration::seconds(10);

        let job = engine
            .schedule_single("due", t1, payload(), "jobs.due")
            .await
            .unwrap();

        let moved = engine.reschedule_single(&job.id, t2).await.unwrap();
        assert_eq!(moved.id, job.id);
        assert_eq!(moved.payload, job.payload);
        assert_eq!(moved.next_fire_time.unwrap().timestamp(), t2.timestamp());
    }

    #[tokio::test]
    async fn test_reschedule_missing_job_not_found() {
        let engine = engine().await;
        let err = engine
            .reschedule_single("ghost", Utc::now() + Duration::seconds(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_schedule_cron_validates_pattern() {
        let engine = engine().await;
        let err = engine
            .schedule_cron("cron:t-1", "bogus", "repeat", payload(), "jobs.repeated")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_schedule_cron_upserts_by_key() {
        let engine = engine().await;
        engine
            .schedule_cron("cron:t-1", "0 0 9 * * *", "repeat", payload(), "jobs.repeated")
            .await
            .unwrap();
        let replaced = engine
            .schedule_cron("cron:t-1", "0 30 9 * * *", "repeat", payload(), "jobs.repeated")
            .await
            .unwrap();

        assert_eq!(replaced.id, "cron:t-1");
        let found = engine.find_job("cron:t-1").await.unwrap().unwrap();
        assert_eq!(found.cron_pattern.as_deref(), Some("0 30 9 * * *"));
    }

    #[tokio::test]
    async fn test_unschedule_missing_is_not_found() {
        let engine = engine().await;
        let err = engine.unschedule_single("ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = engine.unschedule_cron("ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
