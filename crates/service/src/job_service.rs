use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, instrument, warn};

use taskline_core::errors::{Result, TasklineError};
use taskline_core::models::{JobBinding, JobKind, JobPayload, ScheduledJob};
use taskline_core::traits::JobBindingRepository;
use taskline_engine::JobEngine;

/// 作业服务门面
///
/// 生命周期控制器访问作业的唯一入口：把引擎调用与绑定表的簿记合成
/// 一个操作，使任务名下的作业在引擎重启后仍可按任务ID查回。
pub struct JobService {
    engine: Arc<JobEngine>,
    bindings: Arc<dyn JobBindingRepository>,
}

impl JobService {
    pub fn new(engine: Arc<JobEngine>, bindings: Arc<dyn JobBindingRepository>) -> Self {
        Self { engine, bindings }
    }

    /// 调度一次性作业并登记绑定
    ///
    /// 引擎成功而绑定落库失败时产生一个未登记的游离作业。不做补偿
    /// 撤销（失败可能发生在响应路径而非写入本身），记录error日志供
    /// 人工对账，错误原样上抛。
    #[instrument(skip(self, payload), fields(task_id = %task_id))]
    pub async fn schedule_single(
        &self,
        name: &str,
        execution_date: DateTime<Utc>,
        payload: JobPayload,
        ack_event: &str,
        task_id: &str,
    ) -> Result<ScheduledJob> {
        let job = self
            .engine
            .schedule_single(name, execution_date, payload, ack_event)
            .await?;

        let binding = JobBinding::new(job.id.clone(), JobKind::Single, task_id.to_string());
        if let Err(e) = self.bindings.save(&binding).await {
            error!(
                job_id = %job.id,
                task_id = %task_id,
                "一次性作业已创建但绑定保存失败，作业处于未登记状态: {e}"
            );
            return Err(e);
        }
        Ok(job)
    }

    /// 调度周期性作业并登记绑定
    #[instrument(skip(self, payload), fields(task_id = %task_id, key = %key))]
    pub async fn schedule_cron(
        &self,
        key: &str,
        pattern: &str,
        name: &str,
        payload: JobPayload,
        ack_event: &str,
        task_id: &str,
    ) -> Result<ScheduledJob> {
        let job = self
            .engine
            .schedule_cron(key, pattern, name, payload, ack_event)
            .await?;

        let binding = JobBinding::new(job.id.clone(), JobKind::Cron, task_id.to_string());
        if let Err(e) = self.bindings.save(&binding).await {
            error!(
                job_id = %job.id,
                task_id = %task_id,
                "周期作业已创建但绑定保存失败，作业处于未登记状态: {e}"
            );
            return Err(e);
        }
        Ok(job)
    }

    /// 一次性作业改期，纯引擎转发——绑定关系不变
    pub async fn reschedule_single(
        &self,
        job_id: &str,
        new_execution_date: DateTime<Utc>,
    ) -> Result<ScheduledJob> {
        self.engine.reschedule_single(job_id, new_execution_date).await
    }

    /// 周期作业改写模式，按键upsert——绑定关系不变
    pub async fn reschedule_cron(
        &self,
        key: &str,
        pattern: &str,
        name: &str,
        payload: JobPayload,
        ack_event: &str,
    ) -> Result<ScheduledJob> {
        self.engine
            .schedule_cron(key, pattern, name, payload, ack_event)
            .await
    }

    /// 撤销一次性作业并删除绑定
    ///
    /// 引擎侧作业已不存在时按成功处理（调用方本就预期删除），只清理
    /// 绑定行。
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn unschedule_single(&self, job_id: &str) -> Result<()> {
        match self.engine.unschedule_single(job_id).await {
            Ok(()) => {}
            Err(TasklineError::JobNotFound { .. }) => {
                warn!("撤销的一次性作业在引擎中不存在: {}", job_id);
            }
            Err(e) => return Err(e),
        }

        if !self.bindings.remove(job_id).await? {
            warn!("作业 {} 的绑定记录不存在", job_id);
        }
        Ok(())
    }

    /// 撤销周期性作业并删除绑定
    #[instrument(skip(self), fields(key = %key))]
    pub async fn unschedule_cron(&self, key: &str) -> Result<()> {
        match self.engine.unschedule_cron(key).await {
            Ok(()) => {}
            Err(TasklineError::JobNotFound { .. }) => {
                warn!("撤销的周期作业在引擎中不存在: {}", key);
            }
            Err(e) => return Err(e),
        }

        if !self.bindings.remove(key).await? {
            warn!("作业 {} 的绑定记录不存在", key);
        }
        Ok(())
    }

    /// 查询任务名下的作业绑定，控制器据此区分改期与新调度
    pub async fn find_by_task_id(&self, task_id: &str) -> Result<Vec<JobBinding>> {
        self.bindings.find_by_task_id(task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use mockall::mock;
    use taskline_infrastructure::{connect_in_memory, SqliteJobRepository};

    mock! {
        BindingRepo {}

        #[async_trait]
        impl JobBindingRepository for BindingRepo {
            async fn save(&self, binding: &JobBinding) -> Result<()>;
            async fn find_by_task_id(&self, task_id: &str) -> Result<Vec<JobBinding>>;
            async fn find_one(&self, job_id: &str) -> Result<Option<JobBinding>>;
            async fn remove(&self, job_id: &str) -> Result<bool>;
        }
    }

    fn payload() -> JobPayload {
        JobPayload {
            task_id: "t-1".to_string(),
            task_name: "t".to_string(),
            user_id: "u-1".to_string(),
        }
    }

    async fn engine() -> Arc<JobEngine> {
        let pool = connect_in_memory().await.unwrap();
        Arc::new(JobEngine::new(Arc::new(SqliteJobRepository::new(pool))))
    }

    #[tokio::test]
    async fn test_binding_failure_propagates_after_engine_success() {
        let engine = engine().await;
        let mut bindings = MockBindingRepo::new();
        bindings
            .expect_save()
            .returning(|_| Err(TasklineError::Constraint("绑定引用的任务不存在".to_string())));

        let service = JobService::new(engine.clone(), Arc::new(bindings));
        let err = service
            .schedule_single(
                "due",
                Utc::now() + Duration::seconds(5),
                payload(),
                "jobs.due",
                "ghost-task",
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), taskline_core::ErrorKind::Constraint);
        // 引擎侧作业仍然存在（游离），不做补偿删除
    }

    #[tokio::test]
    async fn test_unschedule_tolerates_missing_engine_job() {
        let engine = engine().await;
        let mut bindings = MockBindingRepo::new();
        bindings.expect_remove().returning(|_| Ok(true));

        let service = JobService::new(engine, Arc::new(bindings));
        // 引擎里没有这个作业，按成功处理并清理绑定
        service.unschedule_single("ghost-job").await.unwrap();
    }
}
