use chrono::{DateTime, NaiveTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

use taskline_core::errors::{Result, TasklineError};
use taskline_core::models::{
    topics, JobBinding, JobKind, JobPayload, Patch, Task, TaskFilter, TaskStatus,
};
use taskline_core::traits::{ScheduleRepository, TaskRepository};
use taskline_engine::CronEvaluator;

use crate::job_service::JobService;

/// 创建任务请求
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub schedule_id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub repeat: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub fixed: Option<bool>,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
}

/// 更新任务请求
///
/// 可空字段使用三态Patch：未出现的字段不产生任何作业动作，显式null
/// 触发撤销，携带值触发改期或新调度。这一区分贯穿整条调用链。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateTaskRequest {
    pub schedule_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<i32>,
    pub fixed: Option<bool>,
    pub description: Patch<String>,
    pub due_to: Patch<DateTime<Utc>>,
    pub repeat: Patch<String>,
    pub start_time: Patch<NaiveTime>,
    pub end_time: Patch<NaiveTime>,
}

/// 任务生命周期服务
///
/// 负责任务CRUD，并把`due_to`/`repeat`字段变化绑定到作业动作：行
/// 更新先提交，随后执行作业对账；对账失败时整个调用报错，不静默
/// 留下半套状态。
pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    schedules: Arc<dyn ScheduleRepository>,
    jobs: Arc<JobService>,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        schedules: Arc<dyn ScheduleRepository>,
        jobs: Arc<JobService>,
    ) -> Self {
        Self {
            tasks,
            schedules,
            jobs,
        }
    }

    /// 创建任务，按需调度到期/重复作业
    #[instrument(skip(self, request), fields(schedule_id = %request.schedule_id))]
    pub async fn create(&self, request: CreateTaskRequest) -> Result<Task> {
        self.ensure_schedule_exists(&request.schedule_id).await?;

        if let Some(due_to) = request.due_to {
            Self::ensure_future(due_to)?;
        }
        if let Some(repeat) = request.repeat.as_deref() {
            CronEvaluator::validate(repeat)?;
        }

        let mut task = Task::new(request.schedule_id, request.user_id, request.name);
        task.description = request.description;
        task.due_to = request.due_to;
        task.repeat = request.repeat;
        task.priority = request.priority.unwrap_or(0);
        task.fixed = request.fixed.unwrap_or(false);
        task.start_time = request.start_time;
        task.end_time = request.end_time;

        self.tasks.create(&task).await?;

        if let Some(due_to) = task.due_to {
            self.schedule_due_job(&task, due_to).await?;
        }
        if let Some(repeat) = task.repeat.clone() {
            self.schedule_repeat_job(&task, &repeat).await?;
        }

        info!("任务已创建: {}", task.id);
        Ok(task)
    }

    /// 更新任务并对账作业绑定
    #[instrument(skip(self, request), fields(task_id = %task_id))]
    pub async fn update(&self, task_id: &str, request: UpdateTaskRequest) -> Result<Task> {
        let mut task = self.get(task_id).await?;

        if let Some(schedule_id) = &request.schedule_id {
            self.ensure_schedule_exists(schedule_id).await?;
            task.schedule_id = schedule_id.clone();
        }

        // 作业相关字段先做输入校验，再动任何状态
        if let Patch::Set(due_to) = &request.due_to {
            Self::ensure_future(*due_to)?;
        }
        if let Patch::Set(repeat) = &request.repeat {
            CronEvaluator::validate(repeat)?;
        }

        if let Some(name) = request.name {
            task.name = name;
        }
        if let Some(status) = request.status {
            task.status = status;
        }
        if let Some(priority) = request.priority {
            task.priority = priority;
        }
        if let Some(fixed) = request.fixed {
            task.fixed = fixed;
        }
        task.description = request.description.clone().apply_to(task.description.take());
        task.due_to = request.due_to.clone().apply_to(task.due_to.take());
        task.repeat = request.repeat.clone().apply_to(task.repeat.take());
        task.start_time = request.start_time.clone().apply_to(task.start_time.take());
        task.end_time = request.end_time.clone().apply_to(task.end_time.take());
        task.updated_at = Utc::now();

        // 行更新先提交，对账读到的绑定才是一致的
        if !self.tasks.save(&task).await? {
            return Err(TasklineError::TaskNotFound {
                id: task_id.to_string(),
            });
        }

        self.reconcile_due(&task, &request.due_to).await?;
        self.reconcile_repeat(&task, &request.repeat).await?;

        info!("任务已更新: {}", task.id);
        Ok(task)
    }

    /// 删除任务，先撤销名下全部作业
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn remove(&self, task_id: &str) -> Result<Task> {
        let task = self.get(task_id).await?;

        for binding in self.jobs.find_by_task_id(task_id).await? {
            match binding.kind {
                JobKind::Single => self.jobs.unschedule_single(&binding.job_id).await?,
                JobKind::Cron => self.jobs.unschedule_cron(&binding.job_id).await?,
            }
        }

        self.tasks.delete(task_id).await?;
        info!("任务已删除: {}", task_id);
        Ok(task)
    }

    /// 按ID查询任务，不存在返回TaskNotFound
    pub async fn get(&self, task_id: &str) -> Result<Task> {
        self.tasks
            .find_one(task_id)
            .await?
            .ok_or_else(|| TasklineError::TaskNotFound {
                id: task_id.to_string(),
            })
    }

    /// 按条件查询任务列表
    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.tasks.find(filter).await
    }

    async fn reconcile_due(&self, task: &Task, patch: &Patch<DateTime<Utc>>) -> Result<()> {
        match patch {
            Patch::Set(due_to) => {
                match self.find_binding(&task.id, JobKind::Single).await? {
                    Some(binding) => {
                        match self.jobs.reschedule_single(&binding.job_id, *due_to).await {
                            Ok(_) => {}
                            // 绑定指向已触发删除的作业时清掉旧绑定重新调度
                            Err(TasklineError::JobNotFound { .. }) => {
                                self.jobs.unschedule_single(&binding.job_id).await?;
                                self.schedule_due_job(task, *due_to).await?;
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    None => {
                        self.schedule_due_job(task, *due_to).await?;
                    }
                }
            }
            Patch::Clear => {
                if let Some(binding) = self.find_binding(&task.id, JobKind::Single).await? {
                    self.jobs.unschedule_single(&binding.job_id).await?;
                }
            }
            Patch::Keep => {}
        }
        Ok(())
    }

    async fn reconcile_repeat(&self, task: &Task, patch: &Patch<String>) -> Result<()> {
        match patch {
            Patch::Set(pattern) => {
                match self.find_binding(&task.id, JobKind::Cron).await? {
                    Some(binding) => {
                        self.jobs
                            .reschedule_cron(
                                &binding.job_id,
                                pattern,
                                &format!("repeat:{}", task.id),
                                Self::payload(task),
                                topics::JOB_REPEATED,
                            )
                            .await?;
                    }
                    None => {
                        self.schedule_repeat_job(task, pattern).await?;
                    }
                }
            }
            Patch::Clear => {
                if let Some(binding) = self.find_binding(&task.id, JobKind::Cron).await? {
                    self.jobs.unschedule_cron(&binding.job_id).await?;
                }
            }
            Patch::Keep => {}
        }
        Ok(())
    }

    async fn schedule_due_job(&self, task: &Task, due_to: DateTime<Utc>) -> Result<()> {
        self.jobs
            .schedule_single(
                &format!("due:{}", task.id),
                due_to,
                Self::payload(task),
                topics::JOB_DUE,
                &task.id,
            )
            .await?;
        Ok(())
    }

    async fn schedule_repeat_job(&self, task: &Task, pattern: &str) -> Result<()> {
        self.jobs
            .schedule_cron(
                &format!("cron:{}", task.id),
                pattern,
                &format!("repeat:{}", task.id),
                Self::payload(task),
                topics::JOB_REPEATED,
                &task.id,
            )
            .await?;
        Ok(())
    }

    async fn find_binding(&self, task_id: &str, kind: JobKind) -> Result<Option<JobBinding>> {
        Ok(self
            .jobs
            .find_by_task_id(task_id)
            .await?
            .into_iter()
            .find(|b| b.kind == kind))
    }

    async fn ensure_schedule_exists(&self, schedule_id: &str) -> Result<()> {
        self.schedules
            .find_one(schedule_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| TasklineError::ScheduleNotFound {
                id: schedule_id.to_string(),
            })
    }

    fn ensure_future(due_to: DateTime<Utc>) -> Result<()> {
        if due_to < Utc::now() {
            return Err(TasklineError::InvalidSchedule {
                message: format!("到期时间已过: {due_to}"),
            });
        }
        Ok(())
    }

    fn payload(task: &Task) -> JobPayload {
        JobPayload {
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            user_id: task.user_id.clone(),
        }
    }
}
