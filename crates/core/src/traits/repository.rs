//! 仓储抽象接口
//!
//! 持久层统一约定：查询未命中返回`None`/空集合而不是错误，由调用方
//! 决定映射为哪个领域错误；删除与条件更新返回是否命中行。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::models::{JobBinding, JobKind, Schedule, ScheduledJob, Task, TaskFilter, TaskStatus};

/// 任务仓储接口
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 插入新任务
    async fn create(&self, task: &Task) -> Result<()>;

    /// 按ID查询任务
    async fn find_one(&self, id: &str) -> Result<Option<Task>>;

    /// 按过滤条件查询任务列表
    async fn find(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// 整行更新，返回是否命中
    async fn save(&self, task: &Task) -> Result<bool>;

    /// 仅更新状态与更新时间，返回是否命中
    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<bool>;

    /// 删除任务，返回是否命中
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// 日程仓储接口
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn create(&self, schedule: &Schedule) -> Result<()>;

    async fn find_one(&self, id: &str) -> Result<Option<Schedule>>;

    async fn delete(&self, id: &str) -> Result<bool>;
}

/// 作业仓储接口（引擎的持久化存储）
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 插入新作业
    async fn insert(&self, job: &ScheduledJob) -> Result<()>;

    /// 按ID原子upsert（周期性作业的替换语义）
    async fn upsert(&self, job: &ScheduledJob) -> Result<()>;

    /// 按ID查询作业
    async fn find_one(&self, id: &str) -> Result<Option<ScheduledJob>>;

    /// 原子更新一次性作业的触发时间，保留名称与负载，返回是否命中
    async fn update_next_fire_time(&self, id: &str, when: DateTime<Utc>) -> Result<bool>;

    /// 记录周期性作业最近一次触发时间，返回是否命中
    async fn mark_fired(&self, id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// 删除指定类型的作业，返回是否命中
    async fn remove(&self, id: &str, kind: JobKind) -> Result<bool>;

    /// 触发时间已到的一次性作业
    async fn due_singles(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>>;

    /// 全部周期性作业
    async fn active_crons(&self) -> Result<Vec<ScheduledJob>>;
}

/// 作业绑定仓储接口
///
/// 外键约束保证绑定只能指向存在的任务，违反时返回Constraint错误。
#[async_trait]
pub trait JobBindingRepository: Send + Sync {
    async fn save(&self, binding: &JobBinding) -> Result<()>;

    async fn find_by_task_id(&self, task_id: &str) -> Result<Vec<JobBinding>>;

    async fn find_one(&self, job_id: &str) -> Result<Option<JobBinding>>;

    /// 删除绑定，返回是否有行被删除
    async fn remove(&self, job_id: &str) -> Result<bool>;
}
