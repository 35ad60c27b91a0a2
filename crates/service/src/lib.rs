//! 任务生命周期服务层
//!
//! 组合核心模型、作业引擎与事件总线，提供任务CRUD、作业绑定簿记
//! 以及确认事件的消费处理。

pub mod handlers;
pub mod job_service;
pub mod task_service;
pub mod worker;

pub use handlers::TaskEventHandlers;
pub use job_service::JobService;
pub use task_service::{CreateTaskRequest, TaskService, UpdateTaskRequest};
pub use worker::LifecycleWorker;
