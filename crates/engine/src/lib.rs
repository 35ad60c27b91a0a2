//! # Taskline Engine
//!
//! 作业执行引擎：持久化的一次性/周期性作业调度原语与触发调度循环。

pub mod cron_utils;
pub mod dispatcher;
pub mod engine;

pub use cron_utils::CronEvaluator;
pub use dispatcher::JobDispatcher;
pub use engine::JobEngine;
