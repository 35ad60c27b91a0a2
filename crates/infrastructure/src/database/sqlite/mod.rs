//! 嵌入式SQLite持久层
//!
//! 所有仓储共享一个连接池，启用外键约束与WAL模式，建表语句在启动时
//! 幂等执行。

pub mod binding_repository;
pub mod job_repository;
pub mod schedule_repository;
pub mod task_repository;

pub use binding_repository::SqliteJobBindingRepository;
pub use job_repository::SqliteJobRepository;
pub use schedule_repository::SqliteScheduleRepository;
pub use task_repository::SqliteTaskRepository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::debug;

use taskline_core::errors::{Result, TasklineError};

/// 创建嵌入式SQLite连接池并初始化表结构
pub async fn connect(database_path: &str, max_connections: u32) -> Result<SqlitePool> {
    debug!("创建嵌入式SQLite连接池: {}", database_path);

    let connect_options = SqliteConnectOptions::from_str(database_path)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .connect_with(connect_options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// 创建内存库连接池，测试与memory模式使用
///
/// 内存库随最后一个连接关闭而消失，连接数固定为1避免看到空库。
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// 运行数据库迁移
async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    debug!("执行SQLite数据库迁移");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedules (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            schedule_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'NOT_STARTED',
            due_to DATETIME,
            repeat TEXT,
            priority INTEGER NOT NULL DEFAULT 0,
            fixed INTEGER NOT NULL DEFAULT 0,
            start_time TIME,
            end_time TIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (schedule_id) REFERENCES schedules(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scheduled_jobs (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            next_fire_time DATETIME,
            cron_pattern TEXT,
            last_fired_at DATETIME,
            payload TEXT NOT NULL,
            ack_event TEXT NOT NULL,
            created_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_jobs (
            job_id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            task_id TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            FOREIGN KEY (task_id) REFERENCES tasks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    let indexes = vec![
        "CREATE INDEX IF NOT EXISTS idx_tasks_schedule_id ON tasks(schedule_id)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_user_id ON tasks(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
        "CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_kind ON scheduled_jobs(kind)",
        "CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_next_fire_time ON scheduled_jobs(next_fire_time)",
        "CREATE INDEX IF NOT EXISTS idx_task_jobs_task_id ON task_jobs(task_id)",
    ];

    for index_sql in indexes {
        sqlx::query(index_sql).execute(pool).await?;
    }

    debug!("SQLite数据库迁移完成");
    Ok(())
}

/// 外键冲突转换为领域层的Constraint错误，其余数据库错误原样传递
pub(crate) fn map_constraint(err: sqlx::Error, detail: &str) -> TasklineError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.message().contains("FOREIGN KEY constraint failed") {
            return TasklineError::Constraint(detail.to_string());
        }
    }
    TasklineError::Database(err)
}
