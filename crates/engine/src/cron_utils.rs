use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::{debug, warn};

use taskline_core::errors::{Result, TasklineError};

/// CRON表达式解析和求值工具
pub struct CronEvaluator {
    schedule: Schedule,
}

impl CronEvaluator {
    /// 解析CRON表达式，失败返回InvalidCron
    pub fn new(cron_expr: &str) -> Result<Self> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| TasklineError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self { schedule })
    }

    /// 判断作业此刻是否应当触发
    ///
    /// 以上次触发时间为基准求下一个计划时刻，落在当前时间之前即触发。
    /// 从未触发过的作业向前看一个扫描窗口，避免错过刚好压线的时刻。
    pub fn should_trigger(&self, last_fired: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let check_from = match last_fired {
            Some(last) => last,
            None => now - Duration::minutes(1),
        };

        match self.schedule.after(&check_from).next() {
            Some(next_time) => {
                let should_trigger = next_time <= now;
                if should_trigger {
                    debug!(
                        "周期作业应当触发: 计划时刻={}, 当前时间={}",
                        next_time.format("%Y-%m-%d %H:%M:%S UTC"),
                        now.format("%Y-%m-%d %H:%M:%S UTC")
                    );
                }
                should_trigger
            }
            None => {
                warn!("无法计算下一次执行时间");
                false
            }
        }
    }

    /// 下一次计划执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 校验CRON表达式
    pub fn validate(cron_expr: &str) -> Result<()> {
        Schedule::from_str(cron_expr).map_err(|e| TasklineError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_invalid_expression_rejected() {
        assert!(CronEvaluator::new("not a cron").is_err());
        assert!(CronEvaluator::validate("* * *").is_err());
        assert!(CronEvaluator::validate("*/5 * * * * *").is_ok());
    }

    #[test]
    fn test_should_trigger_after_last_fired() {
        // 每分钟第0秒
        let cron = CronEvaluator::new("0 * * * * *").unwrap();
        let last = Utc.with_ymd_and_hms(2026, 8, 29, 10, 0, 0).unwrap();

        // 下一个计划时刻10:01:00尚未到达
        let now = Utc.with_ymd_and_hms(2026, 8, 29, 10, 0, 30).unwrap();
        assert!(!cron.should_trigger(Some(last), now));

        // 已越过计划时刻
        let now = Utc.with_ymd_and_hms(2026, 8, 29, 10, 1, 2).unwrap();
        assert!(cron.should_trigger(Some(last), now));
    }

    #[test]
    fn test_should_trigger_never_fired() {
        let cron = CronEvaluator::new("*/5 * * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 29, 10, 0, 6).unwrap();
        // 回看窗口内必然存在5秒整点
        assert!(cron.should_trigger(None, now));
    }

    #[test]
    fn test_next_execution_time() {
        let cron = CronEvaluator::new("0 0 9 * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2026, 8, 29, 10, 0, 0).unwrap();
        let next = cron.next_execution_time(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 8, 30, 9, 0, 0).unwrap());
    }
}
