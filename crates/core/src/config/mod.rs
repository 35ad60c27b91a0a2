//! 应用配置
//!
//! 加载顺序：默认值 -> TOML配置文件 -> 环境变量覆盖（前缀TASKLINE_，
//! 双下划线分隔层级）。配置在进程入口构造一次，按引用注入各组件，
//! 不使用全局单例。

pub mod models;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use models::{DatabaseConfig, EngineConfig, EventBusConfig, WorkerConfig};

/// 系统配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub event_bus: EventBusConfig,
    pub engine: EngineConfig,
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// `config_path`为None时依次尝试默认路径，均不存在则使用默认配置。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/taskline.toml",
                "taskline.toml",
                "/etc/taskline/config.toml",
            ];
            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        // 环境变量覆盖，优先级最高
        builder = builder.add_source(
            Environment::with_prefix("TASKLINE")
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder.build().context("构建配置失败")?;

        // try_deserialize在空配置源时无法落回Default，先转成serde值再填充
        let config: AppConfig = raw
            .try_deserialize::<serde_json::Value>()
            .context("读取配置源失败")
            .and_then(|value| {
                serde_json::from_value(value).context("反序列化配置失败")
            })?;

        config.validate()?;
        Ok(config)
    }

    /// 从TOML字符串加载配置
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    /// 序列化为TOML字符串
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// 校验配置有效性
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.event_bus.validate().context("事件总线配置验证失败")?;
        self.engine.validate().context("引擎配置验证失败")?;
        self.worker.validate().context("消费端配置验证失败")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.event_bus.backend, "memory");
        assert_eq!(config.engine.scan_interval_seconds, 1);
    }

    #[test]
    fn test_from_toml_partial_override() {
        let config = AppConfig::from_toml(
            r#"
            [database]
            path = ":memory:"

            [engine]
            scan_interval_seconds = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.engine.scan_interval_seconds, 5);
        // 未覆盖的节保持默认
        assert_eq!(config.worker.poll_interval_ms, 100);
    }

    #[test]
    fn test_invalid_backend_rejected() {
        let result = AppConfig::from_toml(
            r#"
            [event_bus]
            backend = "kafka"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let toml_str = config.to_toml().unwrap();
        let back = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(back.database.path, config.database.path);
        assert_eq!(back.event_bus.exchange, config.event_bus.exchange);
    }

    #[test]
    fn test_zero_scan_interval_rejected() {
        let result = AppConfig::from_toml(
            r#"
            [engine]
            scan_interval_seconds = 0
            "#,
        );
        assert!(result.is_err());
    }
}
