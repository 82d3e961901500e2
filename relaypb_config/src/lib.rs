//! 网关配置管理
//!
//! 提供 Worker 池、消息大小限制和路由字段的配置，支持 TOML 文件和环境变量覆盖。

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析错误
    #[error("解析配置文件失败: {0}")]
    Parse(String),

    /// 验证错误
    #[error("配置验证失败: {0}")]
    Validation(String),

    /// 环境变量错误
    #[error("环境变量解析失败: {0}")]
    EnvVar(String),
}

/// 配置 Result 类型
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Worker 数量上限
pub const MAX_WORKER_THREADS: usize = 512;

/// 网关配置
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// 工作线程数量（None 表示使用 CPU 核心数）
    #[serde(default)]
    pub worker_threads: Option<usize>,

    /// 每个 Worker 的入站通道容量
    #[serde(default = "default_channel_size")]
    pub channel_size: usize,

    /// 单条消息的最大字节数，超出的消息在扫描前即被拒绝
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// 入站消息的顶层消息类型名称
    #[serde(default = "default_routing_message")]
    pub routing_message: String,

    /// 路由字段路径，以 `.` 分隔的字段名
    #[serde(default = "default_routing_field")]
    pub routing_field: String,

    /// 目标未命中时的默认去向
    #[serde(default)]
    pub default_destination: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            channel_size: default_channel_size(),
            max_message_size: default_max_message_size(),
            routing_message: default_routing_message(),
            routing_field: default_routing_field(),
            default_destination: None,
        }
    }
}

impl GatewayConfig {
    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 字符串加载配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// 从环境变量加载配置并覆盖
    ///
    /// 支持的环境变量：
    /// - RELAYPB_WORKER_THREADS: 工作线程数
    /// - RELAYPB_CHANNEL_SIZE: 通道容量
    /// - RELAYPB_MAX_MESSAGE_SIZE: 最大消息字节数
    /// - RELAYPB_ROUTING_FIELD: 路由字段路径
    /// - RELAYPB_DEFAULT_DESTINATION: 默认去向
    pub fn load_with_env_override(mut self) -> Result<Self> {
        if let Ok(threads) = std::env::var("RELAYPB_WORKER_THREADS") {
            self.worker_threads = Some(threads.parse().map_err(|_| {
                ConfigError::EnvVar("RELAYPB_WORKER_THREADS 必须是有效的 usize 数字".to_string())
            })?);
        }

        if let Ok(size) = std::env::var("RELAYPB_CHANNEL_SIZE") {
            self.channel_size = size.parse().map_err(|_| {
                ConfigError::EnvVar("RELAYPB_CHANNEL_SIZE 必须是有效的 usize 数字".to_string())
            })?;
        }

        if let Ok(size) = std::env::var("RELAYPB_MAX_MESSAGE_SIZE") {
            self.max_message_size = size.parse().map_err(|_| {
                ConfigError::EnvVar("RELAYPB_MAX_MESSAGE_SIZE 必须是有效的 usize 数字".to_string())
            })?;
        }

        if let Ok(field) = std::env::var("RELAYPB_ROUTING_FIELD") {
            self.routing_field = field;
        }

        if let Ok(dest) = std::env::var("RELAYPB_DEFAULT_DESTINATION") {
            self.default_destination = if dest.is_empty() { None } else { Some(dest) };
        }

        Ok(self)
    }

    /// 从文件加载并应用环境变量覆盖
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_file(path)?.load_with_env_override()
    }

    /// 验证配置是否有效
    pub fn validate(&self) -> Result<()> {
        if let Some(threads) = self.worker_threads {
            if threads == 0 {
                return Err(ConfigError::Validation("工作线程数不能为 0".to_string()));
            }
            if threads > MAX_WORKER_THREADS {
                return Err(ConfigError::Validation(format!(
                    "工作线程数过大 (建议 <= {})",
                    MAX_WORKER_THREADS
                )));
            }
        }

        if self.channel_size == 0 {
            return Err(ConfigError::Validation("通道容量不能为 0".to_string()));
        }

        if self.max_message_size == 0 {
            return Err(ConfigError::Validation("最大消息字节数不能为 0".to_string()));
        }

        if self.routing_message.is_empty() {
            return Err(ConfigError::Validation("路由消息类型不能为空".to_string()));
        }

        if self.routing_field.is_empty() || self.routing_field.split('.').any(str::is_empty) {
            return Err(ConfigError::Validation(format!(
                "无效的路由字段路径: {:?}",
                self.routing_field
            )));
        }

        Ok(())
    }

    /// 实际使用的 Worker 数量
    pub fn effective_workers(&self) -> usize {
        self.worker_threads.unwrap_or_else(num_cpus::get).max(1)
    }

    /// 获取配置摘要信息
    pub fn summary(&self) -> String {
        format!(
            "relaypb 网关配置:\n  工作线程: {}\n  通道容量: {}\n  最大消息: {} 字节\n  路由字段: {}.{}\n  默认去向: {:?}",
            self.effective_workers(),
            self.channel_size,
            self.max_message_size,
            self.routing_message,
            self.routing_field,
            self.default_destination
        )
    }
}

// 默认值函数
fn default_channel_size() -> usize {
    1024
}

fn default_max_message_size() -> usize {
    16 * 1024 * 1024
}

fn default_routing_message() -> String {
    "Envelope".to_string()
}

fn default_routing_field() -> String {
    "header.target".to_string()
}
