//! # relaypb - 面向消息路由网关的 Protobuf 惰性解码
//!
//! relaypb 让消息网关在只读取少数字段的情况下完成路由，并在需要改写时保留
//! 所有未触及字段（包括未知字段）的原始字节。
//!
//! ## 特性
//!
//! - 按需扫描：首次访问时单次扫描建立字段索引
//! - 按需解码：只有被请求的字段才会被解码并缓存
//! - 字节保留改写：未改写的字段原样拷贝，未知字段不会丢失
//! - 基于 Tokio 的 Worker 池并发路由
//!
//! ## 快速开始
//!
//! ```rust,no_run,ignore
//! use relaypb::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> relaypb::Result<()> {
//!     let mut gateway = Gateway::builder()
//!         .schema(DescriptorTable::from_file("schema.toml")?)
//!         .route("execA", "10.0.0.1:7000")
//!         .start()?;
//!
//!     gateway.submit(bytes).await?;
//!     if let Some(Outbound::Routed(msg)) = gateway.recv().await {
//!         println!("{} -> {}", msg.sequence_id, msg.destination);
//!     }
//!     gateway.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## 模块组织
//!
//! ### 线格式模块
//! - LazyMessage - 惰性消息视图
//! - Overrides / mutate - 字节保留改写
//! - DescriptorTable - 消息描述符表
//!
//! ### 网关模块
//! - GatewayConfig - 网关配置
//! - Router - 路由表
//! - WorkerPool - Worker 池

// ============================================================================
// Conditional Compilation Based on Features
// ============================================================================

#[cfg(feature = "gateway")]
pub mod gateway;

#[cfg(feature = "gateway")]
pub use crate::gateway::{Gateway, GatewayBuilder, RunningGateway};

// ============================================================================
// Crate Re-exports (for advanced users)
// ============================================================================

pub use relaypb_core;

pub use relaypb_wire;

#[cfg(feature = "gateway")]
pub use relaypb_config;

#[cfg(feature = "gateway")]
pub use relaypb_router;

// ============================================================================
// Prelude Module
// ============================================================================

/// 预导出常用类型
///
/// 通过 `use relaypb::prelude::*;` 导入所有常用类型
pub mod prelude {
    pub use relaypb_core::{RelayError, RelayErrorKind};

    pub use relaypb_wire::prelude::*;

    #[cfg(feature = "gateway")]
    pub use relaypb_config::{ConfigError, GatewayConfig};

    #[cfg(feature = "gateway")]
    pub use relaypb_router::prelude::*;

    #[cfg(feature = "gateway")]
    pub use crate::gateway::{Gateway, GatewayBuilder, RunningGateway};
}

// ============================================================================
// Error Types
// ============================================================================

/// relaypb 统一 Result 类型
pub type Result<T> = std::result::Result<T, Error>;

/// relaypb 统一错误枚举
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 框架错误
    #[error(transparent)]
    Core(#[from] relaypb_core::RelayError),

    /// 线格式错误
    #[error(transparent)]
    Wire(#[from] relaypb_wire::WireError),

    /// 描述符错误
    #[error(transparent)]
    Descriptor(#[from] relaypb_wire::DescriptorError),

    /// 配置错误
    #[cfg(feature = "gateway")]
    #[error(transparent)]
    Config(#[from] relaypb_config::ConfigError),

    /// IO 错误
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// 错误类别
    pub fn kind(&self) -> relaypb_core::RelayErrorKind {
        use relaypb_core::RelayErrorKind;

        match self {
            Error::Core(e) => e.kind(),
            Error::Wire(_) => RelayErrorKind::Wire,
            Error::Descriptor(_) => RelayErrorKind::Schema,
            #[cfg(feature = "gateway")]
            Error::Config(_) => RelayErrorKind::Config,
            Error::Io(_) => RelayErrorKind::Config,
        }
    }
}

// ============================================================================
// Version Information
// ============================================================================

/// relaypb 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// relaypb 包名
pub const NAME: &str = env!("CARGO_PKG_NAME");
