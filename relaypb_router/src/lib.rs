//! relaypb 路由与分发
//!
//! 只读取路由字段做转发决策，由一组 Worker 并发处理入站消息。

pub mod context;
pub mod dispatch;
pub mod router;

pub use crate::context::RoutingContext;
pub use crate::dispatch::{
    InboundMessage, Outbound, RejectedMessage, RoutedMessage, Worker, WorkerBalancer,
    WorkerConfig, WorkerPool,
};
pub use crate::router::{RouteDecision, Router};

// 重新导出错误类型
pub use relaypb_core::{RelayError, Result};

// 预导出
pub mod prelude {
    pub use crate::context::RoutingContext;
    pub use crate::dispatch::{Outbound, RoutedMessage, WorkerPool};
    pub use crate::router::{RouteDecision, Router};
    pub use relaypb_core::{RelayError, Result};
}
