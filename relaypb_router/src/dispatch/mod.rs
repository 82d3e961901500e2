//! 消息分发
//!
//! 入站消息经均衡器分配给 Worker，每个 Worker 独占处理一条消息的惰性视图，
//! 路由结果统一写入出站通道。

pub mod balancer;
pub mod pool;
pub mod worker;

pub use balancer::WorkerBalancer;
pub use pool::WorkerPool;
pub use worker::{InboundMessage, Outbound, RejectedMessage, RoutedMessage, Worker, WorkerConfig};
