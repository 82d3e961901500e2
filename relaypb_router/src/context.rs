//! 路由上下文
//!
//! 单条入站消息在路由期间的全部状态。

use bytes::Bytes;
use relaypb_wire::LazyMessage;
use std::time::{Duration, Instant};

/// 路由上下文
///
/// 持有该消息的惰性视图，随消息转发完毕一起丢弃
#[derive(Debug)]
pub struct RoutingContext {
    /// 入站序列号
    sequence_id: u64,
    /// 接收时间
    received_at: Instant,
    /// 消息视图
    view: LazyMessage,
}

impl RoutingContext {
    /// 创建新的上下文
    pub fn new(sequence_id: u64, view: LazyMessage) -> Self {
        Self {
            sequence_id,
            received_at: Instant::now(),
            view,
        }
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// 自接收以来的耗时
    pub fn elapsed(&self) -> Duration {
        self.received_at.elapsed()
    }

    pub fn view(&self) -> &LazyMessage {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut LazyMessage {
        &mut self.view
    }

    /// 原始消息字节
    pub fn raw_bytes(&self) -> &Bytes {
        self.view.raw_bytes()
    }

    /// 取回视图
    pub fn into_view(self) -> LazyMessage {
        self.view
    }
}
