//! Worker
//!
//! 每个 Worker 顺序处理分配给它的消息：建立惰性视图、路由、按需改写，再把结果写入出站通道。

use crate::context::RoutingContext;
use crate::router::Router;
use bytes::Bytes;
use relaypb_core::{RelayError, Result};
use relaypb_wire::{LazyMessage, MessageDescriptor};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Worker 配置
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub id: usize,
    /// 入站通道容量
    pub channel_size: usize,
    /// 单条消息的最大字节数
    pub max_message_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            id: 0,
            channel_size: 1024,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

/// 入站消息
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sequence_id: u64,
    pub payload: Bytes,
}

/// 已路由的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedMessage {
    pub sequence_id: u64,
    pub worker_id: usize,
    pub destination: String,
    pub payload: Bytes,
    pub mutated: bool,
}

/// 被拒绝的消息，携带原始字节以便调用方自行处理
#[derive(Debug)]
pub struct RejectedMessage {
    pub sequence_id: u64,
    pub worker_id: usize,
    pub error: RelayError,
    pub payload: Bytes,
}

/// 出站结果
#[derive(Debug)]
pub enum Outbound {
    Routed(RoutedMessage),
    Rejected(RejectedMessage),
}

impl Outbound {
    pub fn sequence_id(&self) -> u64 {
        match self {
            Outbound::Routed(msg) => msg.sequence_id,
            Outbound::Rejected(msg) => msg.sequence_id,
        }
    }

    pub fn is_routed(&self) -> bool {
        matches!(self, Outbound::Routed(_))
    }
}

/// Worker
pub struct Worker {
    id: usize,
    max_message_size: usize,
    rx: mpsc::Receiver<InboundMessage>,
    outbound: mpsc::Sender<Outbound>,
    router: Arc<Router>,
    descriptor: Arc<MessageDescriptor>,
    /// 已处理消息数
    processed: Arc<AtomicU64>,
}

impl Worker {
    /// 创建新的 Worker，返回其入站通道的发送端
    pub fn new(
        config: WorkerConfig,
        router: Arc<Router>,
        descriptor: Arc<MessageDescriptor>,
        outbound: mpsc::Sender<Outbound>,
    ) -> (Self, mpsc::Sender<InboundMessage>) {
        let (tx, rx) = mpsc::channel(config.channel_size);

        let worker = Self {
            id: config.id,
            max_message_size: config.max_message_size,
            rx,
            outbound,
            router,
            descriptor,
            processed: Arc::new(AtomicU64::new(0)),
        };

        (worker, tx)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// 已处理消息数的共享计数
    pub fn processed_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.processed)
    }

    /// 处理单条消息
    ///
    /// 视图只在本次调用内存在，结束后随上下文一起释放
    pub fn process(&self, msg: InboundMessage) -> Outbound {
        self.processed.fetch_add(1, Ordering::Relaxed);

        if msg.payload.len() > self.max_message_size {
            let error = RelayError::validation(format!(
                "消息过大: {} > {}",
                msg.payload.len(),
                self.max_message_size
            ));
            return self.reject(msg.sequence_id, error, msg.payload);
        }

        let view = LazyMessage::new(msg.payload.clone(), Arc::clone(&self.descriptor));
        let mut ctx = RoutingContext::new(msg.sequence_id, view);

        match self.router.route(&mut ctx) {
            Ok(decision) => {
                debug!(
                    worker = self.id,
                    seq = msg.sequence_id,
                    destination = %decision.destination,
                    mutated = decision.mutated,
                    elapsed_us = ctx.elapsed().as_micros() as u64,
                    "消息已路由"
                );
                Outbound::Routed(RoutedMessage {
                    sequence_id: msg.sequence_id,
                    worker_id: self.id,
                    destination: decision.destination,
                    payload: decision.payload,
                    mutated: decision.mutated,
                })
            }
            Err(error) => self.reject(msg.sequence_id, error, msg.payload),
        }
    }

    fn reject(&self, sequence_id: u64, error: RelayError, payload: Bytes) -> Outbound {
        warn!(worker = self.id, seq = sequence_id, %error, "消息被拒绝");
        Outbound::Rejected(RejectedMessage {
            sequence_id,
            worker_id: self.id,
            error,
            payload,
        })
    }

    /// 启动 Worker
    ///
    /// 入站通道关闭后退出；出站通道关闭时返回错误
    pub fn spawn(mut self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            info!(worker = self.id, "Worker 启动");

            while let Some(msg) = self.rx.recv().await {
                let result = self.process(msg);
                if self.outbound.send(result).await.is_err() {
                    warn!(worker = self.id, "出站通道已关闭，Worker 退出");
                    return Err(RelayError::dispatch(format!(
                        "Worker {} 出站通道已关闭",
                        self.id
                    )));
                }
            }

            info!(
                worker = self.id,
                processed = self.processed.load(Ordering::Relaxed),
                "Worker 通道关闭，退出"
            );
            Ok(())
        })
    }
}
