//! Worker 池
//!
//! 按配置启动一组 Worker，共享只读的路由器和描述符，所有结果汇入同一个出站通道。

use crate::dispatch::balancer::WorkerBalancer;
use crate::dispatch::worker::{InboundMessage, Outbound, Worker, WorkerConfig};
use crate::router::Router;
use bytes::Bytes;
use relaypb_config::GatewayConfig;
use relaypb_core::{RelayError, Result};
use relaypb_wire::MessageDescriptor;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Worker 池
pub struct WorkerPool {
    senders: Vec<mpsc::Sender<InboundMessage>>,
    handles: Vec<JoinHandle<Result<()>>>,
    processed: Vec<Arc<AtomicU64>>,
    balancer: WorkerBalancer,
    next_sequence: AtomicU64,
}

impl WorkerPool {
    /// 启动 Worker 池
    ///
    /// 必须在 tokio 运行时内调用；返回池本身和出站结果的接收端
    pub fn start(
        config: &GatewayConfig,
        router: Arc<Router>,
        descriptor: Arc<MessageDescriptor>,
    ) -> Result<(Self, mpsc::Receiver<Outbound>)> {
        config
            .validate()
            .map_err(|e| RelayError::config(e.to_string()))?;

        let worker_count = config.effective_workers();
        let (out_tx, out_rx) = mpsc::channel(config.channel_size);

        let mut senders = Vec::with_capacity(worker_count);
        let mut handles = Vec::with_capacity(worker_count);
        let mut processed = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let worker_config = WorkerConfig {
                id,
                channel_size: config.channel_size,
                max_message_size: config.max_message_size,
            };
            let (worker, tx) = Worker::new(
                worker_config,
                Arc::clone(&router),
                Arc::clone(&descriptor),
                out_tx.clone(),
            );
            processed.push(worker.processed_counter());
            handles.push(worker.spawn());
            senders.push(tx);
        }

        info!(
            workers = worker_count,
            channel_size = config.channel_size,
            routing_message = descriptor.name(),
            "Worker 池已启动"
        );

        let pool = Self {
            senders,
            handles,
            processed,
            balancer: WorkerBalancer::new(worker_count),
            next_sequence: AtomicU64::new(0),
        };
        Ok((pool, out_rx))
    }

    /// 提交一条消息，返回分配的序列号
    pub async fn submit(&self, payload: impl Into<Bytes>) -> Result<u64> {
        let sequence_id = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        self.submit_with_id(sequence_id, payload).await?;
        Ok(sequence_id)
    }

    /// 以调用方指定的序列号提交
    pub async fn submit_with_id(&self, sequence_id: u64, payload: impl Into<Bytes>) -> Result<()> {
        let worker = self.balancer.next_worker();
        let sender = self
            .senders
            .get(worker)
            .ok_or_else(|| RelayError::dispatch("Worker 池已关闭"))?;
        let msg = InboundMessage {
            sequence_id,
            payload: payload.into(),
        };
        sender
            .send(msg)
            .await
            .map_err(|_| RelayError::dispatch(format!("Worker {} 已停止", worker)))
    }

    pub fn worker_count(&self) -> usize {
        self.balancer.worker_count()
    }

    /// 是否已停止接收新消息
    pub fn is_closed(&self) -> bool {
        self.senders.is_empty()
    }

    /// 已处理消息总数
    pub fn processed(&self) -> u64 {
        self.processed
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }

    /// 关闭入站通道，之后的提交都会失败
    ///
    /// 已提交的消息仍会被处理；调用方继续读取出站通道直到返回 `None`，再调用 [`WorkerPool::join`]
    pub fn close(&mut self) {
        if !self.senders.is_empty() {
            self.senders.clear();
            info!("Worker 池停止接收消息");
        }
    }

    /// 等待所有 Worker 退出，返回遇到的第一个 Worker 错误
    ///
    /// 必须先 [`close`](WorkerPool::close)，并保证出站通道有人读取，否则 Worker 可能阻塞在发送上
    pub async fn join(self) -> Result<()> {
        let mut first_error = None;
        for (id, handle) in self.handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(RelayError::dispatch(format!("Worker {} 异常退出: {}", id, e))),
            };
            if let Err(e) = result {
                error!(worker = id, error = %e, "Worker 错误");
                first_error.get_or_insert(e);
            }
        }

        info!("Worker 池已关闭");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 关闭入站通道，读空出站通道并等待所有 Worker 退出
    ///
    /// 返回关闭时尚未读取的全部结果
    pub async fn shutdown(mut self, mut outbound: mpsc::Receiver<Outbound>) -> Result<Vec<Outbound>> {
        self.close();

        // 所有 Worker 退出后出站发送端全部释放，recv 才会返回 None
        let mut pending = Vec::new();
        while let Some(result) = outbound.recv().await {
            pending.push(result);
        }

        self.join().await?;
        Ok(pending)
    }
}
