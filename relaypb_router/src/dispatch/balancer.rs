//! Worker 均衡器
//!
//! 负责将入站消息轮询分配给 Worker，并记录每个 Worker 分到的消息数。

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Worker 均衡器
#[derive(Debug)]
pub struct WorkerBalancer {
    /// 下一次分配的游标
    cursor: AtomicUsize,
    /// 每个 Worker 已分配的消息数
    assigned: Vec<AtomicU64>,
}

impl WorkerBalancer {
    /// 创建均衡器，`worker_count` 必须大于 0
    pub fn new(worker_count: usize) -> Self {
        assert!(worker_count > 0, "Worker count must be greater than 0");
        Self {
            cursor: AtomicUsize::new(0),
            assigned: (0..worker_count).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// 选出下一个 Worker
    pub fn next_worker(&self) -> usize {
        let worker = self.cursor.fetch_add(1, Ordering::Relaxed) % self.assigned.len();
        self.assigned[worker].fetch_add(1, Ordering::Relaxed);
        worker
    }

    pub fn worker_count(&self) -> usize {
        self.assigned.len()
    }

    /// 指定 Worker 已分配的消息数
    pub fn assigned(&self, worker: usize) -> u64 {
        self.assigned
            .get(worker)
            .map_or(0, |count| count.load(Ordering::Relaxed))
    }

    /// 全部已分配的消息数
    pub fn total_assigned(&self) -> u64 {
        self.assigned
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }
}
