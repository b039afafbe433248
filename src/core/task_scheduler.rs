//! 运行调度：限制同时执行的 run 数量
//!
//! 每个 run 在独立的 tokio 任务中串行执行；Semaphore 控制全局并发的 run 数。

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// 运行调度器
#[derive(Clone)]
pub struct RunScheduler {
    permits: Arc<Semaphore>,
}

impl RunScheduler {
    pub fn new(max_concurrent_runs: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
        }
    }

    /// 获取执行许可；等待期间被取消则返回 None
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = self.permits.clone().acquire_owned() => permit.ok(),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for RunScheduler {
    fn default() -> Self {
        Self::new(4)
    }
}
