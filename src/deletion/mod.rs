//! 批量软删除管道
//!
//! Retirement requests are split into small batches, queued on a bounded
//! channel and applied by a fixed set of worker tasks:
//!
//! - 提交方按 `chunk_size` 切分并去重
//! - 队列满时按 [`OverflowPolicy`] 阻塞或丢弃
//! - 失败或超时的批次只记录日志，不重试
//! - `shutdown` 关闭队列，等待 worker 处理完剩余批次
//!
//! Batches carry no ordering guarantee; retirement is idempotent so the
//! order they land in does not matter.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::{DeletionConfig, OverflowPolicy};
use crate::storage::Store;

/// One unit of work: keys to retire on behalf of one owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionBatch {
    pub short_keys: Vec<String>,
    pub owner_id: i64,
}

/// What happened to the batches of one `submit` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubmitReport {
    pub queued: usize,
    pub dropped: usize,
}

/// Lifetime counters, in batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub queued: u64,
    pub completed: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl PipelineStats {
    /// Batches accepted but not yet finished.
    pub fn pending(&self) -> u64 {
        self.queued.saturating_sub(self.completed + self.failed)
    }
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    /// 每个批次结束（成功或失败）时唤醒 `wait_idle`
    settled: Notify,
}

impl Counters {
    fn settle(&self, outcome: &AtomicU64) {
        outcome.fetch_add(1, Ordering::AcqRel);
        self.settled.notify_waiters();
    }

    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            queued: self.queued.load(Ordering::Acquire),
            completed: self.completed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            dropped: self.dropped.load(Ordering::Acquire),
        }
    }
}

pub struct DeletionPipeline {
    /// `None` once shut down
    sender: parking_lot::Mutex<Option<mpsc::Sender<DeletionBatch>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
    chunk_size: usize,
    overflow: OverflowPolicy,
}

impl DeletionPipeline {
    /// Starts the worker tasks. Must be called inside a tokio runtime.
    pub fn start(store: Arc<dyn Store>, config: &DeletionConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let worker_count = config.workers.max(1);
        let batch_timeout = Duration::from_millis(config.batch_timeout_ms.max(1));

        let (tx, rx) = mpsc::channel(capacity);
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&rx),
                    Arc::clone(&store),
                    Arc::clone(&counters),
                    batch_timeout,
                ))
            })
            .collect();

        info!(
            "Deletion pipeline started: {} worker(s), queue capacity {}, chunk size {}, overflow {:?}",
            worker_count, capacity, config.chunk_size, config.overflow
        );

        Self {
            sender: parking_lot::Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            counters,
            chunk_size: config.chunk_size.max(1),
            overflow: config.overflow,
        }
    }

    /// Splits `short_keys` into batches and enqueues them.
    ///
    /// Returns once every batch is either queued or dropped; it does not
    /// wait for any batch to be applied.
    pub async fn submit(&self, short_keys: &[String], owner_id: i64) -> SubmitReport {
        let batches = split_batches(short_keys, owner_id, self.chunk_size);
        let mut report = SubmitReport::default();
        if batches.is_empty() {
            return report;
        }

        let Some(sender) = self.sender.lock().clone() else {
            warn!(
                "Deletion pipeline is shut down, dropping {} batch(es) for owner {}",
                batches.len(),
                owner_id
            );
            report.dropped = batches.len();
            self.counters
                .dropped
                .fetch_add(batches.len() as u64, Ordering::AcqRel);
            return report;
        };

        for batch in batches {
            let accepted = match self.overflow {
                OverflowPolicy::Block => sender.send(batch).await.is_ok(),
                OverflowPolicy::Drop => match sender.try_send(batch) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(batch)) => {
                        warn!(
                            "Deletion queue full, dropping batch of {} key(s) for owner {}",
                            batch.short_keys.len(),
                            batch.owner_id
                        );
                        false
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                },
            };

            if accepted {
                report.queued += 1;
                self.counters.queued.fetch_add(1, Ordering::AcqRel);
            } else {
                report.dropped += 1;
                self.counters.dropped.fetch_add(1, Ordering::AcqRel);
            }
        }

        debug!(
            "Submitted retirement for owner {}: {} queued, {} dropped",
            owner_id, report.queued, report.dropped
        );
        report
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Waits until every queued batch has finished, up to `timeout`.
    /// Returns whether the queue went idle in time.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let idle = async {
            loop {
                // 先登记再检查，避免错过两者之间的通知
                let mut notified = std::pin::pin!(self.counters.settled.notified());
                notified.as_mut().enable();
                if self.stats().pending() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, idle).await.is_ok()
    }

    /// Closes the queue, lets the workers finish what is already queued and
    /// joins them. Later calls are no-ops.
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let handles = std::mem::take(&mut *self.workers.lock().await);
        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Deletion worker panicked: {}", e);
            }
        }

        let stats = self.stats();
        info!(
            "Deletion pipeline stopped ({} worker(s)): {} completed, {} failed, {} dropped",
            count, stats.completed, stats.failed, stats.dropped
        );
    }
}

/// Deduplicates keys (first occurrence wins) and chunks them.
fn split_batches(short_keys: &[String], owner_id: i64, chunk_size: usize) -> Vec<DeletionBatch> {
    let mut seen = HashSet::with_capacity(short_keys.len());
    let unique: Vec<String> = short_keys
        .iter()
        .filter(|key| !key.is_empty() && seen.insert(key.as_str()))
        .cloned()
        .collect();

    unique
        .chunks(chunk_size.max(1))
        .map(|chunk| DeletionBatch {
            short_keys: chunk.to_vec(),
            owner_id,
        })
        .collect()
}

async fn run_worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<DeletionBatch>>>,
    store: Arc<dyn Store>,
    counters: Arc<Counters>,
    batch_timeout: Duration,
) {
    loop {
        // 只在取批次时持有锁
        let batch = { rx.lock().await.recv().await };
        let Some(batch) = batch else {
            trace!("Deletion worker {} exiting, queue closed", worker_id);
            break;
        };

        let result = tokio::time::timeout(
            batch_timeout,
            store.retire_batch(&batch.short_keys, batch.owner_id),
        )
        .await;

        match result {
            Ok(Ok(changed)) => {
                counters.settle(&counters.completed);
                debug!(
                    "Worker {} retired {}/{} key(s) for owner {}",
                    worker_id,
                    changed,
                    batch.short_keys.len(),
                    batch.owner_id
                );
            }
            Ok(Err(e)) => {
                counters.settle(&counters.failed);
                error!(
                    "Worker {} failed to retire {:?} for owner {}: {}",
                    worker_id, batch.short_keys, batch.owner_id, e
                );
            }
            Err(_) => {
                counters.settle(&counters.failed);
                error!(
                    "Worker {} timed out after {:?} retiring {:?} for owner {}",
                    worker_id, batch_timeout, batch.short_keys, batch.owner_id
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_split_batches_chunks_and_dedups() {
        let batches = split_batches(&keys(&["a", "b", "a", "c", "", "d", "e"]), 9, 2);
        let chunks: Vec<Vec<String>> = batches.iter().map(|b| b.short_keys.clone()).collect();
        assert_eq!(
            chunks,
            vec![keys(&["a", "b"]), keys(&["c", "d"]), keys(&["e"])]
        );
        assert!(batches.iter().all(|b| b.owner_id == 9));
    }

    #[test]
    fn test_split_batches_empty() {
        assert!(split_batches(&[], 1, 2).is_empty());
        assert_eq!(split_batches(&keys(&["a", "b"]), 1, 0).len(), 2);
    }

    #[test]
    fn test_pending() {
        let stats = PipelineStats {
            queued: 5,
            completed: 2,
            failed: 1,
            dropped: 4,
        };
        assert_eq!(stats.pending(), 2);
    }
}
