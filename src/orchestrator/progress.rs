//! 批次进度统计
//!
//! 每个条目结束时更新一次；快照是不可变副本，可以交给观察者渲染。

use std::fmt::{self, Display};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::models::PipelineResult;

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    processed: usize,
    succeeded: usize,
    failed: usize,
    qualified: usize,
    resource_units: u64,
}

/// 批次进度
#[derive(Debug)]
pub struct BatchProgress {
    total: usize,
    started: Instant,
    counters: Mutex<Counters>,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            started: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// 记录一个条目的最终结果，返回更新后的快照
    pub fn record(&self, result: &PipelineResult) -> ProgressSnapshot {
        let counters = {
            let mut counters = self.lock();
            counters.processed += 1;
            counters.resource_units += result.usage().resource_units;
            if result.is_success() {
                counters.succeeded += 1;
                if result.is_qualified() {
                    counters.qualified += 1;
                }
            } else {
                counters.failed += 1;
            }
            *counters
        };
        self.snapshot_of(counters)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let counters = *self.lock();
        self.snapshot_of(counters)
    }

    fn snapshot_of(&self, counters: Counters) -> ProgressSnapshot {
        let elapsed = self.started.elapsed();
        let eta = (counters.processed > 0).then(|| {
            let remaining = self.total.saturating_sub(counters.processed) as u32;
            elapsed / counters.processed as u32 * remaining
        });
        ProgressSnapshot {
            total: self.total,
            processed: counters.processed,
            succeeded: counters.succeeded,
            failed: counters.failed,
            qualified: counters.qualified,
            resource_units: counters.resource_units,
            elapsed,
            eta,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 进度快照
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub qualified: usize,
    pub resource_units: u64,
    pub elapsed: Duration,
    /// 预计剩余时间（还没有完成任何条目时为空）
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.processed as f64 / self.total as f64 * 100.0
        }
    }

    pub fn avg_units(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.resource_units as f64 / self.processed as f64
        }
    }
}

impl Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let eta = match self.eta {
            Some(eta) => format!("{}m {}s", eta.as_secs() / 60, eta.as_secs() % 60),
            None => "计算中...".to_string(),
        };
        write!(
            f,
            "进度: {}/{} ({:.1}%) | 成功: {} | 合格: {} | 失败: {} | 搜索: {} (平均 {:.1}) | 剩余: {}",
            self.processed,
            self.total,
            self.percent(),
            self.succeeded,
            self.qualified,
            self.failed,
            self.resource_units,
            self.avg_units(),
            eta
        )
    }
}

/// 进度观察者
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

/// 通过日志输出进度
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgressObserver;

impl ProgressObserver for LogProgressObserver {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        info!("📊 {}", snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::models::UsageMetrics;

    fn failure(units: u64) -> PipelineResult {
        PipelineResult::Failure {
            error_kind: FailureKind::ExtractionFailed,
            message: "x".to_string(),
            usage: UsageMetrics {
                resource_units: units,
                ..Default::default()
            },
            elapsed: Duration::ZERO,
            raw_text_excerpt: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_and_eta() {
        let progress = BatchProgress::new(4);
        assert_eq!(progress.snapshot().eta, None);

        tokio::time::advance(Duration::from_secs(10)).await;
        progress.record(&failure(3));
        let snapshot = progress.record(&failure(5));

        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.failed, 2);
        assert_eq!(snapshot.succeeded, 0);
        assert_eq!(snapshot.resource_units, 8);
        assert_eq!(snapshot.avg_units(), 4.0);
        assert_eq!(snapshot.percent(), 50.0);
        // 两个条目用了 10 秒，剩两个
        assert_eq!(snapshot.eta, Some(Duration::from_secs(10)));
        assert!(snapshot.to_string().contains("进度: 2/4 (50.0%)"));
    }
}
