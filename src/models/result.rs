use std::ops::AddAssign;
use std::time::Duration;

use serde::Serialize;

use crate::error::FailureKind;
use crate::models::record::ResearchRecord;

/// 单次或多次调用的用量统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageMetrics {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    /// 消耗的资源单位（搜索次数）
    pub resource_units: u64,
    /// 远程调用次数
    pub calls: u32,
}

impl AddAssign for UsageMetrics {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.resource_units += other.resource_units;
        self.calls += other.calls;
    }
}

/// 单个条目的最终结果
///
/// 由流程层创建，交给持久化层后不再修改。
#[derive(Debug, Clone)]
pub enum PipelineResult {
    Success {
        record: ResearchRecord,
        usage: UsageMetrics,
        elapsed: Duration,
        /// 是否经过修复调用
        repaired: bool,
    },
    Failure {
        error_kind: FailureKind,
        message: String,
        usage: UsageMetrics,
        elapsed: Duration,
        /// 原始响应片段（用于排查）
        raw_text_excerpt: Option<String>,
    },
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success { .. })
    }

    pub fn usage(&self) -> &UsageMetrics {
        match self {
            PipelineResult::Success { usage, .. } | PipelineResult::Failure { usage, .. } => usage,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            PipelineResult::Success { elapsed, .. } | PipelineResult::Failure { elapsed, .. } => {
                *elapsed
            }
        }
    }

    pub fn record(&self) -> Option<&ResearchRecord> {
        match self {
            PipelineResult::Success { record, .. } => Some(record),
            PipelineResult::Failure { .. } => None,
        }
    }

    pub fn is_qualified(&self) -> bool {
        self.record().is_some_and(ResearchRecord::is_qualified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_accumulates() {
        let mut total = UsageMetrics {
            input_tokens: 100,
            output_tokens: 20,
            cache_read_tokens: 80,
            resource_units: 4,
            calls: 1,
        };
        total += UsageMetrics {
            input_tokens: 50,
            output_tokens: 10,
            cache_read_tokens: 0,
            resource_units: 2,
            calls: 1,
        };
        assert_eq!(total.input_tokens, 150);
        assert_eq!(total.resource_units, 6);
        assert_eq!(total.calls, 2);
    }
}
