//! 自适应并发控制
//!
//! 根据最近每个条目的实际搜索次数推算合适的并发数：
//! `optimal = clamp(floor(max_rate / max(avg, 1)), 1, max_level)`。
//! 调整是阻尼的：每次观测最多 +1；只有 `optimal < current - 1` 时才 -1。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// 历史窗口容量
pub const HISTORY_CAPACITY: usize = 20;
/// 开始调整前至少需要的观测数
pub const MIN_OBSERVATIONS: usize = 5;

#[derive(Debug)]
struct ConcurrencyState {
    recent: VecDeque<u64>,
    current_level: usize,
}

/// 并发控制器
#[derive(Debug)]
pub struct ConcurrencyController {
    max_rate: u64,
    max_level: usize,
    state: Mutex<ConcurrencyState>,
}

impl ConcurrencyController {
    pub fn new(initial_level: usize, max_level: usize, max_rate: u64) -> Self {
        let max_level = max_level.max(1);
        Self {
            max_rate,
            max_level,
            state: Mutex::new(ConcurrencyState {
                recent: VecDeque::with_capacity(HISTORY_CAPACITY),
                current_level: initial_level.clamp(1, max_level),
            }),
        }
    }

    /// 记录一个条目的实际消耗，返回调整后的并发数
    pub fn record(&self, amount: u64) -> usize {
        let mut state = self.lock();
        if state.recent.len() == HISTORY_CAPACITY {
            state.recent.pop_front();
        }
        state.recent.push_back(amount);

        if state.recent.len() < MIN_OBSERVATIONS {
            return state.current_level;
        }

        let optimal = self.optimal_level(&state.recent);
        let before = state.current_level;
        if optimal > before {
            state.current_level = before + 1;
        } else if optimal + 1 < before {
            state.current_level = before - 1;
        }

        if state.current_level != before {
            debug!(
                "并发数调整: {} → {} (建议值 {})",
                before, state.current_level, optimal
            );
        }
        state.current_level
    }

    /// 当前建议并发数
    pub fn current_level(&self) -> usize {
        self.lock().current_level
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// 历史窗口中的观测数
    pub fn observations(&self) -> usize {
        self.lock().recent.len()
    }

    fn optimal_level(&self, recent: &VecDeque<u64>) -> usize {
        let avg = recent.iter().sum::<u64>() as f64 / recent.len() as f64;
        let optimal = (self.max_rate as f64 / avg.max(1.0)).floor() as usize;
        optimal.clamp(1, self.max_level)
    }

    fn lock(&self) -> MutexGuard<'_, ConcurrencyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
