//! 滑动窗口资源记录
//!
//! 记录带时间戳的资源消耗事件，并给出窗口内的总消耗。
//! 本结构不加锁、不读时钟，所有方法都显式接收 `now`，
//! 由 [`RateGate`](super::RateGate) 负责加锁和取时。

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// 单次资源消耗事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceEvent {
    pub at: Instant,
    pub amount: u64,
}

/// 滑动窗口
#[derive(Debug)]
pub struct ResourceWindow {
    window: Duration,
    events: VecDeque<ResourceEvent>,
}

impl ResourceWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            events: VecDeque::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// 记录一次消耗
    ///
    /// 事件按时间顺序追加；若调用方传入的时间早于队尾，按队尾时间记录，
    /// 保证淘汰顺序与时间戳顺序一致。
    pub fn record(&mut self, now: Instant, amount: u64) {
        let at = match self.events.back() {
            Some(last) if last.at > now => last.at,
            _ => now,
        };
        self.events.push_back(ResourceEvent { at, amount });
    }

    /// 淘汰窗口外的事件
    pub fn evict(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        while self.events.front().is_some_and(|e| e.at < cutoff) {
            self.events.pop_front();
        }
    }

    /// 淘汰后返回窗口内的总消耗
    pub fn usage(&mut self, now: Instant) -> u64 {
        self.evict(now);
        self.sum()
    }

    /// 当前保留事件的总消耗（不做淘汰）
    pub fn sum(&self) -> u64 {
        self.events.iter().map(|e| e.amount).sum()
    }

    /// 距离最早事件离开窗口还需等待的时间
    ///
    /// 窗口为空时返回 `None`。
    pub fn next_expiry(&self, now: Instant) -> Option<Duration> {
        self.events
            .front()
            .map(|oldest| (oldest.at + self.window).saturating_duration_since(now))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
