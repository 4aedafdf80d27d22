//! 滑动窗口限流闸门
//!
//! 搜索次数只有在请求完成后才能知道，所以准入时使用调用方给出的预估值：
//!
//! 1. `acquire(estimate)`：窗口内实际消耗 + 未结算预留 + 本次预估 不超过上限时准入，
//!    并把预估值记为预留
//! 2. 调用完成后 `Reservation::consume(actual)`：释放预留，把实际消耗记为新事件
//! 3. 预留未结算就被丢弃（调用失败）时只释放预留，不记事件
//!
//! 检查和预留在同一把锁内完成；等待期间不持锁。

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::sync::Notify;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::resource_window::ResourceWindow;

/// 窗口为空但预留占满时的轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// 等待最早事件过期后额外等待的余量
const EXPIRY_MARGIN: Duration = Duration::from_millis(100);
/// 随机抖动上限（毫秒）
const MAX_JITTER_MS: u64 = 50;

/// 限流统计
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateGateStats {
    pub total_requests: u64,
    pub total_units: u64,
    pub window_requests: usize,
    pub window_usage: u64,
    pub pending_units: u64,
    pub avg_units_per_request: f64,
}

#[derive(Debug)]
struct GateState {
    window: ResourceWindow,
    pending: u64,
    total_requests: u64,
    total_units: u64,
}

/// 限流闸门
#[derive(Debug)]
pub struct RateGate {
    max_per_window: u64,
    state: Mutex<GateState>,
    released: Notify,
}

impl RateGate {
    pub fn new(max_per_window: u64, window: Duration) -> Self {
        Self {
            max_per_window,
            state: Mutex::new(GateState {
                window: ResourceWindow::new(window),
                pending: 0,
                total_requests: 0,
                total_units: 0,
            }),
            released: Notify::new(),
        }
    }

    pub fn max_per_window(&self) -> u64 {
        self.max_per_window
    }

    /// 等待直到预估消耗能放进窗口
    ///
    /// 单次预估超过上限属于调用方错误：闸门完全空闲时仍会放行，避免永久阻塞。
    pub async fn acquire(&self, estimated: u64) -> Reservation<'_> {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wait = {
                let mut state = self.lock();
                let now = Instant::now();
                let committed = state.window.usage(now) + state.pending;

                if committed + estimated <= self.max_per_window || committed == 0 {
                    if estimated > self.max_per_window {
                        warn!(
                            "⚠️ 预估消耗 {} 超过窗口上限 {}，在空窗口下放行",
                            estimated, self.max_per_window
                        );
                    }
                    state.pending += estimated;
                    return Reservation {
                        gate: self,
                        amount: estimated,
                        settled: false,
                    };
                }

                match state.window.next_expiry(now) {
                    Some(expiry) => {
                        let jitter = rand::thread_rng().gen_range(0..=MAX_JITTER_MS);
                        expiry + EXPIRY_MARGIN + Duration::from_millis(jitter)
                    }
                    None => POLL_INTERVAL,
                }
            };

            debug!(
                "限流等待 {:?} (预估 {}, 上限 {})",
                wait, estimated, self.max_per_window
            );

            tokio::select! {
                _ = sleep(wait) => {}
                _ = &mut notified => {}
            }
        }
    }

    /// 记录一次实际消耗（不经过预留）
    pub fn consume(&self, actual: u64) {
        self.settle(0, Some(actual));
    }

    /// 窗口内当前消耗
    pub fn current_usage(&self) -> u64 {
        self.lock().window.usage(Instant::now())
    }

    pub fn stats(&self) -> RateGateStats {
        let mut state = self.lock();
        let window_usage = state.window.usage(Instant::now());
        RateGateStats {
            total_requests: state.total_requests,
            total_units: state.total_units,
            window_requests: state.window.len(),
            window_usage,
            pending_units: state.pending,
            avg_units_per_request: if state.total_requests > 0 {
                state.total_units as f64 / state.total_requests as f64
            } else {
                0.0
            },
        }
    }

    fn settle(&self, reserved: u64, actual: Option<u64>) {
        {
            let mut state = self.lock();
            state.pending = state.pending.saturating_sub(reserved);
            if let Some(actual) = actual {
                state.window.record(Instant::now(), actual);
                state.total_requests += 1;
                state.total_units += actual;
            }
        }
        self.released.notify_waiters();
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 准入后持有的预留
///
/// 必须用实际消耗结算；直接丢弃视为调用未发生。
#[derive(Debug)]
#[must_use = "预留需要用实际消耗结算"]
pub struct Reservation<'a> {
    gate: &'a RateGate,
    amount: u64,
    settled: bool,
}

impl Reservation<'_> {
    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// 用实际消耗结算
    pub fn consume(mut self, actual: u64) {
        self.settled = true;
        self.gate.settle(self.amount, Some(actual));
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.gate.settle(self.amount, None);
        }
    }
}
