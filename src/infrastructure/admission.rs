//! 可调整容量的准入闸门
//!
//! 基于 `Semaphore` 限制同时处理的条目数，容量可以在运行中调整：
//! - 扩容：先抵消尚未回收的缩容欠账，再补发许可
//! - 缩容：立即回收空闲许可，其余在正在运行的条目归还许可时回收

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

#[derive(Debug)]
struct GateState {
    capacity: usize,
    /// 尚待回收的许可数
    debt: usize,
}

#[derive(Debug)]
struct Inner {
    semaphore: Arc<Semaphore>,
    state: Mutex<GateState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 准入闸门
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    inner: Arc<Inner>,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                state: Mutex::new(GateState { capacity, debt: 0 }),
            }),
        }
    }

    /// 等待一个处理名额
    pub async fn acquire(&self) -> Result<AdmissionPermit, AcquireError> {
        let permit = self.inner.semaphore.clone().acquire_owned().await?;
        Ok(AdmissionPermit {
            permit: Some(permit),
            inner: self.inner.clone(),
        })
    }

    /// 当前容量
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// 当前空闲名额
    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// 调整容量（至少为 1）
    pub fn resize(&self, new_capacity: usize) {
        let new_capacity = new_capacity.max(1);
        let mut state = self.inner.lock();
        let old_capacity = state.capacity;
        if new_capacity == old_capacity {
            return;
        }

        if new_capacity > old_capacity {
            let mut grow = new_capacity - old_capacity;
            let cancelled = grow.min(state.debt);
            state.debt -= cancelled;
            grow -= cancelled;
            if grow > 0 {
                self.inner.semaphore.add_permits(grow);
            }
        } else {
            let mut shrink = old_capacity - new_capacity;
            while shrink > 0 {
                match self.inner.semaphore.try_acquire() {
                    Ok(permit) => {
                        permit.forget();
                        shrink -= 1;
                    }
                    Err(_) => break,
                }
            }
            state.debt += shrink;
        }

        state.capacity = new_capacity;
        debug!("准入容量调整: {} → {}", old_capacity, new_capacity);
    }
}

/// 处理名额，丢弃时归还
#[derive(Debug)]
pub struct AdmissionPermit {
    permit: Option<OwnedSemaphorePermit>,
    inner: Arc<Inner>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        let mut state = self.inner.lock();
        if state.debt > 0 {
            state.debt -= 1;
            permit.forget();
        }
        // 无欠账时 permit 在此处正常归还
    }
}
