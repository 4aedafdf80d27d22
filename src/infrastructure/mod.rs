//! 基础设施层（Infrastructure）
//!
//! 持有所有条目共享的限流与并发状态，每个结构只在自己的锁内修改状态。
//!
//! - `resource_window` - 滑动窗口事件记录
//! - `rate_gate` - 按搜索预算准入的限流闸门
//! - `concurrency` - 根据实际消耗推算并发数
//! - `admission` - 可在运行中调整容量的准入闸门

pub mod admission;
pub mod concurrency;
pub mod rate_gate;
pub mod resource_window;

pub use admission::{AdmissionGate, AdmissionPermit};
pub use concurrency::ConcurrencyController;
pub use rate_gate::{RateGate, RateGateStats, Reservation};
pub use resource_window::{ResourceEvent, ResourceWindow};
