//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量处理器
//! - 管理应用生命周期（初始化、运行）
//! - 去重、跳过已处理条目、缓存预热
//! - 控制并发数量（AdmissionGate，按 ConcurrencyController 调整）
//! - 中止派发（AbortHandle）
//! - 输出全局统计信息
//!
//! ### `progress` - 批次进度
//! - 每个条目结束时更新计数
//! - 生成快照并通知观察者
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<PipelineItem>)
//!     ↓
//! workflow::ItemPipeline (处理单个条目)
//!     ↓
//! services (能力层：llm / extract / validate / retry / write)
//!     ↓
//! infrastructure (基础设施：RateGate / ConcurrencyController / AdmissionGate)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管批量，ItemPipeline 管单个
//! 2. **资源隔离**：只有编排层创建限流闸门和并发控制器
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **无业务逻辑**：只做调度和统计，不做具体业务判断

pub mod batch_processor;
pub mod progress;

// 重新导出主要类型
pub use batch_processor::{AbortHandle, App, BatchProcessor, BatchSummary};
pub use progress::{BatchProgress, LogProgressObserver, ProgressObserver, ProgressSnapshot};
