//! # Company Research
//!
//! 批量调用联网搜索 LLM 对公司进行调研，并把结构化结果落盘的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有共享的限流和并发状态，只暴露能力
//! - `RateGate` - 基于滑动窗口的搜索次数限流（预估准入，实际结算）
//! - `ConcurrencyController` - 根据实际消耗推算并发数
//! - `AdmissionGate` - 可在运行中调整容量的并发闸门
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个条目
//! - `LlmService` - 调用 LLM 能力（实现 `ResearchClient`）
//! - `ResponseExtractor` / `RecordValidator` - 提取和校验能力
//! - `RetryCoordinator` - 传输重试和修复调用能力
//! - `JsonResultWriter` - 写结果文件能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个条目"的完整处理流程
//! - `ItemCtx` - 上下文封装（序号 + 标识）
//! - `ItemPipeline` - 流程编排（准入 → 调用 → 提取 → 校验 → 修复）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量处理器，管理资源和并发
//! - `orchestrator/progress` - 批次进度统计
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, PipelineError, TransportError};
pub use infrastructure::{AdmissionGate, ConcurrencyController, RateGate};
pub use models::{PipelineItem, PipelineResult, ResearchRecord};
pub use orchestrator::{AbortHandle, App, BatchProcessor, BatchSummary};
pub use services::{LlmService, ResearchClient};
pub use workflow::{ItemCtx, ItemOutcome, ItemPipeline, PipelineState};
