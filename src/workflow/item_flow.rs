//! 条目处理流程 - 流程层
//!
//! 核心职责：定义"一个条目"的完整处理流程
//!
//! 状态转换：
//! ```text
//! Queued → Admitted → Called → ExtractedValid
//!                            → ExtractedInvalid → Repairing → RepairedValid
//!                                                           → Failed
//! ```
//! 准入后传输失败直接进入 `Failed`；结果落盘后由编排层标记为 `Recorded`。

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::PipelineError;
use crate::infrastructure::{ConcurrencyController, RateGate};
use crate::models::{PipelineItem, PipelineResult, ResearchRecord, UsageMetrics};
use crate::services::{
    format_item_input, ChatMessage, RecordValidator, ResearchClient, ResponseExtractor,
    RetryCoordinator, RetryPolicy,
};
use crate::workflow::item_ctx::ItemCtx;

/// 失败时保留的原始响应最大字符数
pub const RAW_EXCERPT_CHARS: usize = 5000;

/// 没有提取到 JSON 时交给修复调用的说明
const NO_JSON_VIOLATION: &str = "Response did not contain a parseable JSON object";

/// 条目处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Queued,
    Admitted,
    Called,
    ExtractedValid,
    ExtractedInvalid,
    Repairing,
    RepairedValid,
    Failed,
    Recorded,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::ExtractedValid
                | PipelineState::RepairedValid
                | PipelineState::Failed
                | PipelineState::Recorded
        )
    }
}

/// 单个条目的处理结果
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub key: String,
    /// 经历的状态（按顺序）
    pub path: Vec<PipelineState>,
    pub result: PipelineResult,
}

impl ItemOutcome {
    /// 当前（最后）状态
    pub fn state(&self) -> PipelineState {
        self.path.last().copied().unwrap_or(PipelineState::Queued)
    }

    /// 结果已交给持久化层
    pub fn mark_recorded(&mut self) {
        self.path.push(PipelineState::Recorded);
    }
}

/// 条目处理流程
///
/// - 编排单个条目的 准入 → 调用 → 提取 → 校验 → 修复
/// - 任何失败都转换为 `PipelineResult::Failure`，从不向上抛出
/// - 不关心落盘和批次进度
pub struct ItemPipeline<C> {
    retry: RetryCoordinator<C>,
    rate_gate: Arc<RateGate>,
    controller: Arc<ConcurrencyController>,
    extractor: ResponseExtractor,
    validator: RecordValidator,
    system_prompt: String,
    estimated_units: u64,
    verbose_logging: bool,
}

impl<C: ResearchClient> ItemPipeline<C> {
    /// 创建新的条目处理流程
    pub fn new(
        client: Arc<C>,
        rate_gate: Arc<RateGate>,
        controller: Arc<ConcurrencyController>,
        system_prompt: impl Into<String>,
        config: &Config,
    ) -> Self {
        Self {
            retry: RetryCoordinator::new(
                client,
                RetryPolicy::from_config(config),
                config.repair_max_attempts,
            ),
            rate_gate,
            controller,
            extractor: ResponseExtractor::new(),
            validator: RecordValidator::new(),
            system_prompt: system_prompt.into(),
            estimated_units: config.estimated_units_per_item,
            verbose_logging: config.verbose_logging,
        }
    }

    pub async fn run(&self, item: &PipelineItem, ctx: &ItemCtx) -> ItemOutcome {
        let mut run = ItemRun::new(ctx);
        let user_message = format_item_input(item);

        // ========== 准入 + 首次调用 ==========
        let reservation = self.rate_gate.acquire(self.estimated_units).await;
        run.advance(PipelineState::Admitted);

        let conversation = [ChatMessage::user(user_message.as_str())];
        let completion = match self.retry.call(&self.system_prompt, &conversation).await {
            Ok(completion) => completion,
            Err(e) => {
                drop(reservation);
                return run.fail(e, None);
            }
        };

        let units = completion.usage.resource_units;
        reservation.consume(units);
        let level = self.controller.record(units);
        run.usage += completion.usage;
        run.advance(PipelineState::Called);
        debug!("{} 消耗 {} 个资源单位，建议并发 {}", ctx, units, level);

        if self.verbose_logging {
            debug!(
                "{} 响应预览: {}",
                ctx,
                crate::utils::logging::truncate_text(&completion.text, 200)
            );
        }

        // ========== 提取 + 校验 ==========
        let violations = match self.parse(&completion.text) {
            Ok(record) => {
                run.advance(PipelineState::ExtractedValid);
                return run.succeed(record, false);
            }
            Err(PipelineError::ValidationFailed { violations }) => violations,
            Err(_) => vec![NO_JSON_VIOLATION.to_string()],
        };
        run.advance(PipelineState::ExtractedInvalid);
        warn!("{} ⚠️ 响应不合规: {}", ctx, violations.join("; "));

        // ========== 修复 ==========
        run.advance(PipelineState::Repairing);
        let excerpt = raw_excerpt(&completion.text);

        let reservation = self.rate_gate.acquire(self.estimated_units).await;
        let repaired = match self
            .retry
            .repair(
                &self.system_prompt,
                &user_message,
                &completion.text,
                &item.key,
                &violations,
            )
            .await
        {
            Ok(completion) => completion,
            Err(e) => {
                drop(reservation);
                let reason = format!("修复调用失败: {}", e);
                return run.fail(PipelineError::RepairExhausted { reason }, Some(excerpt));
            }
        };
        reservation.consume(repaired.usage.resource_units);
        run.usage += repaired.usage;

        match self.parse(&repaired.text) {
            Ok(record) => {
                run.advance(PipelineState::RepairedValid);
                run.succeed(record, true)
            }
            Err(e) => run.fail(
                PipelineError::RepairExhausted {
                    reason: e.to_string(),
                },
                Some(excerpt),
            ),
        }
    }

    fn parse(&self, text: &str) -> Result<ResearchRecord, PipelineError> {
        let extraction = self.extractor.extract(text)?;
        self.validator
            .into_record(extraction.value)
            .map_err(|violations| PipelineError::ValidationFailed { violations })
    }
}

/// 单次运行的状态和计量
struct ItemRun<'a> {
    ctx: &'a ItemCtx,
    started: Instant,
    path: Vec<PipelineState>,
    usage: UsageMetrics,
}

impl<'a> ItemRun<'a> {
    fn new(ctx: &'a ItemCtx) -> Self {
        Self {
            ctx,
            started: Instant::now(),
            path: vec![PipelineState::Queued],
            usage: UsageMetrics::default(),
        }
    }

    fn advance(&mut self, state: PipelineState) {
        debug!("{} 状态: {:?}", self.ctx, state);
        self.path.push(state);
    }

    fn succeed(self, record: ResearchRecord, repaired: bool) -> ItemOutcome {
        let elapsed = self.started.elapsed();
        info!(
            "{} ✅ 完成{} ({}, 合格: {}, 耗时 {:.1}s)",
            self.ctx,
            if repaired { "（经修复）" } else { "" },
            record.company_classification.kind,
            record.is_qualified(),
            elapsed.as_secs_f64()
        );
        ItemOutcome {
            key: self.ctx.key.clone(),
            path: self.path,
            result: PipelineResult::Success {
                record,
                usage: self.usage,
                elapsed,
                repaired,
            },
        }
    }

    fn fail(mut self, error: PipelineError, raw_text_excerpt: Option<String>) -> ItemOutcome {
        self.advance(PipelineState::Failed);
        let elapsed = self.started.elapsed();
        error!("{} ❌ 处理失败: {}", self.ctx, error);
        ItemOutcome {
            key: self.ctx.key.clone(),
            path: self.path,
            result: PipelineResult::Failure {
                error_kind: error.kind(),
                message: error.to_string(),
                usage: self.usage,
                elapsed,
                raw_text_excerpt,
            },
        }
    }
}

fn raw_excerpt(text: &str) -> String {
    text.chars().take(RAW_EXCERPT_CHARS).collect()
}
