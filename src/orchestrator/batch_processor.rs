//! 批量处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量条目的调度和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：日志文件、系统提示词、结果目录、LLM 客户端
//! 2. **去重与续跑**：按标识去重（保留第一次出现），跳过已处理的条目
//! 3. **缓存预热**：第一个条目顺序处理，其余并发
//! 4. **并发控制**：`AdmissionGate` 限制同时处理的条目数，并按控制器建议调整
//! 5. **中止**：`AbortHandle` 停止派发新条目，已在处理的条目正常完成
//! 6. **全局统计**：每个条目结束时更新进度并通知观察者
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个条目的细节，委托 `ItemPipeline`
//! - **失败隔离**：单个条目失败只体现在统计中，从不中断批次
//! - **资源所有者**：唯一持有 `RateGate` / `ConcurrencyController` 的模块

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{AdmissionGate, ConcurrencyController, RateGate, RateGateStats};
use crate::models::{dedupe_items, load_items, PipelineItem};
use crate::orchestrator::progress::{BatchProgress, LogProgressObserver, ProgressObserver};
use crate::services::{JsonResultWriter, LlmService, ResearchClient, ResultSink};
use crate::utils::logging;
use crate::workflow::{ItemCtx, ItemOutcome, ItemPipeline};

/// 批次中止句柄
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    inner: Arc<AbortState>,
}

#[derive(Debug, Default)]
struct AbortState {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortHandle {
    /// 停止派发新条目
    pub fn abort(&self) {
        if !self.inner.aborted.swap(true, Ordering::SeqCst) {
            warn!("⚠️ 收到中止请求，等待处理中的条目完成...");
        }
        self.inner.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// 等待中止
    pub async fn aborted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

/// 批次统计
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    /// 输入条目数
    pub total_input: usize,
    /// 重复条目数
    pub duplicates: usize,
    /// 已处理过而跳过的条目数
    pub skipped_existing: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub qualified: usize,
    pub resource_units: u64,
    /// 是否被中止
    pub aborted: bool,
    pub elapsed: Duration,
    /// 每个已处理条目的结果
    pub outcomes: Vec<ItemOutcome>,
}

/// 并发任务共享的部分
struct Shared<C, S> {
    pipeline: ItemPipeline<C>,
    sink: Arc<S>,
    observer: Arc<dyn ProgressObserver>,
    controller: Arc<ConcurrencyController>,
    adaptive: bool,
}

impl<C: ResearchClient, S: ResultSink> Shared<C, S> {
    /// 处理单个条目：流程 → 落盘 → 进度 → 调整并发
    async fn process(
        &self,
        item: PipelineItem,
        ctx: ItemCtx,
        progress: &BatchProgress,
        admission: &AdmissionGate,
    ) -> ItemOutcome {
        let mut outcome = self.pipeline.run(&item, &ctx).await;

        match self.sink.persist(&item, &outcome.result).await {
            Ok(()) => outcome.mark_recorded(),
            Err(e) => error!("{} ❌ 结果写入失败: {}", ctx, e),
        }

        let snapshot = progress.record(&outcome.result);
        self.observer.on_progress(&snapshot);

        if self.adaptive {
            admission.resize(self.controller.current_level());
        }
        outcome
    }
}

/// 批量处理器
pub struct BatchProcessor<C, S> {
    shared: Arc<Shared<C, S>>,
    rate_gate: Arc<RateGate>,
    initial_concurrency: usize,
    warm_up: bool,
    abort: AbortHandle,
}

impl<C, S> BatchProcessor<C, S>
where
    C: ResearchClient + 'static,
    S: ResultSink + 'static,
{
    /// 创建批量处理器
    pub fn new(
        client: Arc<C>,
        sink: Arc<S>,
        system_prompt: impl Into<String>,
        config: &Config,
    ) -> Self {
        let rate_gate = Arc::new(RateGate::new(
            config.resource_limit_per_window,
            config.rate_window,
        ));
        let controller = Arc::new(ConcurrencyController::new(
            config.initial_concurrency,
            config.max_concurrency,
            config.resource_limit_per_window,
        ));
        let pipeline = ItemPipeline::new(
            client,
            rate_gate.clone(),
            controller.clone(),
            system_prompt,
            config,
        );

        Self {
            shared: Arc::new(Shared {
                pipeline,
                sink,
                observer: Arc::new(LogProgressObserver),
                controller,
                adaptive: config.adaptive_concurrency,
            }),
            rate_gate,
            initial_concurrency: config.initial_concurrency.clamp(1, config.max_concurrency.max(1)),
            warm_up: config.warm_up,
            abort: AbortHandle::default(),
        }
    }

    /// 替换进度观察者
    ///
    /// 只能在 `run` 之前调用。
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.observer = observer;
        }
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn rate_gate_stats(&self) -> RateGateStats {
        self.rate_gate.stats()
    }

    pub fn concurrency_level(&self) -> usize {
        self.shared.controller.current_level()
    }

    /// 处理一批条目
    ///
    /// `processed` 中的标识会被跳过。单个条目的失败不会中断批次。
    pub async fn run(&self, items: Vec<PipelineItem>, processed: &HashSet<String>) -> BatchSummary {
        let started = Instant::now();
        let total_input = items.len();

        let (unique, duplicates) = dedupe_items(items);
        if duplicates > 0 {
            info!("🔁 去除重复条目 {} 个", duplicates);
        }

        let pending: Vec<PipelineItem> = unique
            .into_iter()
            .filter(|item| !processed.contains(&item.key))
            .collect();
        let skipped_existing = total_input - duplicates - pending.len();
        if skipped_existing > 0 {
            info!("⏭️ 跳过已处理的条目 {} 个", skipped_existing);
        }

        let mut summary = BatchSummary {
            total_input,
            duplicates,
            skipped_existing,
            ..Default::default()
        };

        if pending.is_empty() {
            info!("✓ 没有需要处理的条目");
            summary.elapsed = started.elapsed();
            return summary;
        }

        let total = pending.len();
        info!(
            "📋 开始处理 {} 个条目 (初始并发 {})",
            total, self.initial_concurrency
        );

        let progress = Arc::new(BatchProgress::new(total));
        let admission = AdmissionGate::new(self.initial_concurrency);
        let mut queue = pending
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                let ctx = ItemCtx::new(item.key.clone(), i + 1, total);
                (item, ctx)
            })
            .peekable();

        // ========== 预热：第一个条目顺序处理 ==========
        if self.warm_up && total > 1 && !self.abort.is_aborted() {
            if let Some((item, ctx)) = queue.next() {
                info!("🔥 预热提示词缓存: {}", ctx.key);
                let outcome = self
                    .shared
                    .process(item, ctx, &progress, &admission)
                    .await;
                summary.outcomes.push(outcome);
            }
        }

        // ========== 并发处理其余条目 ==========
        let mut tasks = JoinSet::new();
        while queue.peek().is_some() {
            let permit = tokio::select! {
                biased;
                _ = self.abort.aborted() => break,
                permit = admission.acquire() => permit,
            };
            let permit = match permit {
                Ok(permit) => permit,
                Err(e) => {
                    error!("❌ 准入闸门已关闭: {}", e);
                    break;
                }
            };
            let Some((item, ctx)) = queue.next() else {
                break;
            };

            let shared = self.shared.clone();
            let progress = progress.clone();
            let admission = admission.clone();
            tasks.spawn(async move {
                let _permit = permit;
                shared.process(item, ctx, &progress, &admission).await
            });

            while let Some(joined) = tasks.try_join_next() {
                collect(&mut summary, joined);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            collect(&mut summary, joined);
        }

        let snapshot = progress.snapshot();
        summary.processed = snapshot.processed;
        summary.succeeded = snapshot.succeeded;
        summary.failed = snapshot.failed;
        summary.qualified = snapshot.qualified;
        summary.resource_units = snapshot.resource_units;
        summary.aborted = self.abort.is_aborted();
        summary.elapsed = started.elapsed();

        if summary.aborted {
            warn!(
                "⚠️ 批次已中止，未处理 {} 个条目",
                total - summary.processed
            );
        }
        summary
    }
}

fn collect(summary: &mut BatchSummary, joined: Result<ItemOutcome, tokio::task::JoinError>) {
    match joined {
        Ok(outcome) => summary.outcomes.push(outcome),
        Err(e) => error!("❌ 任务执行失败: {}", e),
    }
}

/// 应用主结构
pub struct App {
    config: Config,
    writer: Arc<JsonResultWriter>,
    processor: BatchProcessor<LlmService, JsonResultWriter>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> AppResult<Self> {
        // 初始化日志文件
        logging::init_log_file(&config.output_log_file)?;

        logging::log_startup(&config);

        let system_prompt = config
            .load_system_prompt()
            .map_err(|e| AppError::file(config.system_prompt_file.display().to_string(), e))?;

        let writer = Arc::new(
            JsonResultWriter::open(&config.raw_output_dir, &config.llm_model_name).await?,
        );
        let client = Arc::new(LlmService::new(&config));
        let processor = BatchProcessor::new(client, writer.clone(), system_prompt, &config);

        Ok(Self {
            config,
            writer,
            processor,
        })
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.processor.abort_handle()
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> AppResult<BatchSummary> {
        info!("\n📁 正在加载输入文件...");
        let items = load_items(&self.config.input_file, &self.config.identity_field).await?;

        if items.is_empty() {
            warn!("⚠️ 输入文件中没有可处理的条目，程序结束");
            return Ok(BatchSummary::default());
        }

        let processed = self.writer.processed_keys().await;
        let summary = self.processor.run(items, &processed).await;

        logging::print_final_stats(
            &summary,
            &self.processor.rate_gate_stats(),
            &self.config.output_log_file,
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_abort_handle_wakes_waiters() {
        let handle = AbortHandle::default();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.aborted().await })
        };
        tokio::task::yield_now().await;
        assert!(!handle.is_aborted());

        handle.abort();
        waiter.await.unwrap();
        assert!(handle.is_aborted());

        // 已中止时立即返回
        handle.aborted().await;
    }
}
