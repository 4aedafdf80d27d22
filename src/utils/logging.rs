//! 日志工具模块
//!
//! 提供日志初始化、格式化和输出的辅助函数

use std::fs;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::RateGateStats;
use crate::orchestrator::BatchSummary;

/// 初始化日志输出
///
/// 优先使用 `RUST_LOG`；未设置时默认 `info`，详细模式下为 `debug`。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> AppResult<()> {
    let log_header = format!(
        "{}\n公司调研处理日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header).map_err(|e| AppError::file(log_file_path, e))?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 自适应并发调研模式");
    info!("🤖 模型: {}", config.llm_model_name);
    info!(
        "📊 并发数: 初始 {} / 最大 {}{}",
        config.initial_concurrency,
        config.max_concurrency,
        if config.adaptive_concurrency {
            "（自适应）"
        } else {
            ""
        }
    );
    info!(
        "⏱️ 限流: 每 {} 秒最多 {} 次搜索",
        config.rate_window.as_secs(),
        config.resource_limit_per_window
    );
    if config.web_search {
        info!(
            "🌐 联网搜索: 开启（上下文 {}，单次最多计 {} 次）",
            config.web_search_context, config.web_search_max_uses
        );
    } else {
        info!("🌐 联网搜索: 关闭");
    }
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `summary`: 批次统计
/// - `gate`: 限流统计
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(summary: &BatchSummary, gate: &RateGateStats, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", summary.succeeded, summary.processed);
    info!("🎯 合格: {}", summary.qualified);
    info!("❌ 失败: {}", summary.failed);
    info!(
        "⏭️ 跳过: 已处理 {} / 重复 {}",
        summary.skipped_existing, summary.duplicates
    );
    info!(
        "🔍 搜索: {} 次 (平均每次请求 {:.1})",
        gate.total_units, gate.avg_units_per_request
    );
    info!("⏱️ 耗时: {:.1} 秒", summary.elapsed.as_secs_f64());
    if summary.aborted {
        info!("⚠️ 批次被中止");
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("短文本", 10), "短文本");
        assert_eq!(truncate_text("一二三四五", 3), "一二三...");
    }

    #[test]
    fn test_init_log_file_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");
        let path = path.to_str().unwrap();

        init_log_file(path).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("公司调研处理日志"));
    }
}
