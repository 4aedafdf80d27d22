//! 结果写入服务 - 业务能力层
//!
//! 只负责"把单个条目的结果落盘"，不关心流程
//!
//! 目录结构：
//! - `<名称>_<哈希>.json`：每个条目一个结果文件
//! - `_index.json`：已成功处理的条目 → 文件名
//! - `_errors.json`：失败记录列表
//!
//! 所有文件都先写临时文件再重命名，进程中断不会留下半截文件。

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::models::{PipelineItem, PipelineResult};

const INDEX_FILE: &str = "_index.json";
const ERRORS_FILE: &str = "_errors.json";
const MAX_NAME_LEN: usize = 100;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("unsafe char pattern is valid"));
static SEPARATOR_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_]+").expect("separator pattern is valid"));

/// 结果持久化接口
pub trait ResultSink: Send + Sync {
    /// 保存单个条目的最终结果
    fn persist(
        &self,
        item: &PipelineItem,
        result: &PipelineResult,
    ) -> impl Future<Output = AppResult<()>> + Send;
}

/// `_errors.json` 中的一条记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub company_name: String,
    pub error_type: String,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Default)]
struct WriterState {
    index: BTreeMap<String, String>,
    errors: Vec<ErrorEntry>,
}

/// JSON 文件结果写入器
#[derive(Debug)]
pub struct JsonResultWriter {
    output_dir: PathBuf,
    model_name: String,
    state: Mutex<WriterState>,
}

impl JsonResultWriter {
    /// 打开输出目录，读取已有的索引和错误记录
    pub async fn open(output_dir: impl Into<PathBuf>, model_name: impl Into<String>) -> AppResult<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| AppError::file(output_dir.display().to_string(), e))?;

        let index: BTreeMap<String, String> =
            read_json(&output_dir.join(INDEX_FILE)).await?.unwrap_or_default();
        let errors: Vec<ErrorEntry> =
            read_json(&output_dir.join(ERRORS_FILE)).await?.unwrap_or_default();
        debug!(
            "结果目录 {}: 已处理 {} 条，错误 {} 条",
            output_dir.display(),
            index.len(),
            errors.len()
        );

        Ok(Self {
            output_dir,
            model_name: model_name.into(),
            state: Mutex::new(WriterState { index, errors }),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// 已成功处理的条目标识
    pub async fn processed_keys(&self) -> HashSet<String> {
        self.state.lock().await.index.keys().cloned().collect()
    }

    /// 当前错误记录
    pub async fn errors(&self) -> Vec<ErrorEntry> {
        self.state.lock().await.errors.clone()
    }

    fn result_document(&self, item: &PipelineItem, result: &PipelineResult) -> Value {
        let mut meta = json!({
            "processed_at": Utc::now().to_rfc3339(),
            "model": self.model_name,
            "processing_time_sec": round2(result.elapsed().as_secs_f64()),
            "usage": result.usage(),
        });

        match result {
            PipelineResult::Success {
                record, repaired, ..
            } => {
                meta["repaired"] = json!(repaired);
                json!({
                    "success": true,
                    "company_name": item.key,
                    "meta": meta,
                    "input_data": item.fields,
                    "result": record,
                    "error": null,
                })
            }
            PipelineResult::Failure {
                error_kind,
                message,
                raw_text_excerpt,
                ..
            } => json!({
                "success": false,
                "company_name": item.key,
                "meta": meta,
                "input_data": item.fields,
                "result": null,
                "error": message,
                "error_kind": error_kind,
                "raw_response": raw_text_excerpt,
            }),
        }
    }
}

impl ResultSink for JsonResultWriter {
    async fn persist(&self, item: &PipelineItem, result: &PipelineResult) -> AppResult<()> {
        let filename = format!("{}.json", result_filename(item));
        let document = self.result_document(item, result);
        write_json_atomic(&self.output_dir.join(&filename), &document).await?;

        // 索引和错误记录的读改写需要串行
        let mut state = self.state.lock().await;
        match result {
            PipelineResult::Success { .. } => {
                state.index.insert(item.key.clone(), filename.clone());
                write_json_atomic(&self.output_dir.join(INDEX_FILE), &state.index).await?;
            }
            PipelineResult::Failure {
                error_kind,
                message,
                ..
            } => {
                state.errors.push(ErrorEntry {
                    company_name: item.key.clone(),
                    error_type: serde_json::to_value(error_kind)?
                        .as_str()
                        .unwrap_or("processing_error")
                        .to_string(),
                    error_message: message.clone(),
                    timestamp: Utc::now().to_rfc3339(),
                });
                write_json_atomic(&self.output_dir.join(ERRORS_FILE), &state.errors).await?;
            }
        }

        debug!("[{}] 结果已写入 {}", item.key, filename);
        Ok(())
    }
}

/// 把名称转换为安全的文件名
pub fn sanitize_filename(name: &str) -> String {
    let replaced = UNSAFE_CHARS.replace_all(name, "_");
    let collapsed = SEPARATOR_RUNS.replace_all(&replaced, "_");
    let trimmed: String = collapsed
        .trim_matches(|c| c == '_' || c == '.')
        .chars()
        .take(MAX_NAME_LEN)
        .collect();
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed
    }
}

/// 结果文件名（不含扩展名）
///
/// 名称相同但网站不同的条目通过哈希后缀区分：取 `名称_网站` 的 SHA-256 前 8 位十六进制。
pub fn result_filename(item: &PipelineItem) -> String {
    let unique = format!("{}_{}", item.key, item.field("website").unwrap_or_default());
    let digest = Sha256::digest(unique.as_bytes());
    let suffix: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}_{}", sanitize_filename(&item.key), suffix)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> AppResult<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("⚠️ 无法解析 {}，按空文件处理: {}", path.display(), e);
                Ok(None)
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::file(path.display().to_string(), e)),
    }
}

/// 先写同目录的临时文件，再重命名覆盖目标
async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> AppResult<()> {
    let content = serde_json::to_string_pretty(value)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&tmp_path, content)
        .await
        .map_err(|e| AppError::file(tmp_path.display().to_string(), e))?;
    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| AppError::file(path.display().to_string(), e))
}
