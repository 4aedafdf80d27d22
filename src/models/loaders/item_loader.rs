use std::path::Path;

use serde::Deserialize;
use tokio::fs;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::item::{InputRecord, PipelineItem};

/// TOML 输入文件结构：`[[items]]` 数组
#[derive(Debug, Deserialize)]
struct TomlInput {
    #[serde(default)]
    items: Vec<InputRecord>,
}

/// 从输入文件加载待处理条目
///
/// 按扩展名选择格式：`.toml` 读取 `[[items]]` 数组，其余按 JSON 数组解析。
/// 缺少标识字段的记录会被跳过并记录警告。
pub async fn load_items(path: &Path, identity_field: &str) -> AppResult<Vec<PipelineItem>> {
    let path_str = path.display().to_string();
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| AppError::file(&path_str, e))?;

    let records = parse_records(&content, path)?;
    let total = records.len();

    let items: Vec<PipelineItem> = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| {
            let item = PipelineItem::from_record(record, identity_field);
            if item.is_none() {
                warn!("第 {} 条记录缺少字段 {}，已跳过", index + 1, identity_field);
            }
            item
        })
        .collect();

    info!("✓ 从 {} 加载 {}/{} 条记录", path_str, items.len(), total);
    Ok(items)
}

fn parse_records(content: &str, path: &Path) -> AppResult<Vec<InputRecord>> {
    let path_str = path.display().to_string();
    if path.extension().and_then(|s| s.to_str()) == Some("toml") {
        let input: TomlInput =
            toml::from_str(content).map_err(|e| AppError::input_parse(&path_str, e))?;
        Ok(input.items)
    } else {
        serde_json::from_str(content).map_err(|e| AppError::input_parse(&path_str, e))
    }
}
