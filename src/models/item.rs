use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// 输入记录中的单个字段值
///
/// 输入文件中的数字、布尔值统一转为字符串，空值视为空串。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldValue(pub String);

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Visitor;

        struct ScalarVisitor;

        impl<'de> Visitor<'de> for ScalarVisitor {
            type Value = FieldValue;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string, number, boolean or null")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(FieldValue(value.to_string()))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(FieldValue(value.to_string()))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(FieldValue(value.to_string()))
            }

            fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(FieldValue(value.to_string()))
            }

            fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(FieldValue(value.to_string()))
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(FieldValue::default())
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(FieldValue::default())
            }
        }

        deserializer.deserialize_any(ScalarVisitor)
    }
}

/// 输入文件中的一条原始记录
pub type InputRecord = BTreeMap<String, FieldValue>;

/// 待处理条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineItem {
    /// 唯一标识（批次内去重依据）
    pub key: String,
    /// 原始字段
    pub fields: BTreeMap<String, String>,
}

impl PipelineItem {
    /// 从原始记录构建，标识字段缺失或为空时返回 `None`
    pub fn from_record(record: InputRecord, identity_field: &str) -> Option<Self> {
        let fields: BTreeMap<String, String> = record
            .into_iter()
            .map(|(k, v)| (k, v.0.trim().to_string()))
            .collect();
        let key = fields.get(identity_field)?.clone();
        if key.is_empty() {
            return None;
        }
        Some(Self { key, fields })
    }

    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let mut fields = BTreeMap::new();
        fields.insert("company_name".to_string(), key.clone());
        Self { key, fields }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// 读取非空字段
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// 按标识去重，保留第一次出现的条目
///
/// 返回 (去重后的条目, 被丢弃的重复数)
pub fn dedupe_items(items: Vec<PipelineItem>) -> (Vec<PipelineItem>, usize) {
    let total = items.len();
    let mut seen = HashSet::with_capacity(total);
    let unique: Vec<PipelineItem> = items
        .into_iter()
        .filter(|item| seen.insert(item.key.clone()))
        .collect();
    let duplicates = total - unique.len();
    (unique, duplicates)
}
