//! 条目处理上下文
//!
//! 封装"我正在处理第几个条目"这一信息

use std::fmt::Display;

/// 条目处理上下文
#[derive(Debug, Clone)]
pub struct ItemCtx {
    /// 条目标识
    pub key: String,

    /// 条目序号（从1开始，仅用于日志显示）
    pub index: usize,

    /// 本批次条目总数
    pub total: usize,
}

impl ItemCtx {
    pub fn new(key: impl Into<String>, index: usize, total: usize) -> Self {
        Self {
            key: key.into(),
            index,
            total,
        }
    }
}

impl Display for ItemCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{} {}]", self.index, self.total, self.key)
    }
}
