//! 远程调用接口
//!
//! 流程层只依赖这个 trait；生产实现见 [`LlmService`](super::LlmService)，
//! 测试中用脚本化的替身实现。

use std::future::Future;

use crate::error::TransportError;
use crate::models::UsageMetrics;

/// 对话角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// 对话中的一条消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// 一次调用的返回
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// 所有文本块拼接后的内容
    pub text: String,
    pub usage: UsageMetrics,
}

/// 结构化生成服务
pub trait ResearchClient: Send + Sync {
    /// 发送一次请求：系统提示词 + 对话
    fn complete(
        &self,
        system: &str,
        conversation: &[ChatMessage],
    ) -> impl Future<Output = Result<Completion, TransportError>> + Send;
}
