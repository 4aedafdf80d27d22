//! LLM 服务 - 业务能力层
//!
//! 只负责"发一次请求、拿回文本和用量"，不关心重试和校验
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionResponseMessage, ChatCompletionResponseMessageAnnotation,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse, WebSearchContextSize,
        WebSearchOptions,
    },
    Client,
};
use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::TransportError;
use crate::models::UsageMetrics;
use crate::services::client::{ChatMessage, ChatRole, Completion, ResearchClient};

/// LLM 服务
///
/// 职责：
/// - 把系统提示词和对话转换为 chat completion 请求
/// - 把响应转换为 [`Completion`]（文本 + 用量）
/// - 把 SDK 错误归类为 [`TransportError`]
/// - 不做重试，不解析 JSON
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
    max_tokens: u32,
    /// 联网搜索配置；`None` 表示不开启
    web_search: Option<WebSearchOptions>,
    max_search_uses: u64,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.llm_api_key.as_deref().unwrap_or_default())
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        let web_search = config.web_search.then(|| WebSearchOptions {
            search_context_size: Some(search_context_size(&config.web_search_context)),
            user_location: None,
        });

        Self {
            client,
            model_name: config.llm_model_name.clone(),
            max_tokens: config.max_tokens,
            web_search,
            max_search_uses: config.web_search_max_uses,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn build_messages(
        &self,
        system: &str,
        conversation: &[ChatMessage],
    ) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);

        if !system.is_empty() {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        for message in conversation {
            let built = match message.role {
                ChatRole::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(message.content.as_str())
                        .build()?,
                ),
                ChatRole::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(message.content.as_str())
                        .build()?,
                ),
            };
            messages.push(built);
        }

        Ok(messages)
    }
}

impl ResearchClient for LlmService {
    async fn complete(
        &self,
        system: &str,
        conversation: &[ChatMessage],
    ) -> Result<Completion, TransportError> {
        debug!(
            "调用 LLM API，模型: {}，消息 {} 条",
            self.model_name,
            conversation.len()
        );

        let messages = self
            .build_messages(system, conversation)
            .map_err(|e| TransportError::fatal(format!("构建请求失败: {}", e)))?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model_name)
            .messages(messages)
            .max_completion_tokens(self.max_tokens);
        if let Some(options) = &self.web_search {
            args.web_search_options(options.clone());
        }
        let request = args
            .build()
            .map_err(|e| TransportError::fatal(format!("构建请求失败: {}", e)))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            classify_error(e)
        })?;

        debug!("LLM API 调用成功");
        let search_cap = self.web_search.as_ref().map(|_| self.max_search_uses);
        Ok(into_completion(response, search_cap))
    }
}

fn search_context_size(value: &str) -> WebSearchContextSize {
    match value {
        "low" => WebSearchContextSize::Low,
        "high" => WebSearchContextSize::High,
        _ => WebSearchContextSize::Medium,
    }
}

/// 按可重试性归类 SDK 错误
fn classify_error(error: OpenAIError) -> TransportError {
    match error {
        OpenAIError::Reqwest(e) => {
            if e.is_timeout() {
                TransportError::Unavailable {
                    status: 504,
                    message: e.to_string(),
                }
            } else if let Some(status) = e.status() {
                TransportError::from_status(status.as_u16(), e.to_string())
            } else if e.is_connect() {
                TransportError::Unavailable {
                    status: 503,
                    message: e.to_string(),
                }
            } else {
                TransportError::fatal(e.to_string())
            }
        }
        OpenAIError::ApiError(api) => {
            let kind = api
                .r#type
                .as_deref()
                .or(api.code.as_deref())
                .unwrap_or_default();
            if kind.contains("rate_limit") {
                TransportError::RateLimited {
                    message: api.message,
                }
            } else if kind.contains("server_error") || kind.contains("overloaded") {
                TransportError::Unavailable {
                    status: 503,
                    message: api.message,
                }
            } else {
                TransportError::fatal(api.message)
            }
        }
        other => TransportError::fatal(other.to_string()),
    }
}

/// 估算单条消息触发的搜索次数
///
/// 取工具调用次数和引用的不同 URL 数中的较大者。
fn search_units(message: &ChatCompletionResponseMessage) -> u64 {
    let tool_calls = message.tool_calls.as_ref().map_or(0, Vec::len);
    let cited_urls = message
        .annotations
        .iter()
        .flatten()
        .map(|annotation| match annotation {
            ChatCompletionResponseMessageAnnotation::UrlCitation { url_citation } => {
                url_citation.url.as_str()
            }
        })
        .collect::<HashSet<_>>()
        .len();
    tool_calls.max(cited_urls) as u64
}

/// 拼接文本并读取用量
///
/// `search_cap` 为开启搜索时单次调用最多计入的搜索次数。开启搜索的调用至少计 1 次。
fn into_completion(
    response: CreateChatCompletionResponse,
    search_cap: Option<u64>,
) -> Completion {
    let text = response
        .choices
        .iter()
        .filter_map(|choice| choice.message.content.as_deref())
        .collect::<Vec<_>>()
        .join("\n");

    let observed: u64 = response
        .choices
        .iter()
        .map(|choice| search_units(&choice.message))
        .sum();
    let resource_units = match search_cap {
        Some(cap) => observed.clamp(1, cap.max(1)),
        None => observed,
    };

    let mut usage = UsageMetrics {
        resource_units,
        calls: 1,
        ..Default::default()
    };
    if let Some(reported) = response.usage {
        usage.input_tokens = u64::from(reported.prompt_tokens);
        usage.output_tokens = u64::from(reported.completion_tokens);
        usage.cache_read_tokens = reported
            .prompt_tokens_details
            .and_then(|details| details.cached_tokens)
            .map(u64::from)
            .unwrap_or(0);
    }

    Completion { text, usage }
}
