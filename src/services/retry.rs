//! 重试协调服务 - 业务能力层
//!
//! 两类重试：
//! - 传输重试：单次超时 + 指数退避，只针对可重试的传输错误
//! - 修复重试：带上前一次的无效响应和违规列表，再调用一次

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{PipelineError, TransportError};
use crate::services::client::{ChatMessage, Completion, ResearchClient};
use crate::services::prompt::build_repair_prompt;

/// 传输重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数（含第一次）
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 单次调用超时
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            timeout: config.request_timeout,
        }
    }

    /// 第 `attempt` 次（从 0 开始）失败后的等待时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// 限制尝试次数后的副本
    pub fn capped(self, max_attempts: u32) -> Self {
        Self {
            max_attempts: self.max_attempts.min(max_attempts).max(1),
            ..self
        }
    }
}

/// 重试协调器
pub struct RetryCoordinator<C> {
    client: Arc<C>,
    policy: RetryPolicy,
    repair_policy: RetryPolicy,
}

impl<C: ResearchClient> RetryCoordinator<C> {
    pub fn new(client: Arc<C>, policy: RetryPolicy, repair_max_attempts: u32) -> Self {
        Self {
            client,
            policy,
            repair_policy: policy.capped(repair_max_attempts),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 带传输重试的调用
    pub async fn call(
        &self,
        system: &str,
        conversation: &[ChatMessage],
    ) -> Result<Completion, PipelineError> {
        self.call_with(&self.policy, system, conversation).await
    }

    /// 修复调用
    ///
    /// 对话为：原始用户消息 → 前一次响应（assistant）→ 违规说明。
    pub async fn repair(
        &self,
        system: &str,
        original_user: &str,
        prior_response: &str,
        item_name: &str,
        violations: &[String],
    ) -> Result<Completion, PipelineError> {
        let conversation = [
            ChatMessage::user(original_user),
            ChatMessage::assistant(prior_response),
            ChatMessage::user(build_repair_prompt(item_name, violations)),
        ];
        debug!("[{}] 发起修复调用，违规 {} 项", item_name, violations.len());
        self.call_with(&self.repair_policy, system, &conversation)
            .await
    }

    async fn call_with(
        &self,
        policy: &RetryPolicy,
        system: &str,
        conversation: &[ChatMessage],
    ) -> Result<Completion, PipelineError> {
        let mut attempt = 0u32;
        loop {
            let outcome = match timeout(policy.timeout, self.client.complete(system, conversation))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(policy.timeout)),
            };

            let error = match outcome {
                Ok(completion) => return Ok(completion),
                Err(e) => e,
            };

            if !error.is_retryable() {
                warn!("❌ 不可重试的错误: {}", error);
                return Err(PipelineError::FatalTransport(error));
            }

            attempt += 1;
            if attempt >= policy.max_attempts {
                warn!("❌ 已重试 {} 次仍失败: {}", attempt, error);
                return Err(PipelineError::TransientTransport {
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = policy.delay_for(attempt - 1);
            warn!(
                "⚠️ 调用失败 (尝试 {}/{}): {}，{:.1} 秒后重试...",
                attempt,
                policy.max_attempts,
                error,
                delay.as_secs_f64()
            );
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Default)]
    struct ScriptedClient {
        script: Mutex<VecDeque<Option<Result<Completion, TransportError>>>>,
        calls: Mutex<Vec<(Instant, Vec<ChatMessage>)>>,
    }

    impl ScriptedClient {
        /// `None` 表示永不返回（触发超时）
        fn new(script: Vec<Option<Result<Completion, TransportError>>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::default(),
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }
    }

    impl ResearchClient for ScriptedClient {
        async fn complete(
            &self,
            _system: &str,
            conversation: &[ChatMessage],
        ) -> Result<Completion, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((Instant::now(), conversation.to_vec()));
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Some(result)) => result,
                Some(None) => std::future::pending().await,
                None => panic!("script exhausted"),
            }
        }
    }

    fn ok(text: &str) -> Option<Result<Completion, TransportError>> {
        Some(Ok(Completion {
            text: text.to_string(),
            ..Default::default()
        }))
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
            timeout: Duration::from_secs(180),
        }
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = policy(5);
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(5), Duration::from_secs(64));
        assert_eq!(policy.delay_for(6), Duration::from_secs(120));
        assert_eq!(policy.delay_for(40), Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_then_success() {
        let client = ScriptedClient::new(vec![
            Some(Err(TransportError::from_status(429, "slow down"))),
            Some(Err(TransportError::from_status(503, "busy"))),
            ok("done"),
        ]);
        let coordinator = RetryCoordinator::new(client.clone(), policy(5), 2);

        let start = Instant::now();
        let completion = coordinator.call("sys", &[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(completion.text, "done");

        let offsets: Vec<Duration> = client
            .call_times()
            .into_iter()
            .map(|t| t - start)
            .collect();
        assert_eq!(
            offsets,
            vec![
                Duration::ZERO,
                Duration::from_secs(2),
                Duration::from_secs(6)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let client = ScriptedClient::new(vec![Some(Err(TransportError::from_status(401, "bad key")))]);
        let coordinator = RetryCoordinator::new(client.clone(), policy(5), 2);

        let err = coordinator.call("sys", &[]).await.unwrap_err();
        assert!(matches!(err, PipelineError::FatalTransport(_)));
        assert_eq!(client.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempts() {
        let client = ScriptedClient::new(vec![
            Some(Err(TransportError::from_status(500, "a"))),
            Some(Err(TransportError::from_status(502, "b"))),
            Some(Err(TransportError::from_status(529, "c"))),
        ]);
        let coordinator = RetryCoordinator::new(client.clone(), policy(3), 2);

        let err = coordinator.call("sys", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::TransientTransport { attempts: 3, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_transient() {
        let client = ScriptedClient::new(vec![None, ok("late but fine")]);
        let coordinator = RetryCoordinator::new(client.clone(), policy(2), 2);

        let start = Instant::now();
        let completion = coordinator.call("sys", &[]).await.unwrap();
        assert_eq!(completion.text, "late but fine");
        // 180 秒超时 + 2 秒退避
        assert_eq!(client.call_times()[1] - start, Duration::from_secs(182));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repair_conversation_and_attempt_cap() {
        let client = ScriptedClient::new(vec![
            Some(Err(TransportError::from_status(503, "busy"))),
            Some(Err(TransportError::from_status(503, "busy"))),
        ]);
        let coordinator = RetryCoordinator::new(client.clone(), policy(5), 2);

        let violations = vec!["Missing required field: qualification".to_string()];
        let err = coordinator
            .repair("sys", "analyze X", "{\"company_name\": \"X\"}", "X", &violations)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::TransientTransport { attempts: 2, .. }
        ));

        let calls = client.calls.lock().unwrap();
        let conversation = &calls[0].1;
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation[0], ChatMessage::user("analyze X"));
        assert_eq!(
            conversation[1],
            ChatMessage::assistant("{\"company_name\": \"X\"}")
        );
        assert!(conversation[2]
            .content
            .contains("- Missing required field: qualification"));
    }
}
