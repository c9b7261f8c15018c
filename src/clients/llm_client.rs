//! LLM API 客户端
//!
//! - `OpenAiBackend`：使用 `async-openai` 发起单次调用，兼容 OpenAI API 的服务均可
//! - `LlmClient`：在单次调用之上做失败分类和重试
//!
//! 失败分类：
//! - 限流 / 额度：等待 61 秒再重试
//! - 过载等临时错误：指数退避
//! - 其他错误：固定间隔重试
//!
//! 总共最多 5 次，之后返回致命的 `GenerationError`

use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use regex::Regex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::GenerationError;
use crate::infrastructure::RetryPolicy;

/// 单次 LLM 请求
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system_instruction: String,
    pub user_prompt: String,
    /// 覆盖默认模型
    pub model: Option<String>,
    /// 要求只返回 JSON
    pub json_output: bool,
    /// 要求引用外部来源
    pub use_search: bool,
}

impl LlmRequest {
    pub fn new(system_instruction: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            user_prompt: user_prompt.into(),
            ..Default::default()
        }
    }

    pub fn json(mut self) -> Self {
        self.json_output = true;
        self
    }

    pub fn with_search(mut self) -> Self {
        self.use_search = true;
        self
    }
}

/// LLM 响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmResponse {
    pub text: String,
    /// 文本中出现的来源链接
    pub citations: Vec<String>,
}

impl LlmResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let citations = extract_citations(&text);
        Self { text, citations }
    }
}

/// 失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    Transient,
    Other,
}

/// 单次调用失败
#[derive(Debug, Clone)]
pub struct LlmCallError {
    pub kind: FailureKind,
    pub message: String,
}

impl LlmCallError {
    /// 根据错误信息自动分类
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: classify_failure(&message),
            message,
        }
    }
}

/// 根据错误信息判断失败类型
pub fn classify_failure(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    const RATE_LIMIT: [&str; 5] = ["429", "rate limit", "rate_limit", "quota", "resource_exhausted"];
    const TRANSIENT: [&str; 9] = [
        "500",
        "502",
        "503",
        "504",
        "overloaded",
        "unavailable",
        "timeout",
        "timed out",
        "connection",
    ];

    if RATE_LIMIT.iter().any(|p| lower.contains(p)) {
        FailureKind::RateLimited
    } else if TRANSIENT.iter().any(|p| lower.contains(p)) {
        FailureKind::Transient
    } else {
        FailureKind::Other
    }
}

fn extract_citations(text: &str) -> Vec<String> {
    let re = match Regex::new(r#"https?://[^\s}"'<>)\]]+"#) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    let mut urls: Vec<String> = Vec::new();
    for m in re.find_iter(text) {
        let url = m.as_str().trim_end_matches(['.', ',', ';']).to_string();
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

/// 单次调用的 LLM 后端
#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmCallError>;
}

/// 基于 `async-openai` 的后端
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl OpenAiBackend {
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        }
    }

    fn build_system_message(request: &LlmRequest) -> String {
        let mut system = request.system_instruction.clone();
        if request.json_output {
            system.push_str("\nRespond with a single valid JSON value and nothing else.");
        }
        if request.use_search {
            system.push_str("\nGround factual claims in real sources and cite them with full URLs.");
        }
        system
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmCallError> {
        let model = request.model.as_deref().unwrap_or(&self.model_name);
        debug!("调用 LLM API，模型: {}", model);
        debug!("用户消息长度: {} 字符", request.user_prompt.len());

        let build_err = |e: async_openai::error::OpenAIError| LlmCallError {
            kind: FailureKind::Other,
            message: format!("请求构建失败: {}", e),
        };

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(Self::build_system_message(request))
            .build()
            .map_err(build_err)?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(request.user_prompt.as_str())
            .build()
            .map_err(build_err)?;

        let messages = vec![
            ChatCompletionRequestMessage::System(system_msg),
            ChatCompletionRequestMessage::User(user_msg),
        ];

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(0.7)
            .build()
            .map_err(build_err)?;

        let response = self.client.chat().create(chat_request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            LlmCallError::from_message(e.to_string())
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        Ok(LlmResponse::from_text(content.trim()))
    }
}

/// 带重试的 LLM 客户端
#[derive(Clone)]
pub struct LlmClient {
    backend: Arc<dyn LlmBackend>,
}

impl LlmClient {
    /// 总尝试次数上限
    pub const MAX_ATTEMPTS: u32 = 5;

    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    fn policy_for(kind: FailureKind) -> RetryPolicy {
        match kind {
            FailureKind::RateLimited => RetryPolicy::llm_rate_limit(),
            FailureKind::Transient => RetryPolicy::llm_transient(),
            FailureKind::Other => RetryPolicy::llm_generic(),
        }
    }

    /// 发送请求，按失败类型重试
    pub async fn send(&self, request: &LlmRequest) -> Result<LlmResponse, GenerationError> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.backend.model_name().to_string());

        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match self.backend.complete(request).await {
                Ok(response) if !response.text.trim().is_empty() => return Ok(response),
                Ok(_) => LlmCallError {
                    kind: FailureKind::Other,
                    message: "LLM 返回内容为空".to_string(),
                },
                Err(e) => e,
            };

            if attempt >= Self::MAX_ATTEMPTS {
                warn!("LLM 调用失败 (尝试 {}/{})，放弃: {}", attempt, Self::MAX_ATTEMPTS, error.message);
                return Err(GenerationError::CallFailed {
                    model,
                    attempts: attempt,
                    message: error.message,
                });
            }

            let delay = Self::policy_for(error.kind).delay_for_attempt(attempt);
            warn!(
                "LLM 调用失败 (尝试 {}/{}, {:?})，等待 {:.1} 秒后重试: {}",
                attempt,
                Self::MAX_ATTEMPTS,
                error.kind,
                delay.as_secs_f32(),
                error.message
            );
            sleep(delay).await;
        }
    }

    /// 只取文本
    pub async fn send_text(&self, request: &LlmRequest) -> Result<String, GenerationError> {
        Ok(self.send(request).await?.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<LlmResponse, LlmCallError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<LlmResponse, LlmCallError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmCallError> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmCallError::from_message("script exhausted")))
        }
    }

    fn ok(text: &str) -> Result<LlmResponse, LlmCallError> {
        Ok(LlmResponse::from_text(text))
    }

    fn fail(message: &str) -> Result<LlmResponse, LlmCallError> {
        Err(LlmCallError::from_message(message))
    }

    #[test]
    fn test_classify_failure() {
        assert_eq!(classify_failure("HTTP 429 Too Many Requests"), FailureKind::RateLimited);
        assert_eq!(classify_failure("You exceeded your current quota"), FailureKind::RateLimited);
        assert_eq!(classify_failure("503 Service Unavailable"), FailureKind::Transient);
        assert_eq!(classify_failure("The model is overloaded"), FailureKind::Transient);
        assert_eq!(classify_failure("invalid api key"), FailureKind::Other);
    }

    #[test]
    fn test_citations_are_extracted_and_deduplicated() {
        let response = LlmResponse::from_text(
            "See https://arxiv.org/abs/1234.5678. Also \\url{https://example.org/x} and https://arxiv.org/abs/1234.5678",
        );
        assert_eq!(
            response.citations,
            vec!["https://arxiv.org/abs/1234.5678".to_string(), "https://example.org/x".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_61_seconds_before_retry() {
        let backend = ScriptedBackend::new(vec![fail("429 rate limit"), ok("hello")]);
        let client = LlmClient::new(backend.clone());

        let start = Instant::now();
        let text = client.send_text(&LlmRequest::new("sys", "user")).await.unwrap();

        assert_eq!(text, "hello");
        assert_eq!(backend.calls(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_back_off_exponentially() {
        let backend = ScriptedBackend::new(vec![fail("503"), fail("overloaded"), ok("done")]);
        let client = LlmClient::new(backend.clone());

        let start = Instant::now();
        client.send(&LlmRequest::new("sys", "user")).await.unwrap();

        // 第 1 次失败等 2 秒，第 2 次失败等 4 秒
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_five_attempts() {
        let backend = ScriptedBackend::new(vec![
            fail("bad request"),
            fail("bad request"),
            fail("bad request"),
            fail("bad request"),
            fail("bad request"),
            ok("never reached"),
        ]);
        let client = LlmClient::new(backend.clone());

        let err = client.send(&LlmRequest::new("sys", "user")).await.unwrap_err();

        assert_eq!(backend.calls(), 5);
        assert!(matches!(err, GenerationError::CallFailed { attempts: 5, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_content_is_retried() {
        let backend = ScriptedBackend::new(vec![ok("   "), ok("content")]);
        let client = LlmClient::new(backend.clone());
        assert_eq!(client.send_text(&LlmRequest::new("s", "u")).await.unwrap(), "content");
        assert_eq!(backend.calls(), 2);
    }
}
