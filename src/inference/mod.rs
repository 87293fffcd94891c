use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{InferenceConfig, InferenceProvider};
use crate::utils::{NoticeError, NoticeResult};

/// 文本生成推理服务：一次提示词，一段原始文本回复
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> NoticeResult<String>;
}

/// Gemini generateContent 请求体
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<GenerateContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GenerateContent {
    role: String,
    parts: Vec<TextPart>,
}

#[derive(Serialize)]
struct TextPart {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

/// Gemini generateContent 响应体
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// OpenAI 兼容 chat/completions 请求体
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct HttpInference {
    client: reqwest::Client,
    config: InferenceConfig,
}

impl HttpInference {
    pub fn new(config: InferenceConfig) -> NoticeResult<Self> {
        if !config.is_configured() {
            return Err(NoticeError::Config(format!(
                "API key 未配置，请设置 {} 或 [inference] api_key",
                crate::config::API_KEY_ENV
            )));
        }

        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs));

        if !config.proxy.is_empty() {
            match reqwest::Proxy::all(&config.proxy) {
                Ok(proxy) => {
                    info!("使用代理: {}", config.proxy);
                    builder = builder.proxy(proxy);
                }
                Err(e) => {
                    warn!("代理配置无效 '{}': {}", config.proxy, e);
                }
            }
        }

        let client = builder.build()?;
        Ok(Self { client, config })
    }

    async fn call_api(&self, prompt: &str) -> NoticeResult<String> {
        with_retry(
            self.config.max_attempts,
            self.config.retry_base_delay_ms,
            || self.do_request(prompt),
        )
        .await
    }

    async fn do_request(&self, prompt: &str) -> NoticeResult<String> {
        match self.config.provider {
            InferenceProvider::Gemini => self.request_gemini(prompt).await,
            InferenceProvider::OpenAi => self.request_chat(prompt).await,
        }
    }

    async fn request_gemini(&self, prompt: &str) -> NoticeResult<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_url.trim_end_matches('/'),
            self.config.model
        );
        let request = gemini_request(&self.config, prompt);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NoticeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: GenerateResponse = response.json().await?;
        gemini_text(body)
    }

    async fn request_chat(&self, prompt: &str) -> NoticeResult<String> {
        let request = chat_request(&self.config, prompt);

        let response = self
            .client
            .post(&self.config.api_url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NoticeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatResponse = response.json().await?;
        chat_text(body)
    }
}

#[async_trait]
impl InferenceBackend for HttpInference {
    async fn generate(&self, prompt: &str) -> NoticeResult<String> {
        debug!(
            "调用推理服务 {:?}/{}，提示词 {} 字符",
            self.config.provider,
            self.config.model,
            prompt.chars().count()
        );
        self.call_api(prompt).await
    }
}

/// 单次退避上限
const MAX_RETRY_DELAY_MS: u64 = 60_000;

/// 执行请求，仅对瞬时错误做有限次指数退避重试
async fn with_retry<T, F, Fut>(
    max_attempts: u32,
    base_delay_ms: u64,
    mut request: F,
) -> NoticeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = NoticeResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match request().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = backoff_delay(base_delay_ms, attempt);
                warn!(
                    "API 调用失败 (尝试 {}/{}): {}，{}ms 后重试",
                    attempt,
                    max_attempts,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// 第 n 次失败后的等待时间：base * 2^(n-1)，不超过上限
fn backoff_delay(base_delay_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(base_delay_ms.saturating_mul(factor).min(MAX_RETRY_DELAY_MS))
}

fn gemini_request(config: &InferenceConfig, prompt: &str) -> GenerateRequest {
    GenerateRequest {
        contents: vec![GenerateContent {
            role: "user".to_string(),
            parts: vec![TextPart {
                text: prompt.to_string(),
            }],
        }],
        generation_config: GenerationConfig {
            temperature: config.temperature,
        },
    }
}

fn chat_request(config: &InferenceConfig, prompt: &str) -> ChatRequest {
    ChatRequest {
        model: config.model.clone(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        }],
        temperature: config.temperature,
    }
}

/// 拼接第一个候选的全部文本片段
fn gemini_text(response: GenerateResponse) -> NoticeResult<String> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(NoticeError::Inference(format!("提示词被拦截: {}", reason)));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| NoticeError::Inference("响应中没有候选结果".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(NoticeError::Inference(format!(
            "候选结果为空 (finishReason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(text)
}

fn chat_text(response: ChatResponse) -> NoticeResult<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| NoticeError::Inference("响应中没有内容".to_string()))
}
