//! 对话接口客户端
//!
//! 封装对外部模型服务的调用：限流、超时、有界重试。
//! 调用方拿到的要么是回复，要么是一个失败值，从不 panic。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{ApiError, AppError, AppResult};
use crate::infrastructure::RateLimiter;
use crate::models::Verdict;

/// 附带的媒体（目前只有图片）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadMedium {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// 请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub query: String,
    pub inputs: Map<String, JsonValue>,
    pub response_mode: String,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub upload_mediums: Vec<UploadMedium>,
}

impl ChatRequest {
    /// 纯文本请求
    pub fn text(query: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            inputs: Map::new(),
            response_mode: "blocking".to_string(),
            user: user.into(),
            conversation_id: None,
            upload_mediums: Vec::new(),
        }
    }

    /// 附加一张图片
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.upload_mediums.push(UploadMedium {
            url: url.into(),
            kind: "image".to_string(),
        });
        self
    }

    /// 携带 conversation_id（空串视为没有）
    pub fn with_conversation(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id.filter(|id| !id.is_empty());
        self
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    conversation_id: Option<String>,
}

/// 成功的回复
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub answer: String,
    pub conversation_id: Option<String>,
    /// 请求携带的 conversation_id 被服务端判定无效并已丢弃
    pub token_reset: bool,
    pub attempts: u32,
}

/// 调用失败的结果值
#[derive(Debug)]
pub enum CallFailure {
    /// 瞬时错误重试耗尽
    Exhausted { attempts: u32, last: ApiError },
    /// 不可重试的错误（4xx 等），没有重试
    Rejected(ApiError),
}

impl CallFailure {
    /// 失败对应的单行结论
    pub fn verdict(&self) -> Verdict {
        match self {
            CallFailure::Exhausted { last, .. } if last.is_timeout() => Verdict::RequestTimeout,
            CallFailure::Exhausted { .. } => Verdict::ProcessingFailed,
            CallFailure::Rejected(_) => Verdict::ServiceError,
        }
    }
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallFailure::Exhausted { attempts, last } => {
                write!(f, "已重试 {} 次仍失败: {}", attempts, last)
            }
            CallFailure::Rejected(e) => write!(f, "请求被拒绝: {}", e),
        }
    }
}

/// 带限流和重试的对话客户端
///
/// 职责：
/// - 每次尝试前从限流器取令牌
/// - 超时 / 连接错误 / 5xx / 429 重试，其余 4xx 立即返回
/// - 501 且提示 conversation_id 无效时，丢弃 conversation_id 再试一次
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    max_retries: u32,
    backoff_base: Duration,
    max_retry_after: Duration,
    limiter: Arc<RateLimiter>,
}

impl ChatClient {
    pub fn new(config: &Config, api_key: impl Into<String>, limiter: Arc<RateLimiter>) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.read_timeout())
            .build()
            .map_err(|e| AppError::Api(ApiError::BuildFailed(e.to_string())))?;

        Ok(Self {
            http,
            endpoint: config.api_url.clone(),
            api_key: api_key.into(),
            max_retries: config.max_retries.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            max_retry_after: Duration::from_secs(config.max_retry_after_secs),
            limiter,
        })
    }

    /// 发送请求
    ///
    /// # 返回
    /// - `Ok(ChatReply)`: 拿到 answer
    /// - `Err(CallFailure)`: 失败值，由调用方转换为单行结论
    pub async fn send(&self, mut request: ChatRequest) -> Result<ChatReply, CallFailure> {
        let mut failures: u32 = 0;
        let mut token_reset = false;

        loop {
            self.limiter.acquire().await;

            debug!(
                "发送请求: user={} 图片={} conversation_id={:?}",
                request.user,
                request.upload_mediums.len(),
                request.conversation_id
            );

            let err = match self.send_once(&request).await {
                Ok(body) => {
                    return Ok(ChatReply {
                        answer: body.answer,
                        conversation_id: body.conversation_id.filter(|id| !id.is_empty()),
                        token_reset,
                        attempts: failures + 1,
                    });
                }
                Err(e) => e,
            };

            if !token_reset && request.conversation_id.is_some() && is_invalid_conversation(&err) {
                warn!("conversation_id 已失效，去掉后重试");
                request.conversation_id = None;
                token_reset = true;
                continue;
            }

            if !err.is_transient() {
                error!("请求失败且不可重试: {}", err);
                return Err(CallFailure::Rejected(err));
            }

            failures += 1;
            if failures >= self.max_retries {
                error!("API请求达到最大重试次数 ({}): {}", self.max_retries, err);
                return Err(CallFailure::Exhausted {
                    attempts: failures,
                    last: err,
                });
            }

            let wait = self.retry_delay(failures, &err);
            warn!(
                "请求失败 (尝试 {}/{}): {}，{:.1} 秒后重试",
                failures,
                self.max_retries,
                err,
                wait.as_secs_f64()
            );
            sleep(wait).await;
        }
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<ChatResponseBody, ApiError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        info!("审核响应状态: {}", status.as_u16());

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(|secs| secs.max(0.0).ceil() as u64);
            return Err(ApiError::RateLimited {
                endpoint: self.endpoint.clone(),
                retry_after,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("审核响应错误: {}", crate::utils::truncate_text(&body, 200));
            return Err(ApiError::BadStatus {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await.map_err(|e| self.classify(e))?;
        serde_json::from_str::<ChatResponseBody>(&text)
            .map_err(|e| ApiError::JsonParseFailed(e.to_string()))
    }

    fn classify(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout {
                endpoint: self.endpoint.clone(),
            }
        } else {
            ApiError::RequestFailed {
                endpoint: self.endpoint.clone(),
                source: err,
            }
        }
    }

    /// 第 n 次失败后的等待时间
    fn retry_delay(&self, failures: u32, err: &ApiError) -> Duration {
        if let ApiError::RateLimited {
            retry_after: Some(secs),
            ..
        } = err
        {
            return Duration::from_secs(*secs).min(self.max_retry_after);
        }
        self.backoff_base * 2u32.saturating_pow(failures)
    }
}

fn is_invalid_conversation(err: &ApiError) -> bool {
    matches!(
        err,
        ApiError::BadStatus { status: 501, body, .. } if body.contains("conversation_id")
    )
}
