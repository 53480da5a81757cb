//! 单行处理流程 - 流程层
//!
//! 核心职责：定义"一行"的完整处理流程
//!
//! 流程顺序：
//! 1. 按巡检类型构建请求（纯文本 / 文本 + 图片）
//! 2. 通过限流重试客户端发送
//! 3. 解析回复
//! 4. 类型相关的归一化
//!
//! 新闻类型交给 `NewsFlow` 走多阶段流程

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clients::{ChatClient, ChatRequest, ImageProbe};
use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::RateLimiter;
use crate::models::{dedup_tags, AuditType, ItemInput, ItemOutcome, Verdict};
use crate::services::response_parser::{parse_answer, ParsedAnswer};
use crate::services::sanitize::{clean_brand_tag, clean_brand_text, push_payload};
use crate::utils::truncate_text;
use crate::workflow::item_ctx::ItemCtx;
use crate::workflow::news_flow::NewsFlow;

const COMMENT_PROMPT: &str = "请审核以下评论内容是否低质，并给出审核结果和低质标签：\n\n";
const COVER_PROMPT: &str = "请审核以下封面图片是否违规，并给出审核结果和违规标签：";

/// 单行处理流程
///
/// - 一个任务一个实例，持有该任务的客户端（API 密钥随任务而定）
/// - 不修改任务记录；conversation_id 由调用方传入、通过返回值带出
pub struct ItemProcessor {
    audit_type: AuditType,
    client: ChatClient,
    news: Option<NewsFlow>,
}

impl ItemProcessor {
    pub fn new(
        config: &Config,
        audit_type: AuditType,
        api_key: &str,
        limiter: Arc<RateLimiter>,
    ) -> AppResult<Self> {
        let client = ChatClient::new(config, api_key, limiter)?;
        let news = match audit_type {
            AuditType::News => Some(NewsFlow::new(config, client.clone(), ImageProbe::new(config)?)),
            _ => None,
        };
        Ok(Self {
            audit_type,
            client,
            news,
        })
    }

    /// 处理一行
    ///
    /// # 参数
    /// - `ctx`: 行上下文
    /// - `input`: 行输入
    /// - `token`: 有状态类型上一行留下的 conversation_id
    ///
    /// # 返回
    /// 总是返回结果；失败以结论的形式体现
    pub async fn process(&self, ctx: &ItemCtx, input: &ItemInput, token: Option<String>) -> ItemOutcome {
        info!("{} 📝 {}", ctx, truncate_text(input.preview(), 50));

        let request = match (self.audit_type, input) {
            (AuditType::News, ItemInput::Article { url }) => {
                return match &self.news {
                    Some(flow) => flow.run(ctx, url).await,
                    None => ItemOutcome::failed(Verdict::ProcessingFailed),
                };
            }
            (AuditType::Comment, ItemInput::Text(text)) => {
                ChatRequest::text(format!("{}{}", COMMENT_PROMPT, text), self.audit_type.user_tag())
            }
            (AuditType::Cover, ItemInput::ImageUrl(url)) => {
                ChatRequest::text(COVER_PROMPT, self.audit_type.user_tag()).with_image(url.clone())
            }
            (AuditType::Push, ItemInput::TitleSummary { title, summary }) => {
                ChatRequest::text(push_payload(title, summary), self.audit_type.user_tag())
                    .with_conversation(token)
            }
            (AuditType::Brand, ItemInput::Text(text)) => {
                let cleaned = clean_brand_text(text);
                if cleaned.is_empty() {
                    warn!("{} 清洗后内容为空", ctx);
                    return ItemOutcome::failed(Verdict::NoContent);
                }
                ChatRequest::text(cleaned, self.audit_type.user_tag())
            }
            (audit_type, input) => {
                error!("{} 输入与巡检类型不匹配: {} / {:?}", ctx, audit_type, input);
                return ItemOutcome::failed(Verdict::ProcessingFailed);
            }
        };

        match self.client.send(request).await {
            Ok(reply) => {
                let parsed = normalize(self.audit_type, parse_answer(&reply.answer));
                info!("{} ✓ {} {:?}", ctx, parsed.verdict, parsed.tags);

                let mut outcome = ItemOutcome::new(parsed.verdict, parsed.tags);
                if self.audit_type.is_stateful() {
                    outcome.continuation_token = reply.conversation_id;
                    outcome.token_reset = reply.token_reset;
                }
                outcome
            }
            Err(failure) => {
                warn!("{} ❌ {}", ctx, failure);
                ItemOutcome::failed(failure.verdict())
            }
        }
    }
}

/// 类型相关的归一化
///
/// - 评论 / 封面：低质或违规却没有任何标签时，按正常处理
/// - 品牌：标签只保留中文与字母数字，最长 20 字
pub fn normalize(audit_type: AuditType, parsed: ParsedAnswer) -> ParsedAnswer {
    let ParsedAnswer { verdict, tags } = parsed;
    match audit_type {
        AuditType::Comment | AuditType::Cover if verdict.is_flagged() && tags.is_empty() => {
            ParsedAnswer {
                verdict: Verdict::Normal,
                tags: Vec::new(),
            }
        }
        AuditType::Brand => ParsedAnswer {
            verdict,
            tags: dedup_tags(
                tags.iter()
                    .map(|t| clean_brand_tag(t))
                    .filter(|t| !t.is_empty()),
            ),
        },
        _ => ParsedAnswer { verdict, tags },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(verdict: Verdict, tags: &[&str]) -> ParsedAnswer {
        ParsedAnswer {
            verdict,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_flagged_without_tags_becomes_normal_for_comment() {
        let out = normalize(AuditType::Comment, parsed(Verdict::LowQuality, &[]));
        assert_eq!(out.verdict, Verdict::Normal);

        // 失败类结论不会被改写
        let out = normalize(AuditType::Cover, parsed(Verdict::ParseFailed, &[]));
        assert_eq!(out.verdict, Verdict::ParseFailed);

        // 其它类型保持不变
        let out = normalize(AuditType::Push, parsed(Verdict::LowQuality, &[]));
        assert_eq!(out.verdict, Verdict::LowQuality);
    }

    #[test]
    fn test_brand_tags_cleaned() {
        let out = normalize(
            AuditType::Brand,
            parsed(Verdict::Violation, &["负面-舆情!", "负面舆情", "***"]),
        );
        assert_eq!(out.tags, vec!["负面舆情"]);
    }

    #[tokio::test]
    async fn test_mismatched_input_is_processing_failed() {
        let config = Config::default();
        let limiter = Arc::new(RateLimiter::new("comment", 1.0, 1.0));
        let processor = ItemProcessor::new(&config, AuditType::Comment, "key", limiter).unwrap();
        let ctx = ItemCtx::new("job", AuditType::Comment, 1, 1);
        let outcome = processor
            .process(&ctx, &ItemInput::ImageUrl("https://x/1.png".into()), None)
            .await;
        assert_eq!(outcome.verdict, Verdict::ProcessingFailed);
    }

    #[tokio::test]
    async fn test_push_threads_conversation_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "user": "PUSH_AUDIT_BOT",
                "conversation_id": "c1"
            })))
            .with_status(200)
            .with_body(r#"{"answer":"审核结果：低质 低质标签：标题党","conversation_id":"c2"}"#)
            .create_async()
            .await;

        let config = Config {
            api_url: server.url(),
            ..Config::default()
        };
        let limiter = Arc::new(RateLimiter::new("push", 10.0, 10.0));
        let processor = ItemProcessor::new(&config, AuditType::Push, "key", limiter).unwrap();
        let ctx = ItemCtx::new("job", AuditType::Push, 1, 1);
        let input = ItemInput::TitleSummary {
            title: "震惊".into(),
            summary: "点进来看".into(),
        };
        let outcome = processor.process(&ctx, &input, Some("c1".into())).await;

        mock.assert_async().await;
        assert_eq!(outcome.verdict, Verdict::LowQuality);
        assert_eq!(outcome.tags, vec!["标题党"]);
        assert_eq!(outcome.continuation_token.as_deref(), Some("c2"));
    }
}
