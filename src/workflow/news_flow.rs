//! 新闻多阶段流程 - 流程层
//!
//! 流程顺序：
//! 1. 提取：把新闻链接交给模型，拿回正文和图片链接
//! 2. 预过滤：逐张探测图片尺寸，过小的跳过并计数
//! 3. 审核：每张保留的图片、裁剪后的正文分别审核
//! 4. 汇总：任一违规 → 违规；否则任一失败 → 处理失败；全部缺失 → 无内容；否则正常

use tracing::{info, warn};

use crate::clients::{ChatClient, ChatRequest, ImageProbe, ProbeOutcome};
use crate::config::Config;
use crate::models::{dedup_tags, AuditType, ItemOutcome, Verdict};
use crate::services::response_parser::parse_answer;
use crate::services::sanitize::{extract_image_urls, strip_image_markup, trim_article_text};
use crate::utils::truncate_text;
use crate::workflow::item_ctx::ItemCtx;

/// 图片尺寸过小（只做记录，不计入标签）
pub const TAG_IMAGE_TOO_SMALL: &str = "图片过小";
/// 正文提取失败（只做记录，不计入标签）
pub const TAG_TEXT_EXTRACT_FAILED: &str = "正文提取失败";

const BOOKKEEPING_TAGS: &[&str] = &[TAG_IMAGE_TOO_SMALL, TAG_TEXT_EXTRACT_FAILED];

const EXTRACT_PROMPT: &str =
    "请提取以下新闻链接的正文内容和全部图片链接，图片用 <img src=\"图片链接\"> 的形式标出：\n\n";
const IMAGE_PROMPT: &str = "请审核以下新闻图片是否违规，并给出审核结果和违规标签：";
const TEXT_PROMPT: &str = "请审核以下新闻正文是否违规，并给出审核结果和违规标签：\n\n";

/// 单个子审核的结果
#[derive(Debug, Clone, PartialEq)]
pub struct SubResult {
    pub verdict: Verdict,
    pub tags: Vec<String>,
}

impl SubResult {
    fn new(verdict: Verdict, tags: Vec<String>) -> Self {
        Self { verdict, tags }
    }

    /// 缺失的内容
    fn absent(note: &str) -> Self {
        Self::new(Verdict::NoContent, vec![note.to_string()])
    }
}

/// 提取阶段的产物
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub image_urls: Vec<String>,
    /// None 表示正文过短，视为提取失败
    pub text: Option<String>,
}

/// 新闻多阶段流程
#[derive(Clone)]
pub struct NewsFlow {
    client: ChatClient,
    probe: ImageProbe,
    boilerplate_markers: Vec<String>,
    min_text_chars: usize,
    max_text_chars: usize,
}

impl NewsFlow {
    pub fn new(config: &Config, client: ChatClient, probe: ImageProbe) -> Self {
        Self {
            client,
            probe,
            boilerplate_markers: config.boilerplate_markers.clone(),
            min_text_chars: config.news_min_text_chars,
            max_text_chars: config.news_max_text_chars,
        }
    }

    pub async fn run(&self, ctx: &ItemCtx, url: &str) -> ItemOutcome {
        let user = AuditType::News.user_tag();

        // ========== 阶段 1: 提取 ==========
        let request = ChatRequest::text(format!("{}{}", EXTRACT_PROMPT, url), user);
        let extraction = match self.client.send(request).await {
            Ok(reply) => self.split_extraction(&reply.answer),
            Err(failure) => {
                warn!("{} ⚠️ 新闻内容提取失败: {}", ctx, failure);
                let (verdict, tags) = aggregate(&[SubResult::new(failure.verdict(), Vec::new())]);
                return ItemOutcome::new(verdict, tags);
            }
        };
        info!(
            "{} ✓ 提取完成: 图片 {} 张, 正文 {} 字",
            ctx,
            extraction.image_urls.len(),
            extraction.text.as_ref().map_or(0, |t| t.chars().count())
        );

        let mut subs = Vec::new();
        let mut skipped = 0;

        // ========== 阶段 2+3: 图片预过滤与审核 ==========
        for image_url in &extraction.image_urls {
            match self.probe.probe(image_url).await {
                ProbeOutcome::TooSmall { width, height } => {
                    info!("{} 跳过小图 {}x{}: {}", ctx, width, height, truncate_text(image_url, 80));
                    skipped += 1;
                    continue;
                }
                ProbeOutcome::Unknown(reason) => {
                    warn!("{} 图片尺寸未知，照常审核 ({})", ctx, reason);
                }
                ProbeOutcome::Accepted { .. } => {}
            }
            let request = ChatRequest::text(IMAGE_PROMPT, user).with_image(image_url.clone());
            subs.push(self.audit(ctx, request).await);
        }

        // ========== 阶段 3: 正文审核 ==========
        match &extraction.text {
            Some(text) => {
                let request = ChatRequest::text(format!("{}{}", TEXT_PROMPT, text), user);
                subs.push(self.audit(ctx, request).await);
            }
            None => subs.push(SubResult::absent(TAG_TEXT_EXTRACT_FAILED)),
        }

        // ========== 阶段 4: 汇总 ==========
        let (verdict, tags) = aggregate(&subs);
        info!(
            "{} 汇总: {} 个子结果 → {} {:?} (跳过小图 {})",
            ctx,
            subs.len(),
            verdict,
            tags,
            skipped
        );
        let mut outcome = ItemOutcome::new(verdict, tags);
        outcome.skipped_images = skipped;
        outcome
    }

    async fn audit(&self, ctx: &ItemCtx, request: ChatRequest) -> SubResult {
        match self.client.send(request).await {
            Ok(reply) => {
                let parsed = parse_answer(&reply.answer);
                SubResult::new(parsed.verdict, parsed.tags)
            }
            Err(failure) => {
                warn!("{} ⚠️ 子审核失败: {}", ctx, failure);
                SubResult::new(failure.verdict(), Vec::new())
            }
        }
    }

    /// 从提取回复中拆出图片链接和正文
    pub fn split_extraction(&self, answer: &str) -> Extraction {
        let image_urls = extract_image_urls(answer);
        let body = strip_image_markup(answer);
        let text = trim_article_text(&body, &self.boilerplate_markers, self.max_text_chars);
        let text = if text.chars().count() < self.min_text_chars {
            None
        } else {
            Some(text)
        };
        Extraction { image_urls, text }
    }
}

/// 汇总子结果
///
/// 标签为所有子结果标签的并集（去掉记录用标签），只有违规时保留
pub fn aggregate(subs: &[SubResult]) -> (Verdict, Vec<String>) {
    let verdict = if subs.iter().any(|s| s.verdict.is_flagged()) {
        Verdict::Violation
    } else if subs.iter().any(|s| s.verdict.is_failure()) {
        Verdict::ProcessingFailed
    } else if subs.iter().all(|s| s.verdict == Verdict::NoContent) {
        Verdict::NoContent
    } else {
        Verdict::Normal
    };

    if verdict != Verdict::Violation {
        return (verdict, Vec::new());
    }
    let tags = dedup_tags(
        subs.iter()
            .flat_map(|s| s.tags.iter())
            .filter(|t| !BOOKKEEPING_TAGS.contains(&t.as_str()))
            .cloned(),
    );
    (verdict, tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::RateLimiter;
    use mockito::Matcher;
    use serde_json::json;
    use std::io::Cursor;
    use std::sync::Arc;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn sub(verdict: Verdict, tags: &[&str]) -> SubResult {
        SubResult::new(verdict, tags.iter().map(|t| t.to_string()).collect())
    }

    #[test]
    fn test_any_violation_wins() {
        let (verdict, tags) = aggregate(&[
            sub(Verdict::Normal, &[]),
            sub(Verdict::ProcessingFailed, &[]),
            sub(Verdict::Violation, &["色情"]),
            sub(Verdict::LowQuality, &["低俗", "色情"]),
        ]);
        assert_eq!(verdict, Verdict::Violation);
        assert_eq!(tags, vec!["色情", "低俗"]);
    }

    #[test]
    fn test_failure_before_normal() {
        let (verdict, _) = aggregate(&[sub(Verdict::Normal, &[]), sub(Verdict::RequestTimeout, &[])]);
        assert_eq!(verdict, Verdict::ProcessingFailed);
    }

    #[test]
    fn test_all_absent_is_no_content() {
        let (verdict, tags) = aggregate(&[SubResult::absent(TAG_TEXT_EXTRACT_FAILED)]);
        assert_eq!(verdict, Verdict::NoContent);
        assert!(tags.is_empty());
        assert_eq!(aggregate(&[]).0, Verdict::NoContent);
    }

    #[test]
    fn test_bookkeeping_tags_are_dropped() {
        let (verdict, tags) = aggregate(&[
            SubResult::absent(TAG_TEXT_EXTRACT_FAILED),
            sub(Verdict::Violation, &["涉政", TAG_IMAGE_TOO_SMALL]),
        ]);
        assert_eq!(verdict, Verdict::Violation);
        assert_eq!(tags, vec!["涉政"]);
    }

    #[test]
    fn test_normal_with_absent_text() {
        let (verdict, _) = aggregate(&[
            sub(Verdict::Normal, &[]),
            SubResult::absent(TAG_TEXT_EXTRACT_FAILED),
        ]);
        assert_eq!(verdict, Verdict::Normal);
    }

    #[test]
    fn test_split_extraction() {
        let config = Config::default();
        let limiter = Arc::new(RateLimiter::new("news", 1.0, 1.0));
        let client = ChatClient::new(&config, "key", limiter).unwrap();
        let flow = NewsFlow::new(&config, client, ImageProbe::new(&config).unwrap());

        let answer = "<img src=\"https://n.com/a.jpg\">这是一段足够长的新闻正文，讲述了某地发生的事情经过。责任编辑：李四";
        let extraction = flow.split_extraction(answer);
        assert_eq!(extraction.image_urls, vec!["https://n.com/a.jpg"]);
        assert_eq!(
            extraction.text.as_deref(),
            Some("这是一段足够长的新闻正文，讲述了某地发生的事情经过。")
        );

        let short = flow.split_extraction("正文太短 免责声明：……");
        assert!(short.text.is_none());
    }

    #[tokio::test]
    async fn test_run_skips_small_images_and_aggregates() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let tiny_url = format!("{}/tiny.png", base);
        let big_url = format!("{}/big.png", base);

        let _tiny = server
            .mock("GET", "/tiny.png")
            .with_status(200)
            .with_body(png_bytes(16, 16))
            .create_async()
            .await;
        let _big = server
            .mock("GET", "/big.png")
            .with_status(200)
            .with_body(png_bytes(400, 300))
            .create_async()
            .await;

        let article = format!(
            "<img src=\"{}\">某市今日举行大型公益活动，数千名市民参与其中，现场秩序井然。![配图]({})",
            tiny_url, big_url
        );
        let extract = server
            .mock("POST", "/")
            .match_body(Matcher::Regex("提取以下新闻链接".to_string()))
            .with_status(200)
            .with_body(json!({ "answer": article }).to_string())
            .expect(1)
            .create_async()
            .await;
        let image_audit = server
            .mock("POST", "/")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("新闻图片".to_string()),
                Matcher::PartialJson(json!({
                    "user": "NEWS_AUDIT_BOT",
                    "upload_mediums": [{ "url": big_url, "type": "image" }]
                })),
            ]))
            .with_status(200)
            .with_body(json!({ "answer": "（1）审核结果：违规\n（2）违规标签：血腥、图片过小" }).to_string())
            .expect(1)
            .create_async()
            .await;
        let text_audit = server
            .mock("POST", "/")
            .match_body(Matcher::Regex("新闻正文".to_string()))
            .with_status(200)
            .with_body(json!({ "answer": "（1）审核结果：正常" }).to_string())
            .expect(1)
            .create_async()
            .await;

        let config = Config {
            api_url: base.clone(),
            ..Config::default()
        };
        let limiter = Arc::new(RateLimiter::new("news", 100.0, 100.0));
        let client = ChatClient::new(&config, "key", limiter).unwrap();
        let flow = NewsFlow::new(&config, client, ImageProbe::new(&config).unwrap());
        let ctx = ItemCtx::new("job", AuditType::News, 1, 1);

        let outcome = flow.run(&ctx, "https://news.example.com/1").await;

        extract.assert_async().await;
        image_audit.assert_async().await;
        text_audit.assert_async().await;
        assert_eq!(outcome.skipped_images, 1);
        assert_eq!(outcome.verdict, Verdict::Violation);
        assert_eq!(outcome.tags, vec!["血腥"]);
    }

    #[tokio::test]
    async fn test_run_extraction_failure() {
        let mut server = mockito::Server::new_async().await;
        let _down = server
            .mock("POST", "/")
            .with_status(500)
            .create_async()
            .await;

        let config = Config {
            api_url: server.url(),
            max_retries: 1,
            backoff_base_ms: 1,
            ..Config::default()
        };
        let limiter = Arc::new(RateLimiter::new("news", 100.0, 100.0));
        let client = ChatClient::new(&config, "key", limiter).unwrap();
        let flow = NewsFlow::new(&config, client, ImageProbe::new(&config).unwrap());
        let ctx = ItemCtx::new("job", AuditType::News, 1, 1);

        let outcome = flow.run(&ctx, "https://news.example.com/2").await;
        assert_eq!(outcome.verdict, Verdict::ProcessingFailed);
        assert!(outcome.tags.is_empty());
        assert_eq!(outcome.skipped_images, 0);
    }
}
