//! 文本清洗
//!
//! 请求载荷发送前的字符过滤与长度截断，以及新闻正文的裁剪和图片链接提取

use regex::Regex;
use std::sync::LazyLock;

use crate::models::dedup_tags;

pub const PUSH_FIELD_MAX_CHARS: usize = 1500;
pub const PUSH_TEXT_MAX_CHARS: usize = 3000;
pub const BRAND_TEXT_MAX_CHARS: usize = 2000;
pub const BRAND_TAG_MAX_CHARS: usize = 20;

static PUSH_FORBIDDEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"[\x00-\x1F\\"{}]"#).ok());
static BRAND_FORBIDDEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"[\x00-\x1F\\"{}<>|]"#).ok());
static URL: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"https?://\S+").ok());

static IMG_TAG: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"<img\s+[^>]*src="([^"]+)"[^>]*>"#).ok());
static MARKDOWN_IMAGE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\((https?://[^)\s]+)\)").ok());
static BARE_IMAGE_URL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>()]+?\.(?:jpg|jpeg|png|gif|webp|bmp)(?:\?[^\s"'<>()]*)?"#).ok()
});

fn remove(re: &LazyLock<Option<Regex>>, text: &str) -> String {
    match re.as_ref() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// 按字符数截断（不加省略号）
pub fn cap_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// 清洗 push 的单个字段
pub fn clean_push_field(field: &str) -> String {
    cap_chars(remove(&PUSH_FORBIDDEN, field).trim(), PUSH_FIELD_MAX_CHARS)
}

/// push 载荷："标题：…\n摘要：…"
pub fn push_payload(title: &str, summary: &str) -> String {
    let text = format!(
        "标题：{}\n摘要：{}",
        clean_push_field(title),
        clean_push_field(summary)
    );
    cap_chars(&text, PUSH_TEXT_MAX_CHARS)
}

/// 清洗品牌文本：去链接、去特殊字符
pub fn clean_brand_text(text: &str) -> String {
    let without_urls = remove(&URL, text);
    cap_chars(remove(&BRAND_FORBIDDEN, &without_urls).trim(), BRAND_TEXT_MAX_CHARS)
}

/// 品牌标签只保留中文与字母数字
pub fn clean_brand_tag(tag: &str) -> String {
    tag.chars()
        .filter(|c| c.is_ascii_alphanumeric() || ('\u{4e00}'..='\u{9fff}').contains(c))
        .take(BRAND_TAG_MAX_CHARS)
        .collect()
}

/// 在第一个模板标记处截断正文
pub fn trim_article_text<S: AsRef<str>>(text: &str, markers: &[S], max_chars: usize) -> String {
    let cut = markers
        .iter()
        .filter_map(|m| {
            let m = m.as_ref();
            if m.is_empty() {
                None
            } else {
                text.find(m)
            }
        })
        .min()
        .unwrap_or(text.len());
    cap_chars(text[..cut].trim(), max_chars)
}

/// 提取图片链接：`<img src>`、markdown 图片、裸图片链接
pub fn extract_image_urls(text: &str) -> Vec<String> {
    let mut urls = Vec::new();
    for re in [&IMG_TAG, &MARKDOWN_IMAGE] {
        if let Some(re) = re.as_ref() {
            urls.extend(
                re.captures_iter(text)
                    .filter_map(|c| c.get(1).map(|m| m.as_str().to_string())),
            );
        }
    }
    if let Some(re) = BARE_IMAGE_URL.as_ref() {
        urls.extend(re.find_iter(text).map(|m| m.as_str().to_string()));
    }
    dedup_tags(urls)
}

/// 去掉图片标记后剩下的正文
pub fn strip_image_markup(text: &str) -> String {
    let text = remove(&IMG_TAG, text);
    let text = remove(&MARKDOWN_IMAGE, &text);
    remove(&BARE_IMAGE_URL, &text).trim().to_string()
}
