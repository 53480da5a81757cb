//! 审核结论与标签

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// "无标签"哨兵值，写入结果表时用它表示空标签集
pub const NO_TAG_SENTINEL: &str = "/";

/// 模型可能用来表达"没有标签"的写法
pub const NO_TAG_WORDS: &[&str] = &["/", "无", "无标签", "暂无", "没有", "none", "null", "n/a"];

/// 审核结论（封闭枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "正常")]
    Normal,
    #[serde(rename = "低质")]
    LowQuality,
    #[serde(rename = "违规")]
    Violation,
    #[serde(rename = "处理失败")]
    ProcessingFailed,
    #[serde(rename = "解析失败")]
    ParseFailed,
    #[serde(rename = "请求超时")]
    RequestTimeout,
    #[serde(rename = "服务异常")]
    ServiceError,
    #[serde(rename = "无内容")]
    NoContent,
}

impl Verdict {
    pub fn label(self) -> &'static str {
        match self {
            Verdict::Normal => "正常",
            Verdict::LowQuality => "低质",
            Verdict::Violation => "违规",
            Verdict::ProcessingFailed => "处理失败",
            Verdict::ParseFailed => "解析失败",
            Verdict::RequestTimeout => "请求超时",
            Verdict::ServiceError => "服务异常",
            Verdict::NoContent => "无内容",
        }
    }

    /// 把模型给出的结论词映射到封闭枚举
    ///
    /// 只接受以已知结论词开头的写法，其余返回 None
    pub fn from_label(raw: &str) -> Option<Self> {
        let word = raw
            .trim()
            .trim_matches(|c: char| c.is_ascii_punctuation() || "，。；：、“”【】".contains(c))
            .to_lowercase();
        if word.is_empty() {
            return None;
        }
        if word.starts_with("正常") || word.starts_with("normal") || word.starts_with("合规") {
            Some(Verdict::Normal)
        } else if word.starts_with("低质") || word.starts_with("low") {
            Some(Verdict::LowQuality)
        } else if word.starts_with("违规")
            || word.starts_with("不合规")
            || word.starts_with("violation")
        {
            Some(Verdict::Violation)
        } else {
            None
        }
    }

    /// 低质或违规
    pub fn is_flagged(self) -> bool {
        matches!(self, Verdict::LowQuality | Verdict::Violation)
    }

    /// 各种失败类结论
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Verdict::ProcessingFailed
                | Verdict::ParseFailed
                | Verdict::RequestTimeout
                | Verdict::ServiceError
        )
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// 是否属于"无标签"写法
pub fn is_no_tag(token: &str) -> bool {
    let t = token.trim().to_lowercase();
    t.is_empty() || NO_TAG_WORDS.contains(&t.as_str())
}

/// 标签去重（保持首次出现的顺序）
pub fn dedup_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.into();
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// 标签集写入结果表时的文本形式
pub fn format_tags(tags: &[String]) -> String {
    if tags.is_empty() {
        NO_TAG_SENTINEL.to_string()
    } else {
        tags.join(", ")
    }
}
