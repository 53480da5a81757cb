//! 违规类别关键词表
//!
//! 只在"低质/违规但没有解析到任何标签"时用于补全，不会覆盖已解析的标签

use phf::phf_ordered_map;

use crate::models::dedup_tags;

const POLITICS: &[&str] = &["涉政", "政治", "政策"];
const PROHIBITED: &[&str] = &["违禁", "非法"];
const PORN: &[&str] = &["色情", "涉黄", "性暗示"];
const VULGAR: &[&str] = &["低俗", "低级"];
const ADVERTISING: &[&str] = &["广告", "推广", "引流"];
const ABUSE: &[&str] = &["谩骂", "辱骂", "歧视"];
const SPAM: &[&str] = &["灌水", "无意义"];

static TAG_KEYWORDS: phf::OrderedMap<&'static str, &'static [&'static str]> = phf_ordered_map! {
    "涉政" => POLITICS,
    "违禁" => PROHIBITED,
    "色情" => PORN,
    "低俗" => VULGAR,
    "广告" => ADVERTISING,
    "谩骂" => ABUSE,
    "灌水" => SPAM,
};

/// 从文本中推断类别标签
pub fn infer_tags(content: &str) -> Vec<String> {
    let content = content.to_lowercase();
    dedup_tags(
        TAG_KEYWORDS
            .entries()
            .filter(|(_, keywords)| keywords.iter().any(|k| content.contains(k)))
            .map(|(tag, _)| tag.to_string()),
    )
}
