//! 模型回复解析 - 业务能力层
//!
//! 把自由文本的回复转成 (结论, 标签)。流程：
//! 1. 去掉 `<think>` 推理块
//! 2. 按顺序尝试各提取策略；结论和标签各自取第一个命中的策略
//! 3. 没有结论时做关键词兜底，仍然没有则为"解析失败"
//! 4. 标签归一化；正常必无标签；低质/违规且无标签时用类别表补全
//!
//! 解析是纯函数：同样的输入永远得到同样的输出，任何输入都不会 panic。

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::models::verdict::{dedup_tags, is_no_tag};
use crate::models::Verdict;
use crate::services::taxonomy;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// 标签串中出现这些标记时，其后的内容不再是标签
const TAG_TAIL_MARKERS: &[&str] = &["（3）", "(3)", "理由", "原因", "说明", "分析"];

/// 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAnswer {
    pub verdict: Verdict,
    pub tags: Vec<String>,
}

/// 一种提取策略：文本 → 可选的结论 / 可选的标签
pub trait ExtractStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn verdict(&self, text: &str) -> Option<Verdict>;
    fn tags(&self, text: &str) -> Option<Vec<String>>;
}

/// 基于"标签名：值"正则的策略
pub struct LabeledStrategy {
    name: &'static str,
    verdict_re: Regex,
    tag_re: Regex,
}

impl LabeledStrategy {
    /// 正则非法时返回 None，该策略被跳过
    pub fn new(name: &'static str, verdict_pattern: &str, tag_pattern: &str) -> Option<Self> {
        Some(Self {
            name,
            verdict_re: Regex::new(verdict_pattern).ok()?,
            tag_re: Regex::new(tag_pattern).ok()?,
        })
    }

    /// 带编号：（1）审核结果：X （2）低质标签：Y
    pub fn numbered() -> Option<Self> {
        Self::new(
            "带编号格式",
            r"(?i)[（(]\s*1\s*[）)]\s*(?:审核结果|audit\s*result|result)\s*[:：]\s*([^\s（(，,。；;]+)",
            r"(?i)[（(]\s*2\s*[）)]\s*(?:低质标签|违规标签|tags?)\s*[:：][ \t]*([^\n]*)",
        )
    }

    /// 不带编号：审核结果：X 低质标签：Y
    pub fn unnumbered() -> Option<Self> {
        Self::new(
            "不带编号格式",
            r"(?i)(?:审核结果|audit\s*result)\s*[:：]\s*([^\s（(，,。；;]+)",
            r"(?i)(?:低质标签|违规标签)\s*[:：][ \t]*([^\n]*)",
        )
    }

    /// 宽松格式：结论限定在几个常见词内，标签取到行尾
    pub fn loose() -> Option<Self> {
        Self::new(
            "宽松格式",
            r"(?i)(?:审核结果|结果|result)\s*[:：]?\s*(正常|低质|违规|不合规|normal|low[-\s]?quality|violation)",
            r"(?i)(?:低质标签|违规标签|标签|tags?)\s*[:：]?[ \t]*([^\n]+)",
        )
    }
}

impl ExtractStrategy for LabeledStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn verdict(&self, text: &str) -> Option<Verdict> {
        let caps = self.verdict_re.captures(text)?;
        Verdict::from_label(caps.get(1)?.as_str())
    }

    fn tags(&self, text: &str) -> Option<Vec<String>> {
        let caps = self.tag_re.captures(text)?;
        Some(normalize_tags(caps.get(1)?.as_str()))
    }
}

/// 级联解析器
pub struct ResponseParser {
    strategies: Vec<Box<dyn ExtractStrategy>>,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseParser {
    /// 默认三种策略，按优先级排列
    pub fn new() -> Self {
        let strategies = [
            LabeledStrategy::numbered(),
            LabeledStrategy::unnumbered(),
            LabeledStrategy::loose(),
        ]
        .into_iter()
        .flatten()
        .map(|s| Box::new(s) as Box<dyn ExtractStrategy>)
        .collect();
        Self { strategies }
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ExtractStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn parse(&self, raw: &str) -> ParsedAnswer {
        let text = strip_reasoning(raw);
        let text = text.trim();

        let mut verdict = None;
        let mut tags = None;
        for strategy in &self.strategies {
            if verdict.is_none() {
                verdict = strategy.verdict(text);
                if verdict.is_some() {
                    debug!("使用{}解析结果: {:?}", strategy.name(), verdict);
                }
            }
            if tags.is_none() {
                tags = strategy.tags(text);
                if tags.is_some() {
                    debug!("使用{}解析标签: {:?}", strategy.name(), tags);
                }
            }
            if verdict.is_some() && tags.is_some() {
                break;
            }
        }

        let verdict = verdict.unwrap_or_else(|| sniff_keywords(text));
        let mut tags = tags.unwrap_or_default();

        if verdict.is_flagged() && tags.is_empty() {
            tags = taxonomy::infer_tags(text);
        } else if !verdict.is_flagged() {
            tags.clear();
        }

        debug!("最终解析结果: 结果={}, 标签={:?}", verdict, tags);
        ParsedAnswer { verdict, tags }
    }
}

/// 用默认解析器解析
pub fn parse_answer(raw: &str) -> ParsedAnswer {
    static PARSER: LazyLock<ResponseParser> = LazyLock::new(ResponseParser::new);
    PARSER.parse(raw)
}

/// 去掉所有 `<think>…</think>` 块（非贪婪，可跨行）
///
/// 只有结束标签时，丢弃它之前的全部内容
pub fn strip_reasoning(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    if !rest.contains(THINK_OPEN) {
        if let Some(end) = rest.find(THINK_CLOSE) {
            rest = &rest[end + THINK_CLOSE.len()..];
        }
    }

    while let Some(start) = rest.find(THINK_OPEN) {
        let after_open = &rest[start + THINK_OPEN.len()..];
        match after_open.find(THINK_CLOSE) {
            Some(end) => {
                out.push_str(&rest[..start]);
                rest = &after_open[end + THINK_CLOSE.len()..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

/// 关键词兜底
fn sniff_keywords(text: &str) -> Verdict {
    let flagged = ["违规", "低质", "不合规"].iter().any(|k| text.contains(k));
    if text.contains("正常") && !flagged {
        Verdict::Normal
    } else if flagged {
        Verdict::LowQuality
    } else {
        Verdict::ParseFailed
    }
}

/// 标签归一化
///
/// 统一分隔符（，、；; , /）→ 切分 → 去掉"无标签"写法 → 去重
pub fn normalize_tags(raw: &str) -> Vec<String> {
    let mut raw = raw.trim();
    for marker in TAG_TAIL_MARKERS {
        if let Some(pos) = raw.find(marker) {
            raw = &raw[..pos];
        }
    }

    let unified: String = raw
        .chars()
        .map(|c| match c {
            '，' | '、' | '；' | ';' | '/' | '|' => ',',
            other => other,
        })
        .collect();

    dedup_tags(
        unified
            .split(',')
            .map(|t| {
                t.trim()
                    .trim_matches(|c: char| "。.*\"“”'【】[]：:".contains(c))
                    .trim()
            })
            .filter(|t| !is_no_tag(t))
            .map(str::to_string),
    )
}
