//! 单行巡检条目

use serde::{Deserialize, Serialize};

use crate::models::audit_type::AuditType;
use crate::models::table::{cell_text, Row};
use crate::models::verdict::Verdict;

/// 一行的原始输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemInput {
    /// 纯文本（评论、品牌标题）
    Text(String),
    /// 图片链接（封面）
    ImageUrl(String),
    /// 标题 + 摘要（push）
    TitleSummary { title: String, summary: String },
    /// 新闻链接
    Article { url: String },
}

impl ItemInput {
    /// 按巡检类型从一行中取出输入字段
    pub fn from_row(audit_type: AuditType, row: &Row) -> Option<Self> {
        match audit_type {
            AuditType::Comment => cell_text(row, "评论内容").map(ItemInput::Text),
            AuditType::Brand => cell_text(row, "品牌标题").map(ItemInput::Text),
            AuditType::Cover => cell_text(row, "封面链接").map(ItemInput::ImageUrl),
            AuditType::Push => {
                let title = cell_text(row, "标题");
                let summary = cell_text(row, "摘要");
                if title.is_none() && summary.is_none() {
                    return None;
                }
                Some(ItemInput::TitleSummary {
                    title: title.unwrap_or_default(),
                    summary: summary.unwrap_or_default(),
                })
            }
            AuditType::News => cell_text(row, "新闻链接").map(|url| ItemInput::Article { url }),
        }
    }

    /// 日志预览用文本
    pub fn preview(&self) -> &str {
        match self {
            ItemInput::Text(text) | ItemInput::ImageUrl(text) => text,
            ItemInput::TitleSummary { title, .. } => title,
            ItemInput::Article { url } => url,
        }
    }
}

/// 单行处理结果
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    pub verdict: Verdict,
    pub tags: Vec<String>,
    /// 有状态类型返回的新 conversation_id；None 表示保持不变
    pub continuation_token: Option<String>,
    /// 服务端判定旧 conversation_id 失效，任务上保存的值应清空
    pub token_reset: bool,
    /// 新闻流程中被尺寸预过滤跳过的图片数
    pub skipped_images: usize,
}

impl ItemOutcome {
    pub fn new(verdict: Verdict, tags: Vec<String>) -> Self {
        Self {
            verdict,
            tags,
            continuation_token: None,
            token_reset: false,
            skipped_images: 0,
        }
    }

    pub fn failed(verdict: Verdict) -> Self {
        Self::new(verdict, Vec::new())
    }
}
