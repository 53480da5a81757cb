//! 巡检类型
//!
//! 每种巡检类型决定：需要哪些列、请求载荷的形态、是否跨行保持会话

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// 巡检类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditType {
    /// 评论审核
    Comment,
    /// 封面审核
    Cover,
    /// 智慧 push 审核
    Push,
    /// 品牌守护审核
    Brand,
    /// 新闻审核（多阶段）
    News,
}

impl AuditType {
    pub const ALL: [AuditType; 5] = [
        AuditType::Comment,
        AuditType::Cover,
        AuditType::Push,
        AuditType::Brand,
        AuditType::News,
    ];

    /// 英文标识，用于文件名和配置键
    pub fn as_str(self) -> &'static str {
        match self {
            AuditType::Comment => "comment",
            AuditType::Cover => "cover",
            AuditType::Push => "push",
            AuditType::Brand => "brand",
            AuditType::News => "news",
        }
    }

    /// 中文名称，用于日志和消息
    pub fn label(self) -> &'static str {
        match self {
            AuditType::Comment => "评论",
            AuditType::Cover => "封面",
            AuditType::Push => "智慧Push",
            AuditType::Brand => "品牌守护",
            AuditType::News => "新闻",
        }
    }

    /// 数据集中必须存在的列
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            AuditType::Comment => &["评论内容"],
            AuditType::Cover => &["封面链接"],
            AuditType::Push => &["标题", "摘要"],
            AuditType::Brand => &["品牌标题"],
            AuditType::News => &["新闻链接"],
        }
    }

    /// 结果表中的标签列名
    pub fn tag_column(self) -> &'static str {
        match self {
            AuditType::Push => "低质标签",
            _ => "违规标签",
        }
    }

    /// 请求中的 user 字段
    pub fn user_tag(self) -> &'static str {
        match self {
            AuditType::Comment | AuditType::Cover => "audit_system",
            AuditType::Push => "PUSH_AUDIT_BOT",
            AuditType::Brand => "Brand_AUDIT_BOT_003",
            AuditType::News => "NEWS_AUDIT_BOT",
        }
    }

    /// 是否在同一任务的相邻请求之间传递 conversation_id
    pub fn is_stateful(self) -> bool {
        matches!(self, AuditType::Push)
    }
}

impl Display for AuditType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AuditType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "comment" => Ok(AuditType::Comment),
            "cover" => Ok(AuditType::Cover),
            "push" => Ok(AuditType::Push),
            "brand" => Ok(AuditType::Brand),
            "news" => Ok(AuditType::News),
            other => Err(format!("无效的审核类型: {}", other)),
        }
    }
}
