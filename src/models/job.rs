//! 巡检任务记录
//!
//! `AuditJob` 只由 `JobController` 修改；外部通过 `JobSnapshot` 读取

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt::Display;
use std::path::PathBuf;

use crate::models::audit_type::AuditType;
use crate::models::verdict::Verdict;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Idle,
    Processing,
    Paused,
    Done,
    Error,
    /// 处理中，但最近一行出现了异常
    Warning,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Idle => "idle",
            JobStatus::Processing => "processing",
            JobStatus::Paused => "paused",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Warning => "warning",
        }
    }

    /// done / error 在重置前不可变
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// 工作线程处于运行中（含暂停）
    pub fn is_active(self) -> bool {
        matches!(
            self,
            JobStatus::Processing | JobStatus::Warning | JobStatus::Paused
        )
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 统计数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// 各结论的数量，总和等于已处理行数
    pub verdict_counts: BTreeMap<Verdict, usize>,
    /// 各标签的数量
    pub tag_counts: BTreeMap<String, usize>,
}

impl Statistics {
    pub fn record(&mut self, verdict: Verdict, tags: &[String]) {
        *self.verdict_counts.entry(verdict).or_insert(0) += 1;
        for tag in tags {
            *self.tag_counts.entry(tag.clone()).or_insert(0) += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.verdict_counts.values().sum()
    }
}

/// 一条任务消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub time: String,
    pub message: String,
    pub status: JobStatus,
}

/// 巡检任务
#[derive(Debug, Clone)]
pub struct AuditJob {
    pub id: String,
    pub audit_type: AuditType,
    pub status: JobStatus,
    pub progress: u8,
    pub total_items: usize,
    pub processed_items: usize,
    pub paused: bool,
    pub last_message: String,
    pub messages: VecDeque<MessageEntry>,
    pub message_capacity: usize,
    pub statistics: Statistics,
    /// 有状态类型在相邻请求之间传递的 conversation_id
    pub continuation_token: Option<String>,
    /// 新闻流程中因尺寸过小被跳过的图片数
    pub skipped_images: usize,
    /// 已登记的数据集（位于数据目录中）
    pub dataset_path: Option<PathBuf>,
    /// 用户上传时的原始文件名
    pub source_filename: Option<String>,
}

impl AuditJob {
    pub fn new(audit_type: AuditType, message_capacity: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            audit_type,
            status: JobStatus::Idle,
            progress: 0,
            total_items: 0,
            processed_items: 0,
            paused: false,
            last_message: String::new(),
            messages: VecDeque::with_capacity(message_capacity),
            message_capacity: message_capacity.max(1),
            statistics: Statistics::default(),
            continuation_token: None,
            skipped_images: 0,
            dataset_path: None,
            source_filename: None,
        }
    }

    /// 记录一条消息，超过容量时丢弃最早的
    pub fn push_message(&mut self, message: impl Into<String>) {
        let message = message.into();
        if self.messages.len() >= self.message_capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(MessageEntry {
            time: Local::now().format("%H:%M:%S").to_string(),
            message: message.clone(),
            status: self.status,
        });
        self.last_message = message;
    }

    /// 写入一行结果：计数、进度、统计同步更新
    pub fn record_item(&mut self, verdict: Verdict, tags: &[String]) {
        self.processed_items += 1;
        self.statistics.record(verdict, tags);
        self.progress = progress_percent(self.processed_items, self.total_items);
    }

    pub fn snapshot(&self, recent: usize) -> JobSnapshot {
        let skip = self.messages.len().saturating_sub(recent);
        JobSnapshot {
            id: self.id.clone(),
            audit_type: self.audit_type,
            status: self.status,
            progress: self.progress,
            total: self.total_items,
            processed: self.processed_items,
            paused: self.paused,
            message: self.last_message.clone(),
            history: self.messages.iter().skip(skip).cloned().collect(),
            statistics: self.statistics.clone(),
            skipped_images: self.skipped_images,
        }
    }
}

/// round(processed / total * 100)
pub fn progress_percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (processed as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// 任务状态快照（只读）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    pub audit_type: AuditType,
    pub status: JobStatus,
    pub progress: u8,
    pub total: usize,
    pub processed: usize,
    pub paused: bool,
    pub message: String,
    pub history: Vec<MessageEntry>,
    pub statistics: Statistics,
    pub skipped_images: usize,
}
