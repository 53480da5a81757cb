//! 单行处理上下文
//!
//! 封装"我正在处理哪个任务的第几行"这一信息

use std::fmt::Display;

use crate::models::AuditType;

/// 单行处理上下文
#[derive(Debug, Clone)]
pub struct ItemCtx {
    /// 任务ID
    pub job_id: String,

    pub audit_type: AuditType,

    /// 行号（从1开始，仅用于日志显示）
    pub row: usize,

    /// 总行数
    pub total: usize,
}

impl ItemCtx {
    pub fn new(job_id: impl Into<String>, audit_type: AuditType, row: usize, total: usize) -> Self {
        Self {
            job_id: job_id.into(),
            audit_type,
            row,
            total,
        }
    }
}

impl Display for ItemCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short_id: String = self.job_id.chars().take(8).collect();
        write!(
            f,
            "[{}巡检 任务#{} 第{}/{}行]",
            self.audit_type.label(),
            short_id,
            self.row,
            self.total
        )
    }
}
