use serde::{Deserialize, Serialize};

use crate::models::audit_type::AuditType;
use crate::models::job::{JobStatus, Statistics};

/// 任务完成记录（写一次，不再修改）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub job_id: String,
    pub audit_type: AuditType,
    pub timestamp: String,
    pub source_filename: String,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub final_status: JobStatus,
    pub statistics: Statistics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
}
