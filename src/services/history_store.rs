//! 任务历史记录服务 - 业务能力层
//!
//! 每个任务结束时追加一条记录，之后不再修改

use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::models::HistoryRecord;

/// 历史记录存储（单个 JSON 数组文件）
pub struct HistoryStore {
    path: PathBuf,
    /// 串行化"读-追加-写"
    write_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条记录
    pub async fn append(&self, record: &HistoryRecord) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut records = match self.read_raw().await? {
            Some(content) => match serde_json::from_str::<Vec<HistoryRecord>>(&content) {
                Ok(records) => records,
                Err(e) => {
                    let backup = self.set_aside().await?;
                    warn!("⚠️ 历史记录文件损坏，已移至 {}: {}", backup.display(), e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        records.push(record.clone());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::file_write_failed(parent.display().to_string(), e))?;
        }
        let display = self.path.display().to_string();
        let body = serde_json::to_vec_pretty(&records)
            .map_err(|e| AppError::json_failed(display.clone(), e))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .await
            .map_err(|e| AppError::file_write_failed(tmp.display().to_string(), e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| AppError::file_write_failed(display, e))?;

        debug!("📝 历史记录已写入: {} ({})", record.job_id, record.audit_type);
        Ok(())
    }

    /// 列出全部记录（最新的在前）
    pub async fn list(&self) -> AppResult<Vec<HistoryRecord>> {
        let mut records = self.read_all().await?;
        records.reverse();
        Ok(records)
    }

    async fn read_all(&self) -> AppResult<Vec<HistoryRecord>> {
        let Some(content) = self.read_raw().await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&content) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!("⚠️ 历史记录文件损坏，按空记录处理: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// 文件不存在或为空时返回 None
    async fn read_raw(&self) -> AppResult<Option<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::file_read_failed(self.path.display().to_string(), e)),
        }
    }

    /// 把损坏的文件改名保留，旧记录不被覆盖
    async fn set_aside(&self) -> AppResult<PathBuf> {
        let stamp = Local::now().format("%Y%m%d%H%M%S%3f");
        let backup = self.path.with_extension(format!("json.{}.bak", stamp));
        fs::rename(&self.path, &backup)
            .await
            .map_err(|e| AppError::file_write_failed(backup.display().to_string(), e))?;
        Ok(backup)
    }
}
