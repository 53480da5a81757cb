//! 数据集读写服务 - 业务能力层
//!
//! 数据集和结果都是 JSON 对象数组。结果文件每次整体覆盖写（先写临时文件再改名），
//! 中途被打断时磁盘上总是一份完整的旧结果或新结果。

use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, AppResult, FileError, SetupError};
use crate::models::table::result_columns;
use crate::models::{format_tags, AuditTable, AuditType, Row, Verdict};

/// 结果表中的时间格式
pub const RESULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 数据集读写服务
#[derive(Debug, Clone)]
pub struct TableStore {
    data_folder: PathBuf,
    result_folder: PathBuf,
}

impl TableStore {
    pub fn new(config: &Config) -> Self {
        Self {
            data_folder: PathBuf::from(&config.data_folder),
            result_folder: PathBuf::from(&config.result_folder),
        }
    }

    /// 登记数据集：校验可解析后复制到数据目录，命名为 `{type}_{jobId}.json`
    pub async fn register(
        &self,
        audit_type: AuditType,
        job_id: &str,
        source: &Path,
    ) -> AppResult<PathBuf> {
        // 先解析一遍，坏文件在上传阶段就拒绝
        let table = Self::load(source).await?;

        fs::create_dir_all(&self.data_folder)
            .await
            .map_err(|e| AppError::file_write_failed(self.data_folder.display().to_string(), e))?;
        let target = self
            .data_folder
            .join(format!("{}_{}.json", audit_type.as_str(), job_id));
        fs::copy(source, &target)
            .await
            .map_err(|e| AppError::file_write_failed(target.display().to_string(), e))?;

        info!(
            "✓ 数据集已登记: {} → {} ({} 行)",
            source.display(),
            target.display(),
            table.len()
        );
        Ok(target)
    }

    /// 读取数据集
    pub async fn load(path: &Path) -> AppResult<AuditTable> {
        let display = path.display().to_string();
        let content = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FileError::NotFound { path: display }.into());
            }
            Err(e) => return Err(AppError::file_read_failed(display, e)),
        };

        let value: JsonValue =
            serde_json::from_str(&content).map_err(|e| SetupError::UnreadableDataset {
                path: display.clone(),
                reason: e.to_string(),
            })?;
        let rows = match value {
            JsonValue::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    JsonValue::Object(row) => Ok(row),
                    _ => Err(SetupError::UnreadableDataset {
                        path: display.clone(),
                        reason: format!("第 {} 行不是对象", i + 1),
                    }),
                })
                .collect::<Result<Vec<Row>, _>>()?,
            _ => {
                return Err(SetupError::UnreadableDataset {
                    path: display,
                    reason: "顶层必须是数组".to_string(),
                }
                .into())
            }
        };

        debug!("读取数据集 {}: {} 行", path.display(), rows.len());
        Ok(AuditTable::from_rows(rows))
    }

    /// 结果文件路径：`{result_folder}/{type}_{jobId}_result.json`
    pub fn result_path(&self, audit_type: AuditType, job_id: &str) -> PathBuf {
        self.result_folder
            .join(format!("{}_{}_result.json", audit_type.as_str(), job_id))
    }

    /// 整表落盘
    pub async fn save(&self, path: &Path, table: &AuditTable) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::file_write_failed(parent.display().to_string(), e))?;
        }
        let display = path.display().to_string();
        let body = serde_json::to_vec_pretty(&table.rows)
            .map_err(|e| AppError::json_failed(display.clone(), e))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .await
            .map_err(|e| AppError::file_write_failed(tmp.display().to_string(), e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| AppError::file_write_failed(display, e))?;
        Ok(())
    }
}

/// 把一行的结论写进结果列；空标签写成 "/"
pub fn write_row_result(
    row: &mut Row,
    audit_type: AuditType,
    verdict: Verdict,
    tags: &[String],
    timestamp: &str,
) {
    let [verdict_col, tag_col, time_col] = result_columns(audit_type);
    row.insert(verdict_col.to_string(), JsonValue::String(verdict.label().to_string()));
    row.insert(tag_col.to_string(), JsonValue::String(format_tags(tags)));
    row.insert(time_col.to_string(), JsonValue::String(timestamp.to_string()));
}

/// 当前本地时间，结果表格式
pub fn now_timestamp() -> String {
    chrono::Local::now().format(RESULT_TIME_FORMAT).to_string()
}
