//! 任务控制器 - 编排层
//!
//! ## 职责
//!
//! 对外提供任务的控制面：登记数据集、启动、暂停、恢复、结束、重置、查询。
//! 每个 (巡检类型, 会话) 一个状态机：
//!
//! ```text
//! idle ──start──▶ processing ◀──resume── paused
//!                  │   ▲  └─────pause─────▶ │
//!            失败行 │   │ 成功行              │
//!                  ▼   │                    │
//!                 warning ──finish / 全部完成──▶ done
//! 任意 ──准备错误──▶ error
//! 任意 ──end──▶ idle（硬重置：新任务ID，进度、统计、消息全部清空）
//! ```
//!
//! 控制面只在任务记录的锁内做短暂的读改写，从不等待工作者。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, AppResult, JobError};
use crate::infrastructure::RateLimiter;
use crate::models::{AuditJob, AuditType, HistoryRecord, JobSnapshot, JobStatus, Statistics};
use crate::orchestrator::job_worker::JobWorker;
use crate::orchestrator::registry::{Control, JobKey, JobRegistry, JobSlot};
use crate::services::{HistoryStore, TableStore};
use crate::workflow::ItemProcessor;

/// 任务控制器
pub struct JobController {
    config: Arc<Config>,
    registry: JobRegistry,
    /// 每种巡检类型一个限流器，同类型的所有任务共享
    limiters: HashMap<AuditType, Arc<RateLimiter>>,
    tables: TableStore,
    history: Arc<HistoryStore>,
}

impl JobController {
    pub fn new(config: Config) -> Self {
        let limiters = AuditType::ALL
            .iter()
            .map(|&audit_type| {
                let policy = config.policy(audit_type);
                let limiter = RateLimiter::new(
                    audit_type.as_str(),
                    policy.rate_per_sec,
                    policy.bucket_capacity,
                );
                (audit_type, Arc::new(limiter))
            })
            .collect();

        Self {
            registry: JobRegistry::new(config.message_log_capacity),
            limiters,
            tables: TableStore::new(&config),
            history: Arc::new(HistoryStore::new(&config.history_file)),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn existing(&self, key: &JobKey) -> AppResult<Arc<JobSlot>> {
        self.registry
            .get(key)
            .ok_or_else(|| AppError::Job(JobError::NotFound))
    }

    /// 登记数据集
    ///
    /// 只有空闲的任务可以登记；数据集复制到数据目录，文件名带任务ID
    pub async fn register_dataset(&self, key: &JobKey, source: &Path) -> AppResult<JobSnapshot> {
        let slot = self.registry.get_or_create(key);
        let job_id = slot.with_record(|job| {
            if job.status == JobStatus::Idle {
                Ok(job.id.clone())
            } else {
                Err(AppError::Job(JobError::Busy))
            }
        })?;

        let stored = self.tables.register(key.audit_type, &job_id, source).await?;
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());

        slot.with_record(|job| {
            job.dataset_path = Some(stored);
            job.source_filename = Some(filename);
            job.push_message("文件上传成功，请点击开始巡检");
        });
        Ok(self.snapshot_of(&slot))
    }

    /// 启动任务
    ///
    /// # 参数
    /// - `key`: 任务键
    /// - `api_key`: 本次任务使用的密钥；为空时使用配置中的默认密钥
    pub fn start(&self, key: &JobKey, api_key: Option<&str>) -> AppResult<JobSnapshot> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .unwrap_or(self.config.api_key.trim());
        if api_key.is_empty() {
            return Err(JobError::EmptyApiKey.into());
        }

        let slot = self.registry.get_or_create(key);
        slot.with_record(|job| check_startable(job).map(|_| ()))?;

        let limiter = self.limiter(key.audit_type);
        let processor = Arc::new(ItemProcessor::new(
            &self.config,
            key.audit_type,
            api_key,
            limiter,
        )?);

        // 构建客户端期间状态可能已变，加锁后再确认一次
        let (run_id, dataset) = slot.with_record(|job| {
            let dataset = check_startable(job)?;

            job.status = JobStatus::Processing;
            job.paused = false;
            job.progress = 0;
            job.total_items = 0;
            job.processed_items = 0;
            job.statistics = Statistics::default();
            job.continuation_token = None;
            job.skipped_images = 0;
            job.push_message(format!("开始{}巡检", key.audit_type.label()));
            Ok::<_, AppError>((job.id.clone(), dataset))
        })?;

        slot.signal(Control::Run);
        info!("▶️ 任务 {} 启动 ({})", run_id, key);

        let worker = JobWorker {
            slot: slot.clone(),
            result_path: self.tables.result_path(key.audit_type, &run_id),
            run_id,
            audit_type: key.audit_type,
            dataset,
            policy: self.config.policy(key.audit_type),
            processor,
            tables: self.tables.clone(),
            history: self.history.clone(),
            recent_messages: self.config.status_recent_messages,
        };
        tokio::spawn(worker.run());

        Ok(self.snapshot_of(&slot))
    }

    /// 暂停：当前行处理完后停下
    pub fn pause(&self, key: &JobKey) -> AppResult<JobSnapshot> {
        let slot = self.existing(key)?;
        slot.with_record(|job| match job.status {
            JobStatus::Processing | JobStatus::Warning => {
                job.status = JobStatus::Paused;
                job.paused = true;
                job.push_message("巡检已暂停");
                Ok(())
            }
            status => Err(AppError::invalid_transition(status, "pause")),
        })?;
        slot.signal(Control::Pause);
        Ok(self.snapshot_of(&slot))
    }

    /// 恢复：从下一未处理行继续
    pub fn resume(&self, key: &JobKey) -> AppResult<JobSnapshot> {
        let slot = self.existing(key)?;
        slot.with_record(|job| match job.status {
            JobStatus::Paused => {
                job.status = JobStatus::Processing;
                job.paused = false;
                job.push_message("巡检已恢复");
                Ok(())
            }
            status => Err(AppError::invalid_transition(status, "resume")),
        })?;
        slot.signal(Control::Run);
        Ok(self.snapshot_of(&slot))
    }

    /// 提前结束：当前行处理完后落盘、写历史，状态变为 done
    pub fn finish(&self, key: &JobKey) -> AppResult<JobSnapshot> {
        let slot = self.existing(key)?;
        slot.with_record(|job| {
            if job.status.is_active() {
                job.push_message("正在结束巡检...");
                Ok(())
            } else {
                Err(AppError::invalid_transition(job.status, "finish"))
            }
        })?;
        slot.signal(Control::Finish);
        Ok(self.snapshot_of(&slot))
    }

    /// 硬重置：任务回到 idle，换新的任务ID，进度、统计、消息全部清空
    ///
    /// 运行中的工作者在下一个行边界发现任务ID变化后退出
    pub fn end(&self, key: &JobKey) -> AppResult<JobSnapshot> {
        let slot = self.existing(key)?;
        slot.signal(Control::End);
        slot.with_record(|job| {
            let fresh = AuditJob::new(key.audit_type, self.config.message_log_capacity);
            let old_id = std::mem::replace(job, fresh).id;
            info!("⏹️ 任务 {} 已重置 ({})", old_id, key);
            job.push_message("任务已结束");
        });
        Ok(self.snapshot_of(&slot))
    }

    /// 状态快照；会话第一次出现时创建空任务
    pub fn status(&self, key: &JobKey) -> JobSnapshot {
        let slot = self.registry.get_or_create(key);
        self.snapshot_of(&slot)
    }

    pub fn statistics(&self, key: &JobKey) -> AppResult<Statistics> {
        let slot = self.existing(key)?;
        Ok(slot.with_record(|job| job.statistics.clone()))
    }

    /// 结果文件路径（文件已存在时）
    pub fn result_path(&self, key: &JobKey) -> AppResult<Option<PathBuf>> {
        let slot = self.existing(key)?;
        let job_id = slot.with_record(|job| job.id.clone());
        let path = self.tables.result_path(key.audit_type, &job_id);
        Ok(path.exists().then_some(path))
    }

    pub async fn history(&self) -> AppResult<Vec<HistoryRecord>> {
        self.history.list().await
    }

    fn limiter(&self, audit_type: AuditType) -> Arc<RateLimiter> {
        self.limiters
            .get(&audit_type)
            .cloned()
            .unwrap_or_else(|| {
                let policy = self.config.policy(audit_type);
                Arc::new(RateLimiter::new(
                    audit_type.as_str(),
                    policy.rate_per_sec,
                    policy.bucket_capacity,
                ))
            })
    }

    fn snapshot_of(&self, slot: &JobSlot) -> JobSnapshot {
        slot.snapshot(self.config.status_recent_messages)
    }
}

/// 只有空闲且已登记数据集的任务可以启动；返回数据集路径
fn check_startable(job: &AuditJob) -> AppResult<PathBuf> {
    if job.status != JobStatus::Idle {
        return Err(AppError::invalid_transition(job.status, "start"));
    }
    job.dataset_path
        .clone()
        .ok_or_else(|| JobError::DatasetMissing.into())
}
