//! 任务工作者 - 编排层
//!
//! 每个已启动的任务一个后台工作者，负责：
//! 1. 读取数据集、检查必需列、清洗、初始化结果列
//! 2. 按块遍历行（块大小 = 并发数），每块内的行并发处理
//! 3. 行与行之间观察控制信号（暂停 / 结束 / 重置）
//! 4. 每行结果写入任务记录，按批落盘
//! 5. 结束时写历史记录
//!
//! 工作者启动时记下任务ID；任务被重置后ID改变，工作者发现后直接退出，不再写任何东西。

use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::AuditPolicy;
use crate::error::{AppError, AppResult};
use crate::models::{
    AuditJob, AuditTable, AuditType, HistoryRecord, ItemInput, ItemOutcome, JobStatus, Verdict,
};
use crate::orchestrator::registry::{Control, JobSlot};
use crate::services::table_store::{now_timestamp, write_row_result};
use crate::services::{HistoryStore, TableStore};
use crate::utils::logging::{log_chunk_start, log_job_start, print_final_stats};
use crate::workflow::{ItemCtx, ItemProcessor};

/// 工作者的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunEnd {
    /// 全部行处理完
    Completed,
    /// 手动结束
    Finished,
    /// 任务已被重置，不再触碰记录
    Stale,
}

pub(crate) struct JobWorker {
    pub slot: Arc<JobSlot>,
    pub run_id: String,
    pub audit_type: AuditType,
    pub dataset: PathBuf,
    pub result_path: PathBuf,
    pub policy: AuditPolicy,
    pub processor: Arc<ItemProcessor>,
    pub tables: TableStore,
    pub history: Arc<HistoryStore>,
    pub recent_messages: usize,
}

impl JobWorker {
    pub async fn run(self) {
        let ended = self.execute().await;

        let (status, message) = match &ended {
            Ok(RunEnd::Stale) => {
                info!("任务 {} 已被重置，工作者退出", self.run_id);
                return;
            }
            Ok(RunEnd::Completed) => (JobStatus::Done, "巡检完成".to_string()),
            Ok(RunEnd::Finished) => (JobStatus::Done, "巡检已手动结束".to_string()),
            // 准备错误直接展示给用户，不带外层前缀
            Err(AppError::Setup(e)) => (JobStatus::Error, e.to_string()),
            Err(e) => (JobStatus::Error, e.to_string()),
        };
        if status == JobStatus::Error {
            error!("❌ 任务 {} 失败: {}", self.run_id, message);
        }

        let result_saved = matches!(ended, Ok(RunEnd::Completed) | Ok(RunEnd::Finished));
        let record = self.update(|job| {
            job.status = status;
            job.paused = false;
            job.push_message(message.clone());
            self.history_record(job, result_saved)
        });
        let Some(record) = record else {
            return;
        };

        let snapshot = self.slot.snapshot(self.recent_messages);
        let result_display = self.result_path.display().to_string();
        print_final_stats(&snapshot, result_saved.then_some(result_display.as_str()));

        if let Err(e) = self.history.append(&record).await {
            warn!("⚠️ 历史记录写入失败: {}", e);
        }
    }

    async fn execute(&self) -> AppResult<RunEnd> {
        let mut table: AuditTable = TableStore::load(&self.dataset).await?;
        table.require_columns(self.audit_type)?;
        table.clean(self.audit_type);
        table.init_result_columns(self.audit_type);
        let total = table.len();

        if self
            .update(|job| {
                job.total_items = total;
                job.push_message(format!("数据清洗完成，共 {} 条待巡检", total));
            })
            .is_none()
        {
            return Ok(RunEnd::Stale);
        }
        log_job_start(self.audit_type, total, &self.policy);
        self.tables.save(&self.result_path, &table).await?;

        let mut control = self.slot.subscribe();
        // 有状态类型每次启动都从空会话开始
        let mut token: Option<String> = None;
        let chunk_size = if self.audit_type.is_stateful() {
            1
        } else {
            self.policy.concurrency.max(1)
        };
        let mut since_checkpoint = 0;
        let mut next = 0;

        while next < total {
            match wait_runnable(&mut control).await {
                Control::Run => {}
                Control::Finish => {
                    self.tables.save(&self.result_path, &table).await?;
                    return Ok(RunEnd::Finished);
                }
                Control::End | Control::Pause => return Ok(RunEnd::Stale),
            }
            if !self.is_current() {
                return Ok(RunEnd::Stale);
            }

            let end = (next + chunk_size).min(total);
            if chunk_size > 1 {
                log_chunk_start(next + 1, end, total);
            }

            let outcomes = self.process_chunk(&table, next, end, total, token.clone()).await;

            for (index, outcome) in (next..end).zip(outcomes) {
                if outcome.token_reset {
                    token = None;
                }
                if let Some(new_token) = &outcome.continuation_token {
                    token = Some(new_token.clone());
                }

                write_row_result(
                    &mut table.rows[index],
                    self.audit_type,
                    outcome.verdict,
                    &outcome.tags,
                    &now_timestamp(),
                );

                let recorded = self.update(|job| {
                    job.record_item(outcome.verdict, &outcome.tags);
                    job.skipped_images += outcome.skipped_images;
                    job.continuation_token = token.clone();
                    apply_row_status(job, index + 1, &outcome);
                });
                if recorded.is_none() {
                    return Ok(RunEnd::Stale);
                }
                since_checkpoint += 1;
            }
            next = end;

            if since_checkpoint >= self.policy.checkpoint_every {
                if let Err(e) = self.tables.save(&self.result_path, &table).await {
                    warn!("⚠️ 结果落盘失败，稍后重试: {}", e);
                } else {
                    since_checkpoint = 0;
                }
            }

            let delay = self.policy.item_delay();
            if next < total && !delay.is_zero() {
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = control.changed() => {}
                }
            }
        }

        self.tables.save(&self.result_path, &table).await?;
        Ok(RunEnd::Completed)
    }

    /// 并发处理 [start, end) 行
    ///
    /// 单行 panic 只记为处理失败，不影响其它行
    async fn process_chunk(
        &self,
        table: &AuditTable,
        start: usize,
        end: usize,
        total: usize,
        token: Option<String>,
    ) -> Vec<ItemOutcome> {
        let handles: Vec<_> = (start..end)
            .map(|index| {
                let ctx = ItemCtx::new(self.run_id.clone(), self.audit_type, index + 1, total);
                let input = ItemInput::from_row(self.audit_type, &table.rows[index]);
                let processor = self.processor.clone();
                let token = token.clone();
                tokio::spawn(async move {
                    match input {
                        Some(input) => processor.process(&ctx, &input, token).await,
                        None => ItemOutcome::failed(Verdict::NoContent),
                    }
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .enumerate()
            .map(|(offset, joined)| {
                joined.unwrap_or_else(|e| {
                    error!("第 {} 行任务执行失败: {}", start + offset + 1, e);
                    ItemOutcome::failed(Verdict::ProcessingFailed)
                })
            })
            .collect()
    }

    /// 只在任务未被重置时修改记录
    fn update<R>(&self, f: impl FnOnce(&mut AuditJob) -> R) -> Option<R> {
        self.slot.with_record(|job| {
            if job.id == self.run_id {
                Some(f(job))
            } else {
                None
            }
        })
    }

    fn is_current(&self) -> bool {
        self.update(|_| ()).is_some()
    }

    fn history_record(&self, job: &AuditJob, result_saved: bool) -> HistoryRecord {
        HistoryRecord {
            job_id: job.id.clone(),
            audit_type: job.audit_type,
            timestamp: now_timestamp(),
            source_filename: job.source_filename.clone().unwrap_or_default(),
            total_rows: job.total_items,
            processed_rows: job.processed_items,
            final_status: job.status,
            statistics: job.statistics.clone(),
            result_path: result_saved.then(|| self.result_path.display().to_string()),
        }
    }
}

/// 等到可以继续：暂停时阻塞，直到恢复、结束或重置
async fn wait_runnable(control: &mut watch::Receiver<Control>) -> Control {
    match control.wait_for(|c| *c != Control::Pause).await {
        Ok(c) => *c,
        Err(_) => Control::End,
    }
}

/// 行结果对状态的影响：失败 → warning；成功 → 从 warning 回到 processing。暂停中保持暂停。
fn apply_row_status(job: &mut AuditJob, row: usize, outcome: &ItemOutcome) {
    if outcome.verdict.is_failure() {
        if job.status != JobStatus::Paused {
            job.status = JobStatus::Warning;
        }
        job.push_message(format!("第 {} 行处理异常: {}", row, outcome.verdict));
    } else {
        if job.status == JobStatus::Warning {
            job.status = JobStatus::Processing;
        }
        job.push_message(format!(
            "已处理 {}/{} (第 {} 行: {})",
            job.processed_items, job.total_items, row, outcome.verdict
        ));
    }
}
