//! 命令行入口
//!
//! `run` 登记数据集并启动任务，轮询状态直到结束；Ctrl-C 触发提前结束。
//! `history` 列出历史记录。

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{AuditType, JobStatus};
use crate::orchestrator::{JobController, JobKey};

#[derive(Parser)]
#[command(name = "content_audit")]
#[command(about = "批量内容巡检：评论 / 封面 / Push / 品牌 / 新闻", long_about = None)]
pub struct Cli {
    /// TOML 配置文件，缺省时只读取环境变量
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 巡检一个数据集（JSON 对象数组）
    Run {
        /// 巡检类型：comment / cover / push / brand / news
        #[arg(long = "type", value_parser = parse_audit_type)]
        audit_type: AuditType,

        /// 数据集路径
        #[arg(long)]
        input: PathBuf,

        /// 会话标识
        #[arg(long, default_value = "cli")]
        session: String,

        /// API 密钥，缺省时使用配置
        #[arg(long)]
        api_key: Option<String>,

        /// 状态轮询间隔（毫秒）
        #[arg(long, default_value_t = 1000)]
        poll_ms: u64,
    },

    /// 列出历史任务
    History,
}

fn parse_audit_type(s: &str) -> Result<AuditType, String> {
    s.parse()
}

pub async fn execute(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("加载配置失败")?;
    let controller = JobController::new(config);

    match cli.command {
        Commands::Run {
            audit_type,
            input,
            session,
            api_key,
            poll_ms,
        } => run(&controller, audit_type, input, session, api_key, poll_ms).await,
        Commands::History => history(&controller).await,
    }
}

async fn run(
    controller: &JobController,
    audit_type: AuditType,
    input: PathBuf,
    session: String,
    api_key: Option<String>,
    poll_ms: u64,
) -> Result<()> {
    let key = JobKey::new(audit_type, session);

    let snapshot = controller.register_dataset(&key, &input).await?;
    info!("📁 {}", snapshot.message);
    controller.start(&key, api_key.as_deref())?;

    let poll = Duration::from_millis(poll_ms.max(50));
    let mut finishing = false;
    let mut last_processed = usize::MAX;

    let snapshot = loop {
        tokio::select! {
            _ = tokio::time::sleep(poll) => {}
            _ = tokio::signal::ctrl_c(), if !finishing => {
                warn!("收到中断信号，处理完当前行后结束...");
                finishing = true;
                if let Err(e) = controller.finish(&key) {
                    warn!("结束任务失败: {}", e);
                }
            }
        }

        let snapshot = controller.status(&key);
        if snapshot.processed != last_processed {
            last_processed = snapshot.processed;
            info!(
                "⏳ [{}] {}% ({}/{}) {}",
                snapshot.status, snapshot.progress, snapshot.processed, snapshot.total, snapshot.message
            );
        }
        if snapshot.status.is_terminal() {
            break snapshot;
        }
    };

    if snapshot.status == JobStatus::Error {
        bail!("巡检失败: {}", snapshot.message);
    }
    if let Some(path) = controller.result_path(&key)? {
        println!("{}", path.display());
    }
    Ok(())
}

async fn history(controller: &JobController) -> Result<()> {
    let records = controller.history().await?;
    if records.is_empty() {
        info!("暂无历史记录");
        return Ok(());
    }
    for record in records {
        println!(
            "{}  {:<7} {:<10} {}  {}/{}  {}",
            record.timestamp,
            record.audit_type.as_str(),
            record.final_status.as_str(),
            record.job_id,
            record.processed_rows,
            record.total_rows,
            record.source_filename
        );
    }
    Ok(())
}
