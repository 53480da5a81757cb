/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AuditPolicy;
use crate::models::{AuditType, JobSnapshot};

/// 初始化全局日志
///
/// 级别由 `RUST_LOG` 控制，未设置时为 info。重复调用不会报错。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录任务启动信息
///
/// # 参数
/// - `audit_type`: 巡检类型
/// - `total`: 待处理行数
/// - `policy`: 本类型的调用策略
pub fn log_job_start(audit_type: AuditType, total: usize, policy: &AuditPolicy) {
    info!("{}", "=".repeat(60));
    info!("🚀 开始{}巡检 - 共 {} 条", audit_type.label(), total);
    info!(
        "📊 限速: 容量 {} / 每秒 {} | 并发 {} | 行间隔 {}ms",
        policy.bucket_capacity, policy.rate_per_sec, policy.concurrency, policy.item_delay_ms
    );
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
///
/// # 参数
/// - `start`: 起始行号（从 1 开始）
/// - `end`: 结束行号
/// - `total`: 总行数
pub fn log_chunk_start(start: usize, end: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!("📦 处理第 {}-{} 行 / 共 {} 行", start, end, total);
}

/// 打印最终统计信息
pub fn print_final_stats(snapshot: &JobSnapshot, result_path: Option<&str>) {
    info!("\n{}", "=".repeat(60));
    info!("📊 {}巡检统计", snapshot.audit_type.label());
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("状态: {} | 进度: {}%", snapshot.status, snapshot.progress);
    info!("✅ 已处理: {}/{}", snapshot.processed, snapshot.total);
    for (verdict, count) in &snapshot.statistics.verdict_counts {
        info!("  {}: {}", verdict, count);
    }
    if !snapshot.statistics.tag_counts.is_empty() {
        info!("🏷️ 标签分布:");
        for (tag, count) in &snapshot.statistics.tag_counts {
            info!("  {}: {}", tag, count);
        }
    }
    if snapshot.skipped_images > 0 {
        info!("🖼️ 跳过小图: {}", snapshot.skipped_images);
    }
    info!("{}", "=".repeat(60));
    if let Some(path) = result_path {
        info!("\n结果已保存至: {}", path);
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
