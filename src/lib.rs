//! # Content Audit
//!
//! 批量内容巡检：逐行把内容交给外部对话模型审核，记录结论和标签
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构，依赖只能向下：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 稀缺资源
//! - `RateLimiter` - 令牌桶限流，每种巡检类型一个
//!
//! ### ② 客户端层（Clients）
//! - `clients/` - 对外 I/O
//! - `ChatClient` - 限流 + 重试的对话接口客户端
//! - `ImageProbe` - 只下载文件头的图片尺寸探测
//!
//! ### ③ 业务能力层（Services）
//! - `services/` - 只处理单条内容，不关心任务
//! - `ResponseParser` - 自由文本回复 → (结论, 标签)
//! - `sanitize` / `taxonomy` - 载荷清洗、类别关键词表
//! - `TableStore` / `HistoryStore` - 数据集与历史记录读写
//!
//! ### ④ 流程层（Workflow）
//! - `workflow/` - 定义"一行"的完整处理流程
//! - `ItemCtx` - 上下文封装（任务ID + 行号）
//! - `ItemProcessor` - 构建请求 → 调用 → 解析 → 归一化
//! - `NewsFlow` - 新闻多阶段流程（提取 → 小图过滤 → 分别审核 → 汇总）
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/` - 任务注册表、控制面、后台工作者
//!
//! ## 模块结构

pub mod cli;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{ChatClient, ImageProbe};
pub use config::{AuditPolicy, Config};
pub use error::{AppError, AppResult};
pub use infrastructure::RateLimiter;
pub use models::{AuditType, JobSnapshot, JobStatus, Verdict};
pub use orchestrator::{JobController, JobKey};
pub use services::{parse_answer, ResponseParser};
pub use workflow::{ItemCtx, ItemProcessor, NewsFlow};
