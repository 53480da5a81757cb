//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `registry` - 任务注册表
//! - (巡检类型, 会话) → 任务槽（任务记录 + 控制信道）
//! - 第一次引用时创建，end 时硬重置
//!
//! ### `job_controller` - 控制面
//! - 登记、启动、暂停、恢复、结束、重置、查询
//! - 只做状态检查和短暂的记录修改，不等待工作者
//!
//! ### `job_worker` - 后台工作者
//! - 遍历行、观察控制信号、写记录、落盘、写历史
//!
//! ## 层次关系
//!
//! ```text
//! job_controller ──spawn──▶ job_worker (处理一张表)
//!                               ↓
//!                  workflow::ItemProcessor (处理一行)
//!                               ↓
//!        services (解析 / 清洗 / 表格读写 / 历史) + clients (对话 / 图片探测)
//!                               ↓
//!                  infrastructure (限流器)
//! ```

pub mod job_controller;
mod job_worker;
pub mod registry;

pub use job_controller::JobController;
pub use registry::{Control, JobKey, JobRegistry, JobSlot};
