//! 基础设施层
//!
//! 持有跨任务共享的稀缺资源，只暴露能力

pub mod rate_limiter;

pub use rate_limiter::RateLimiter;
