//! 令牌桶限流器 - 基础设施层
//!
//! 每个调用策略（巡检类型）一个实例，所有 worker 共享。
//! 整个"补充 → 判断 → 扣减/等待"过程在同一把锁内完成。

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// 令牌桶
pub struct RateLimiter {
    name: String,
    rate_per_sec: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// 创建满桶的限流器
    ///
    /// # 参数
    /// - `name`: 日志中显示的策略名
    /// - `rate_per_sec`: 每秒补充的令牌数
    /// - `capacity`: 桶容量
    pub fn new(name: impl Into<String>, rate_per_sec: f64, capacity: f64) -> Self {
        let capacity = capacity.max(1.0);
        Self {
            name: name.into(),
            rate_per_sec,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// 取得一个令牌，不足时等待
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.capacity);

        if state.tokens < 1.0 {
            let deficit = 1.0 - state.tokens;
            let wait = Duration::from_secs_f64(deficit / self.rate_per_sec);
            debug!("{} 速率限制：等待 {:.2} 秒", self.name, wait.as_secs_f64());
            sleep(wait).await;
            state.tokens = 0.0;
            // 以睡眠结束的时刻为准，否则下一次会多补等待期间的令牌
            state.last_refill = Instant::now();
        } else {
            state.tokens -= 1.0;
            state.last_refill = now;
        }
    }

    pub fn rate_per_sec(&self) -> f64 {
        self.rate_per_sec
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}
