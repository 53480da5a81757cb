use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{AppResult, ConfigError, FileError};
use crate::models::AuditType;

/// 单个巡检类型的调用策略
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditPolicy {
    /// 令牌补充速率（每秒）
    pub rate_per_sec: f64,
    /// 令牌桶容量（突发量）
    pub bucket_capacity: f64,
    /// 同时在途的行数
    pub concurrency: usize,
    /// 每行处理完后的间隔（毫秒）
    pub item_delay_ms: u64,
    /// 每处理多少行落盘一次
    pub checkpoint_every: usize,
}

impl Default for AuditPolicy {
    fn default() -> Self {
        Self {
            rate_per_sec: 1.0,
            bucket_capacity: 5.0,
            concurrency: 1,
            item_delay_ms: 0,
            checkpoint_every: 1,
        }
    }
}

impl AuditPolicy {
    /// 各类型的默认策略
    pub fn default_for(audit_type: AuditType) -> Self {
        let base = Self::default();
        match audit_type {
            AuditType::Cover => Self {
                item_delay_ms: 1000,
                ..base
            },
            AuditType::Push => Self {
                item_delay_ms: 500,
                ..base
            },
            AuditType::Brand => Self {
                rate_per_sec: 2.0,
                checkpoint_every: 20,
                ..base
            },
            AuditType::Comment | AuditType::News => base,
        }
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }
}

/// 程序配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 外部模型服务 ---
    pub api_url: String,
    /// 默认 API 密钥；启动任务时可以覆盖
    pub api_key: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// 单次调用的最大尝试次数
    pub max_retries: u32,
    /// 指数退避基数（毫秒），第 n 次重试等待 2^n × base
    pub backoff_base_ms: u64,
    /// 429 时 Retry-After 的上限（秒）
    pub max_retry_after_secs: u64,

    // --- 文件 ---
    pub data_folder: String,
    pub result_folder: String,
    pub history_file: String,

    // --- 任务 ---
    pub message_log_capacity: usize,
    /// 状态查询返回的最近消息条数
    pub status_recent_messages: usize,

    // --- 新闻多阶段流程 ---
    pub image_min_dimension: u32,
    pub image_probe_bytes: usize,
    pub news_min_text_chars: usize,
    pub news_max_text_chars: usize,
    pub boilerplate_markers: Vec<String>,

    /// 按类型覆盖的策略；未配置的类型使用 `AuditPolicy::default_for`
    pub policies: BTreeMap<AuditType, AuditPolicy>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "https://jiuwen-api.vmic.xyz/v1/chat-messages".to_string(),
            api_key: String::new(),
            connect_timeout_secs: 10,
            read_timeout_secs: 300,
            max_retries: 3,
            backoff_base_ms: 1000,
            max_retry_after_secs: 5,
            data_folder: "data".to_string(),
            result_folder: "result".to_string(),
            history_file: "result/history.json".to_string(),
            message_log_capacity: 50,
            status_recent_messages: 10,
            image_min_dimension: 100,
            image_probe_bytes: 64 * 1024,
            news_min_text_chars: 20,
            news_max_text_chars: 3000,
            boilerplate_markers: ["责任编辑", "免责声明", "版权声明", "相关阅读", "推荐阅读", "原标题"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            policies: BTreeMap::new(),
        }
    }
}

impl Config {
    /// 默认值 + 环境变量覆盖
    pub fn from_env() -> AppResult<Self> {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件加载，再用环境变量覆盖
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::AppError::file_read_failed(path.display().to_string(), e))?;
        let config: Config = toml::from_str(&content).map_err(|e| FileError::TomlParseFailed {
            path: path.display().to_string(),
            source: e,
        })?;
        config.with_env_overrides()
    }

    /// 有配置文件就读文件，否则只读环境变量
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        match path {
            Some(p) => Self::from_toml_file(p),
            None => Self::from_env(),
        }
    }

    fn with_env_overrides(mut self) -> AppResult<Self> {
        if let Ok(v) = std::env::var("AUDIT_API_URL") {
            self.api_url = v;
        }
        if let Ok(v) = std::env::var("AUDIT_API_KEY") {
            self.api_key = v;
        }
        if let Some(v) = env_parse("AUDIT_CONNECT_TIMEOUT_SECS")? {
            self.connect_timeout_secs = v;
        }
        if let Some(v) = env_parse("AUDIT_READ_TIMEOUT_SECS")? {
            self.read_timeout_secs = v;
        }
        if let Some(v) = env_parse("AUDIT_MAX_RETRIES")? {
            self.max_retries = v;
        }
        if let Some(v) = env_parse("AUDIT_BACKOFF_BASE_MS")? {
            self.backoff_base_ms = v;
        }
        if let Ok(v) = std::env::var("AUDIT_DATA_FOLDER") {
            self.data_folder = v;
        }
        if let Ok(v) = std::env::var("AUDIT_RESULT_FOLDER") {
            self.result_folder = v;
        }
        if let Ok(v) = std::env::var("AUDIT_HISTORY_FILE") {
            self.history_file = v;
        }
        self.validate()?;
        Ok(self)
    }

    /// 取某类型的策略
    pub fn policy(&self, audit_type: AuditType) -> AuditPolicy {
        self.policies
            .get(&audit_type)
            .cloned()
            .unwrap_or_else(|| AuditPolicy::default_for(audit_type))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.max_retries == 0 {
            return Err(invalid("max_retries", "至少为 1"));
        }
        for audit_type in AuditType::ALL {
            let policy = self.policy(audit_type);
            if !(policy.rate_per_sec > 0.0) {
                return Err(invalid(
                    &format!("policies.{}.rate_per_sec", audit_type),
                    "必须大于 0",
                ));
            }
            if policy.bucket_capacity < 1.0 {
                return Err(invalid(
                    &format!("policies.{}.bucket_capacity", audit_type),
                    "至少为 1",
                ));
            }
            if policy.concurrency == 0 || policy.checkpoint_every == 0 {
                return Err(invalid(
                    &format!("policies.{}", audit_type),
                    "concurrency 与 checkpoint_every 至少为 1",
                ));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> crate::error::AppError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn env_parse<T: std::str::FromStr>(var_name: &str) -> AppResult<Option<T>> {
    match std::env::var(var_name) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|_| {
            ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            }
            .into()
        }),
        Err(_) => Ok(None),
    }
}
