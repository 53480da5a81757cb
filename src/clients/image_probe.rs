//! 图片尺寸探测
//!
//! 只下载图片开头的一段字节（Range 请求），从文件头读出宽高，
//! 用来在调用模型之前筛掉过小的图片。

use std::io::Cursor;
use tracing::debug;

use crate::config::Config;
use crate::error::{ApiError, AppError, AppResult};

/// 探测结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 尺寸达标
    Accepted { width: u32, height: u32 },
    /// 任一边小于阈值
    TooSmall { width: u32, height: u32 },
    /// 无法获取尺寸（下载失败或格式不识别）
    Unknown(String),
}

impl ProbeOutcome {
    pub fn is_too_small(&self) -> bool {
        matches!(self, ProbeOutcome::TooSmall { .. })
    }
}

/// 图片探测器
#[derive(Clone)]
pub struct ImageProbe {
    http: reqwest::Client,
    min_dimension: u32,
    probe_bytes: usize,
}

impl ImageProbe {
    pub fn new(config: &Config) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.connect_timeout() * 3)
            .build()
            .map_err(|e| AppError::Api(ApiError::BuildFailed(e.to_string())))?;
        Ok(Self {
            http,
            min_dimension: config.image_min_dimension,
            probe_bytes: config.image_probe_bytes.max(64),
        })
    }

    /// 探测单张图片
    pub async fn probe(&self, url: &str) -> ProbeOutcome {
        let bytes = match self.fetch_head(url).await {
            Ok(bytes) => bytes,
            Err(reason) => {
                debug!("图片探测失败 {}: {}", url, reason);
                return ProbeOutcome::Unknown(reason);
            }
        };
        match dimensions_from_bytes(&bytes) {
            Some((width, height)) => classify(width, height, self.min_dimension),
            None => ProbeOutcome::Unknown("无法识别的图片格式".to_string()),
        }
    }

    async fn fetch_head(&self, url: &str) -> Result<Vec<u8>, String> {
        let mut response = self
            .http
            .get(url)
            .header(
                reqwest::header::RANGE,
                format!("bytes=0-{}", self.probe_bytes - 1),
            )
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status().as_u16()));
        }

        // 服务端可能忽略 Range，读够就停
        let mut buf = Vec::with_capacity(self.probe_bytes);
        while let Some(chunk) = response.chunk().await.map_err(|e| e.to_string())? {
            buf.extend_from_slice(&chunk);
            if buf.len() >= self.probe_bytes {
                break;
            }
        }
        Ok(buf)
    }
}

/// 从文件头解析宽高
pub fn dimensions_from_bytes(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

pub fn classify(width: u32, height: u32, min_dimension: u32) -> ProbeOutcome {
    if width < min_dimension || height < min_dimension {
        ProbeOutcome::TooSmall { width, height }
    } else {
        ProbeOutcome::Accepted { width, height }
    }
}
