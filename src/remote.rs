//! 远程 HTTP 数据源

use crate::config::SourceConfig;
use crate::error::{MirrorError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

/// 远程数据源抽象，便于在测试中替换
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// 获取 URL 的完整内容，非 2xx 状态视为错误
    async fn fetch(&self, url: &str) -> Result<Bytes>;

    /// 获取文本内容（索引页）
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let body = self.fetch(url).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// 基于 reqwest 的实现，所有请求带 User-Agent 和超时
pub struct HttpRemote {
    client: reqwest::Client,
}

impl HttpRemote {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MirrorError::Config(format!("HTTP 客户端初始化失败: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteSource for HttpRemote {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        debug!("GET {}", url);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| MirrorError::transport(url, e))?;

        resp.bytes()
            .await
            .map_err(|e| MirrorError::transport(url, e))
    }
}
