//! 人口统计数据：调用 API 并原样（格式化后）存入对象存储

use crate::config::PopulationConfig;
use crate::error::{MirrorError, Result};
use crate::remote::RemoteSource;
use crate::storage::{ObjectStore, WriteOptions};
use bytes::Bytes;
use reqwest::Url;
use tracing::info;

/// 带查询参数的 API 地址
pub fn request_url(config: &PopulationConfig) -> Result<Url> {
    let mut url = Url::parse(&config.api_url)
        .map_err(|e| MirrorError::Config(format!("无效的 API 地址 {}: {}", config.api_url, e)))?;
    if !config.query.is_empty() {
        url.query_pairs_mut().extend_pairs(&config.query);
    }
    Ok(url)
}

/// 获取 API 数据并写入配置的 key，返回写入字节数
pub async fn ingest(
    remote: &dyn RemoteSource,
    store: &dyn ObjectStore,
    config: &PopulationConfig,
) -> Result<u64> {
    let url = request_url(config)?;
    info!("获取人口统计数据: {}", url);

    let body = remote.fetch(url.as_str()).await?;
    let data: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| MirrorError::RemoteFormat(format!("API 返回的不是 JSON: {}", e)))?;
    let pretty = serde_json::to_vec_pretty(&data)
        .map_err(|e| MirrorError::RemoteFormat(e.to_string()))?;
    let bytes = pretty.len() as u64;

    store
        .put(&config.key, Bytes::from(pretty), WriteOptions::json())
        .await?;

    info!("人口统计数据已存储: {}/{} ({} 字节)", store.name(), config.key, bytes);
    Ok(bytes)
}
