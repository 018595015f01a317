//! 应用配置模块

use crate::error::{MirrorError, Result};
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// 远程数据源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// 远程目录索引地址
    #[serde(default = "default_index_url")]
    pub index_url: String,
    /// 请求头 User-Agent（BLS 要求带联系方式）
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// 单次请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_index_url() -> String {
    "https://download.bls.gov/pub/time.series/pr".to_string()
}

fn default_user_agent() -> String {
    concat!("mirrorsync/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            index_url: default_index_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// 目标对象存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    /// 镜像对象的 key 前缀
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_prefix() -> String {
    "raw/bls/".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            region: default_region(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            prefix: default_prefix(),
        }
    }
}

impl StorageConfig {
    pub fn bucket(&self) -> Result<&str> {
        self.bucket
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| MirrorError::Config("storage.bucket 未配置".to_string()))
    }
}

/// 同步执行配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// 最大并发数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// 人口统计 API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// 存放位置
    #[serde(default = "default_population_key")]
    pub key: String,
    #[serde(default = "default_query")]
    pub query: BTreeMap<String, String>,
}

fn default_api_url() -> String {
    "https://api.datausa.io/tesseract/data.jsonrecords".to_string()
}

fn default_population_key() -> String {
    "raw/census_bureau/population_data.json".to_string()
}

fn default_query() -> BTreeMap<String, String> {
    [
        ("cube", "acs_yg_total_population_1"),
        ("drilldowns", "Year,Nation"),
        ("locale", "en"),
        ("measures", "Population"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            key: default_population_key(),
            query: default_query(),
        }
    }
}

/// 完整配置文件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub population: PopulationConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    /// 从配置文件加载，文件不存在时使用默认值
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("配置文件不存在，使用默认配置: {:?}", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 检查运行前必须满足的约束（bucket 在创建存储时检查）
    pub fn validate(&self) -> Result<()> {
        if self.source.user_agent.trim().is_empty() {
            return Err(MirrorError::Config("source.userAgent 不能为空".to_string()));
        }
        if self.source.timeout_secs == 0 {
            return Err(MirrorError::Config("source.timeoutSecs 必须大于 0".to_string()));
        }
        if self.sync.max_concurrent == 0 {
            return Err(MirrorError::Config("sync.maxConcurrent 必须大于 0".to_string()));
        }
        if self.storage.prefix.starts_with('/') {
            return Err(MirrorError::Config("storage.prefix 不能以 / 开头".to_string()));
        }
        Ok(())
    }
}
