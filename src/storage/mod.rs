pub mod s3;

use crate::config::StorageConfig;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

pub use s3::S3Store;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, delete, list 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 对象的用户元数据中保存指纹的字段名
pub const FINGERPRINT_META_KEY: &str = "hash";

/// 对象元数据（head 结果）
#[derive(Debug, Clone, Default)]
pub struct ObjectMeta {
    pub size: u64,
    pub user_metadata: HashMap<String, String>,
}

impl ObjectMeta {
    /// 上传时附带的指纹
    pub fn fingerprint(&self) -> Option<&str> {
        self.user_metadata
            .get(FINGERPRINT_META_KEY)
            .map(String::as_str)
    }
}

/// 写入选项
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub content_type: Option<String>,
    pub user_metadata: HashMap<String, String>,
}

impl WriteOptions {
    pub fn with_fingerprint(fingerprint: &str) -> Self {
        Self {
            content_type: None,
            user_metadata: HashMap::from([(
                FINGERPRINT_META_KEY.to_string(),
                fingerprint.to_string(),
            )]),
        }
    }

    pub fn json() -> Self {
        Self {
            content_type: Some("application/json".to_string()),
            user_metadata: HashMap::new(),
        }
    }
}

/// 对象存储抽象接口
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 列出前缀下的全部 key（内部分页直到结束）
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// 获取对象元数据，不存在时返回 None
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>>;

    /// 写入对象
    async fn put(&self, key: &str, body: Bytes, options: WriteOptions) -> Result<()>;

    /// 删除对象（不存在时不报错）
    async fn delete(&self, key: &str) -> Result<()>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 根据配置创建存储实例
pub fn create_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    let bucket = config.bucket()?;
    tracing::info!("初始化S3存储: bucket={}, region={}", bucket, config.region);
    Ok(Arc::new(S3Store::new(config)?) as Arc<dyn ObjectStore>)
}
