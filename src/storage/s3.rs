use super::{ObjectMeta, ObjectStore, WriteOptions, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use crate::config::StorageConfig;
use crate::error::{MirrorError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use opendal::{layers::TimeoutLayer, Metakey, Operator};
use std::time::Duration;

pub struct S3Store {
    operator: Operator,
    name: String,
}

impl S3Store {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        use opendal::services::S3;

        let bucket = config.bucket()?;
        let mut builder = S3::default().bucket(bucket).region(&config.region);

        // 未配置密钥时由 opendal 读取 AWS 环境变量
        if let (Some(ak), Some(sk)) = (&config.access_key, &config.secret_key) {
            builder = builder.access_key_id(ak).secret_access_key(sk);
        }

        if let Some(ref ep) = config.endpoint {
            builder = builder.endpoint(ep);
        }

        let operator = Operator::new(builder)
            .map_err(|e| MirrorError::Config(format!("S3 初始化失败: {}", e)))?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        Ok(Self {
            operator,
            name: format!("s3://{}", bucket),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        // lister 内部按 list_objects_v2 分页，直到没有 continuation token
        let mut lister = self
            .operator
            .lister_with(prefix)
            .recursive(true)
            .metakey(Metakey::Mode)
            .await
            .map_err(|e| MirrorError::store("list", prefix, e))?;

        let mut keys = Vec::new();
        while let Some(entry) = lister
            .try_next()
            .await
            .map_err(|e| MirrorError::store("list", prefix, e))?
        {
            let path = entry.path();
            // 跳过目录占位对象
            if path.is_empty() || path.ends_with('/') || entry.metadata().is_dir() {
                continue;
            }
            keys.push(path.trim_start_matches('/').to_string());
        }

        Ok(keys)
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        match self.operator.stat(key).await {
            Ok(meta) => Ok(Some(ObjectMeta {
                size: meta.content_length(),
                user_metadata: meta.user_metadata().cloned().unwrap_or_default(),
            })),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MirrorError::store("head", key, e)),
        }
    }

    async fn put(&self, key: &str, body: Bytes, options: WriteOptions) -> Result<()> {
        let mut write = self.operator.write_with(key, body);
        if let Some(ct) = options.content_type {
            write = write.content_type(&ct);
        }
        if !options.user_metadata.is_empty() {
            write = write.user_metadata(options.user_metadata);
        }
        write.await.map_err(|e| MirrorError::store("put", key, e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // S3 删除不存在的对象不会报错
        self.operator
            .delete(key)
            .await
            .map_err(|e| MirrorError::store("delete", key, e))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
